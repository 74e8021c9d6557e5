//! Child side of the router demo: serves `ping` on stdio and greets the
//! parent once.
//!
//! Run via `cargo run --example router-parent`.

use std::sync::Arc;
use std::time::Duration;

use pipecall::peer::{BoxError, Endpoint};
use pipecall::router::{new_request, Router};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
struct Ping {
    text: String,
}

#[derive(Debug, Serialize)]
struct Pong {
    text: String,
}

#[derive(Debug, Serialize)]
struct ChildHello {
    from: String,
}

#[derive(Debug, Deserialize)]
struct ParentHello {
    note: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let router = Router::new();
    router.handle_typed("ping", |_ctx, ping: Ping| async move {
        Ok::<_, BoxError>(Pong {
            text: format!("child got: {}", ping.text),
        })
    })?;

    let endpoint = Endpoint::stdio(Some(Arc::new(router)));
    endpoint.start();

    let caller = endpoint.clone();
    tokio::spawn(async move {
        let request = match new_request("child-hello", &ChildHello { from: "child".into() }) {
            Ok(request) => request,
            Err(err) => return eprintln!("child make request: {err}"),
        };
        match caller
            .call_timeout::<_, ParentHello>(Duration::from_secs(2), &request)
            .await
        {
            Ok(reply) => eprintln!("child received: {}", reply.note),
            Err(err) => eprintln!("child -> parent call failed: {err}"),
        }
    });

    endpoint.done().await;
    Ok(())
}
