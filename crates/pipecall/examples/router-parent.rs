//! Parent side of the router demo: spawns `router-child`, calls its `ping`
//! route, and answers its `child-hello` call.
//!
//! ```text
//! cargo build --example router-child --example router-parent
//! cargo run --example router-parent [path/to/router-child]
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pipecall::peer::{spawn_command, BoxError};
use pipecall::router::{new_request, Router};
use serde::{Deserialize, Serialize};
use tokio::process::Command;

#[derive(Debug, Serialize)]
struct Ping {
    text: String,
}

#[derive(Debug, Deserialize)]
struct Pong {
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct ChildHello {
    from: String,
}

#[derive(Debug, Serialize)]
struct ParentHello {
    from: String,
    note: String,
}

fn child_path() -> std::io::Result<PathBuf> {
    if let Some(path) = std::env::args_os().nth(1) {
        return Ok(PathBuf::from(path));
    }
    let mut path = std::env::current_exe()?;
    path.set_file_name(format!("router-child{}", std::env::consts::EXE_SUFFIX));
    Ok(path)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let router = Router::new();
    router.handle_typed("child-hello", |_ctx, hello: ChildHello| async move {
        Ok::<_, BoxError>(ParentHello {
            from: "parent".into(),
            note: format!("hello {}, this is the parent", hello.from),
        })
    })?;

    let child = spawn_command(Command::new(child_path()?), Some(Arc::new(router)))?;

    let request = new_request(
        "ping",
        &Ping {
            text: "hello".into(),
        },
    )?;
    let pong: Pong = child
        .endpoint()
        .call_timeout(Duration::from_secs(2), &request)
        .await?;
    println!("parent received: {}", pong.text);

    // Give the child's greeting a moment before closing its stdin.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let status = child.finish().await?;
    println!("child exited: {status}");
    Ok(())
}
