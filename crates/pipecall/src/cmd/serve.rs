use std::sync::Arc;
use std::time::Duration;

use pipecall::peer::{BoxError, Endpoint, RawValue};
use pipecall::router::{new_request, Router};
use serde::{Deserialize, Serialize};

use crate::cmd::ServeArgs;
use crate::exit::{router_error, CliResult, SUCCESS};

const HELLO_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Default, Deserialize)]
struct Ping {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct Pong {
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct SleepRequest {
    #[serde(default)]
    ms: u64,
}

#[derive(Debug, Serialize)]
struct SleepResponse {
    slept_ms: u64,
}

#[derive(Debug, Serialize)]
struct ServerInfo {
    name: &'static str,
    version: &'static str,
    pid: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ChildHello {
    pub from: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ParentHello {
    pub from: String,
    pub note: String,
}

pub async fn run(args: ServeArgs) -> CliResult<i32> {
    let router = Arc::new(build_router().map_err(|err| router_error("route setup failed", err))?);
    tracing::info!(routes = ?router.routes(), "serving on stdio");

    let endpoint = Endpoint::stdio(Some(router));
    endpoint.start();

    if args.hello {
        tokio::spawn(greet_parent(endpoint.clone()));
    }

    tokio::select! {
        _ = endpoint.done() => tracing::debug!("input closed"),
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => tracing::info!("interrupted"),
            Err(err) => tracing::warn!(error = %err, "signal handler failed"),
        },
    }

    endpoint.shutdown().await;
    tracing::debug!(stats = ?endpoint.stats(), "serve finished");
    Ok(SUCCESS)
}

pub fn build_router() -> pipecall::router::Result<Router> {
    let router = Router::new();

    router.handle_typed("ping", |_ctx, ping: Ping| async move {
        Ok::<_, BoxError>(Pong {
            text: format!("child got: {}", ping.text),
        })
    })?;

    router.handle("echo", |_ctx, payload: Box<RawValue>| async move {
        Ok::<_, BoxError>(payload)
    })?;

    router.handle_typed("sleep", |ctx, req: SleepRequest| async move {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(req.ms)) => {}
            _ = ctx.closed() => return Err(BoxError::from("endpoint closed while sleeping")),
        }
        Ok(SleepResponse { slept_ms: req.ms })
    })?;

    router.handle("info", |_ctx, _payload| async move {
        Ok::<_, BoxError>(ServerInfo {
            name: "pipecall",
            version: env!("CARGO_PKG_VERSION"),
            pid: std::process::id(),
        })
    })?;

    Ok(router)
}

async fn greet_parent(endpoint: Endpoint) {
    let hello = ChildHello {
        from: "child".to_string(),
    };
    let request = match new_request("child-hello", &hello) {
        Ok(request) => request,
        Err(err) => {
            tracing::warn!(error = %err, "failed to build hello request");
            return;
        }
    };
    match endpoint
        .call_timeout::<_, ParentHello>(HELLO_TIMEOUT, &request)
        .await
    {
        Ok(reply) => tracing::info!(from = %reply.from, note = %reply.note, "parent replied"),
        Err(err) => tracing::warn!(error = %err, "child -> parent call failed"),
    }
}
