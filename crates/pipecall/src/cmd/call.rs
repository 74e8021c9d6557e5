use std::sync::Arc;
use std::time::{Duration, Instant};

use pipecall::peer::{spawn_command, BoxError, ChildEndpoint, RawValue};
use pipecall::router::{new_request, Router};
use tokio::process::Command;

use crate::cmd::serve::{ChildHello, ParentHello};
use crate::cmd::{parse_duration, CallArgs};
use crate::exit::{router_error, rpc_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_response, OutputFormat};

const CHILD_EXIT_GRACE: Duration = Duration::from_secs(2);

pub async fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let payload = resolve_payload(args.json.as_deref())?;
    let request =
        new_request(&args.method, &payload).map_err(|err| router_error("invalid request", err))?;

    let (program, program_args) = args
        .program
        .split_first()
        .ok_or_else(|| CliError::new(USAGE, "no program given after --"))?;
    let mut command = Command::new(program);
    command.args(program_args).kill_on_drop(true);

    let router = parent_router().map_err(|err| router_error("route setup failed", err))?;
    let child = spawn_command(command, Some(Arc::new(router)))
        .map_err(|err| rpc_error(&format!("failed to start {program}"), err))?;
    tracing::debug!(pid = ?child.id(), method = %args.method, ?timeout, "calling child");

    let started = Instant::now();
    let result = child
        .endpoint()
        .call_timeout::<_, Box<RawValue>>(timeout, &request)
        .await;
    let elapsed = started.elapsed();

    stop_child(child).await;

    let response =
        result.map_err(|err| rpc_error(&format!("call {:?} failed", args.method), err))?;
    print_response(&args.method, &response, elapsed, format);
    Ok(SUCCESS)
}

fn resolve_payload(json: Option<&str>) -> CliResult<Box<RawValue>> {
    match json {
        Some(text) => RawValue::from_string(text.trim().to_string())
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}"))),
        None => Ok(RawValue::NULL.to_owned()),
    }
}

/// Routes the child may call back into while a call is in flight.
fn parent_router() -> pipecall::router::Result<Router> {
    let router = Router::new();
    router.handle_typed("child-hello", |_ctx, hello: ChildHello| async move {
        tracing::info!(from = %hello.from, "child said hello");
        Ok::<_, BoxError>(ParentHello {
            from: "parent".to_string(),
            note: format!("hello, {}", hello.from),
        })
    })?;
    Ok(router)
}

/// Close the child's stdin and give it a moment to exit; dropping the
/// handle after that kills it.
async fn stop_child(child: ChildEndpoint) {
    let stats = child.endpoint().stats();
    match tokio::time::timeout(CHILD_EXIT_GRACE, child.finish()).await {
        Ok(Ok(status)) => tracing::debug!(%status, ?stats, "child exited"),
        Ok(Err(err)) => tracing::warn!(error = %err, "failed waiting for child"),
        Err(_) => tracing::warn!("child did not exit in time; killing it"),
    }
}
