//! Wiring an endpoint to a child process's standard streams.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::process::{Child, Command};

use crate::config::EndpointConfig;
use crate::endpoint::Endpoint;
use crate::error::{Result, RpcError};
use crate::handler::Handler;

/// A started child process with an endpoint bound to its stdin/stdout.
#[derive(Debug)]
pub struct ChildEndpoint {
    endpoint: Endpoint,
    child: Child,
}

/// Spawn `command` and bind a running endpoint to its stdio.
///
/// The child's stdin and stdout are always piped; stderr is inherited unless
/// the caller configured it. Must be called within a tokio runtime.
pub fn spawn_command(command: Command, handler: Option<Arc<dyn Handler>>) -> Result<ChildEndpoint> {
    spawn_command_with_config(command, handler, EndpointConfig::default())
}

/// Spawn `command` with explicit endpoint configuration.
///
/// If either pipe cannot be obtained the child is killed and no endpoint is
/// created; any pipe already taken is released on return.
pub fn spawn_command_with_config(
    mut command: Command,
    handler: Option<Arc<dyn Handler>>,
    config: EndpointConfig,
) -> Result<ChildEndpoint> {
    command.stdin(Stdio::piped()).stdout(Stdio::piped());

    let mut child = command.spawn().map_err(RpcError::Process)?;
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();

    let (stdin, stdout) = match (stdin, stdout) {
        (Some(stdin), Some(stdout)) => (stdin, stdout),
        _ => {
            if let Err(err) = child.start_kill() {
                tracing::debug!(error = %err, "failed to kill child after pipe setup failure");
            }
            return Err(RpcError::Process(io::Error::other(
                "child stdio pipes unavailable",
            )));
        }
    };

    tracing::debug!(pid = ?child.id(), "child process started");
    let endpoint = Endpoint::with_config(stdout, stdin, handler, config);
    endpoint.start();

    Ok(ChildEndpoint { endpoint, child })
}

impl ChildEndpoint {
    /// The endpoint talking to the child.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// OS process id, while the child is still running.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Mutable access to the child process handle.
    pub fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    /// Shut the endpoint down, closing the child's stdin, and wait for the
    /// child to exit.
    pub async fn finish(mut self) -> Result<ExitStatus> {
        self.endpoint.shutdown().await;
        self.child.wait().await.map_err(RpcError::Process)
    }

    /// Close the endpoint and kill the child.
    pub async fn kill(mut self) -> Result<()> {
        self.endpoint.close();
        self.child.kill().await.map_err(RpcError::Process)
    }

    /// Split into the endpoint and the child handle.
    pub fn into_parts(self) -> (Endpoint, Child) {
        (self.endpoint, self.child)
    }
}
