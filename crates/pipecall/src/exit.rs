use std::fmt;
use std::io;

use pipecall::frame::FrameError;
use pipecall::peer::RpcError;
use pipecall::router::RouterError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::BrokenPipe => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::MessageTooLarge { .. } | FrameError::Json(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
    }
}

pub fn rpc_error(context: &str, err: RpcError) -> CliError {
    match err {
        RpcError::Frame(err) => frame_error(context, err),
        RpcError::Process(source) => io_error(context, source),
        RpcError::Json(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        RpcError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        RpcError::Remote(_) | RpcError::Closed | RpcError::Cancelled => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
    }
}

pub fn router_error(context: &str, err: RouterError) -> CliError {
    match err {
        RouterError::EmptyMethod => CliError::new(USAGE, format!("{context}: {err}")),
        RouterError::Envelope(_) | RouterError::Payload(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        RouterError::UnknownRoute(_) => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}
