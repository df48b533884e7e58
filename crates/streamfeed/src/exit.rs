use std::fmt;
use std::io;

use streamfeed_frame::FrameError;
use streamfeed_session::SessionError;
use streamfeed_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
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
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound
        | io::ErrorKind::PermissionDenied
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::AlreadyExists => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Open { source, .. }
        | TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::RecordTooLarge { .. }
        | FrameError::Truncated { .. }
        | FrameError::Poisoned
        | FrameError::PayloadTooLarge { .. }
        | FrameError::InvalidMagic
        | FrameError::Json(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        FrameError::ConnectionClosed => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
    }
}

pub fn session_error(context: &str, err: SessionError) -> CliError {
    match err {
        SessionError::Transport(err) => transport_error(context, err),
        SessionError::Frame(err) => frame_error(context, err),
        SessionError::Io(err) => io_error(context, err),
        SessionError::DeadlineExceeded => CliError::new(TIMEOUT, format!("{context}: {err}")),
        SessionError::Json(_) | SessionError::Protocol(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        SessionError::Disconnected(_) => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        SessionError::Status { .. } | SessionError::Exchange(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        SessionError::InvalidState(_) => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}
