use crate::orchestrator::ExchangeState;

/// Errors that can occur while running an exchange.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] streamfeed_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] streamfeed_frame::FrameError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error outside the framing layer (socket setup, mirror sink).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The exchange deadline passed while an operation was in flight.
    #[error("exchange deadline exceeded")]
    DeadlineExceeded,

    /// The channel finished with a non-OK status.
    #[error("exchange finished with status {code}: {message}")]
    Status { code: i32, message: String },

    /// One or more stages of an exchange failed.
    #[error("exchange failed: {0}")]
    Exchange(String),

    /// The peer went away before the exchange was finalized.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// The peer sent something the protocol does not allow here.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The orchestrator cannot run from its current state.
    #[error("exchange cannot run from state {0:?}")]
    InvalidState(ExchangeState),
}

impl SessionError {
    /// True when the error was caused by the exchange deadline.
    pub fn is_deadline(&self) -> bool {
        matches!(self, SessionError::DeadlineExceeded)
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
