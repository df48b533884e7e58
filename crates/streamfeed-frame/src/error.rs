/// Errors that can occur while framing records and messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x5346 \"SF\")")]
    InvalidMagic,

    /// A wire frame payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A persisted record declares a length at or above the configured limit.
    #[error("record too large ({size} bytes, limit {max})")]
    RecordTooLarge { size: usize, max: usize },

    /// The source ended before the declared record length was read.
    #[error("truncated record (declared {expected} bytes, read {actual})")]
    Truncated { expected: usize, actual: usize },

    /// A previous framing failure left the stream offset untrustworthy.
    #[error("record stream is unusable after an earlier framing error")]
    Poisoned,

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record payload could not be serialized or parsed.
    #[error("record payload error: {0}")]
    Json(#[from] serde_json::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
