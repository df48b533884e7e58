//! Frame kinds carried on the duplex channel.
//!
//! The client sends `CONFIG` once, then any number of `CONTENT` frames, then
//! `WRITES_DONE`. The server sends `RESPONSE` frames and ends with `STATUS`.

/// One-time stream configuration (JSON).
pub const CONFIG: u16 = 0;

/// Raw content chunk.
pub const CONTENT: u16 = 1;

/// Half-close: no more client frames follow.
pub const WRITES_DONE: u16 = 2;

/// Server response (JSON).
pub const RESPONSE: u16 = 3;

/// Final exchange status (JSON). Always the last server frame.
pub const STATUS: u16 = 4;

/// Returns a human-readable name for a frame kind.
pub fn kind_name(kind: u16) -> &'static str {
    match kind {
        CONFIG => "CONFIG",
        CONTENT => "CONTENT",
        WRITES_DONE => "WRITES_DONE",
        RESPONSE => "RESPONSE",
        STATUS => "STATUS",
        _ => "UNKNOWN",
    }
}
