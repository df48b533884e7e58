//! Concurrent duplex streaming ingestion.
//!
//! streamfeed captures a byte source (a file or a live named pipe), forwards
//! it in bounded chunks over one long-lived duplex channel and, at the same
//! time, receives server responses and persists them as length-prefixed
//! records that can be replayed later.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte sources, the bounded queue and Unix sockets
//! - [`frame`]: persisted record format and wire framing
//! - [`session`]: channel traits, the stream orchestrator and the reference server

/// Re-export transport types.
pub mod transport {
    pub use streamfeed_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use streamfeed_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use streamfeed_session::*;
}
