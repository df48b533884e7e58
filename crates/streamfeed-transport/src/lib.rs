//! Byte sources and local transport for the streamfeed pipeline.
//!
//! This is the lowest layer of streamfeed. It provides:
//! - [`ByteSource`], the pull-style reader the write path drains in chunks
//! - [`FileSource`], [`PipeSource`] and [`QueueSource`] implementations
//! - [`BoundedQueue`], a blocking FIFO used to hand data between threads
//! - Unix domain socket bind/accept/connect for the duplex channel

pub mod error;
pub mod file;
#[cfg(unix)]
pub mod pipe;
pub mod queue;
pub mod queue_source;
pub mod source;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use file::FileSource;
#[cfg(unix)]
pub use pipe::{PipeConfig, PipeConnectionState, PipeSource};
pub use queue::BoundedQueue;
pub use queue_source::{ChunkInjector, QueueSource};
pub use source::{open_source, ByteSource, SourceKind};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
