//! Duplex exchange orchestration for streamfeed.
//!
//! One exchange sends a configuration message, streams content chunks
//! pulled from a [`ByteSource`](streamfeed_transport::ByteSource) and, at
//! the same time, receives responses, hands them to a
//! [`ResponseProcessor`] and optionally persists them as length-prefixed
//! records.

pub mod channel;
pub mod error;
pub mod message;
pub mod orchestrator;
pub mod processor;
#[cfg(unix)]
pub mod server;
#[cfg(unix)]
pub mod socket;

pub use channel::{ChannelFactory, DuplexChannel, MessageReceiver, MessageSender};
pub use error::{Result, SessionError};
pub use message::{Feature, FinalStatus, Request, Response, ResponseError, StreamConfig};
pub use orchestrator::{
    ExchangeReport, ExchangeState, OrchestratorConfig, StreamOrchestrator, DEFAULT_CHUNK_SIZE,
    DEFAULT_DEADLINE,
};
pub use processor::{FeatureProcessor, ResponseProcessor};
#[cfg(unix)]
pub use server::{answer_exchange, ExchangeListener, ServeOptions, ServeSummary, ServerExchange};
#[cfg(unix)]
pub use socket::{UdsChannel, UdsChannelFactory, UdsReceiver, UdsSender};
