//! Length-prefixed framing for streamfeed.
//!
//! Two formats live here:
//! - Persisted records: a flat file of `[u32 LE length][payload]` entries,
//!   written by [`RecordWriter`] and replayed by [`RecordReader`].
//! - Wire frames carried on the duplex channel: a 2-byte magic ("SF"), a
//!   4-byte little-endian payload length and a 2-byte little-endian kind.

pub mod codec;
pub mod error;
pub mod kind;
pub mod reader;
pub mod record;
pub mod writer;

pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use kind::{kind_name, CONFIG, CONTENT, RESPONSE, STATUS, WRITES_DONE};
pub use reader::FrameReader;
pub use record::{RecordConfig, RecordReader, RecordWriter, DEFAULT_MAX_RECORD, RECORD_PREFIX_SIZE};
pub use writer::FrameWriter;
