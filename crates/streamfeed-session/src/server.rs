use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use bytes::Bytes;
use serde_json::json;
use streamfeed_frame::{
    kind_name, FrameConfig, FrameError, FrameReader, FrameWriter, CONFIG, CONTENT, RESPONSE, STATUS,
    WRITES_DONE,
};
use streamfeed_transport::UnixDomainSocket;
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::message::{FinalStatus, Response, StreamConfig};

/// Error code carried by a response to an oversized chunk.
pub const CHUNK_TOO_LARGE: i32 = 3;

/// Accepts exchanges on a Unix domain socket.
pub struct ExchangeListener {
    socket: UnixDomainSocket,
    frame_config: FrameConfig,
}

impl ExchangeListener {
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            socket: UnixDomainSocket::bind(path)?,
            frame_config: FrameConfig::default(),
        })
    }

    pub fn with_frame_config(mut self, config: FrameConfig) -> Self {
        self.frame_config = config;
        self
    }

    /// Accept the next exchange (blocking).
    pub fn accept(&self) -> Result<ServerExchange> {
        let stream = self.socket.accept()?;
        ServerExchange::from_stream(stream, self.frame_config.clone())
    }

    /// Accept the next exchange, giving up once `running` is cleared.
    pub fn accept_while(
        &self,
        running: &AtomicBool,
        interval: Duration,
    ) -> Result<Option<ServerExchange>> {
        match self.socket.accept_while(running, interval)? {
            Some(stream) => Ok(Some(ServerExchange::from_stream(
                stream,
                self.frame_config.clone(),
            )?)),
            None => Ok(None),
        }
    }

    pub fn path(&self) -> &Path {
        self.socket.path()
    }
}

/// The server end of one exchange.
pub struct ServerExchange {
    reader: FrameReader<UnixStream>,
    writer: FrameWriter<UnixStream>,
}

impl ServerExchange {
    /// Wrap an accepted stream, applying the configured socket timeouts.
    pub fn from_stream(stream: UnixStream, config: FrameConfig) -> Result<Self> {
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;
        let reader_stream = stream.try_clone()?;
        Ok(Self {
            reader: FrameReader::with_config(reader_stream, config.clone()),
            writer: FrameWriter::with_config(stream, config),
        })
    }

    /// Read the configuration message, which must come first.
    pub fn read_config(&mut self) -> Result<StreamConfig> {
        let frame = self.reader.read_frame()?;
        if frame.kind != CONFIG {
            return Err(SessionError::Protocol(format!(
                "expected CONFIG first, got {}",
                kind_name(frame.kind)
            )));
        }
        Ok(serde_json::from_slice(&frame.payload)?)
    }

    /// Next content chunk, or `Ok(None)` once the client half-closes.
    pub fn next_content(&mut self) -> Result<Option<Bytes>> {
        let Some(frame) = self.reader.next_frame()? else {
            return Err(SessionError::Disconnected(
                "client closed without WRITES_DONE".into(),
            ));
        };
        match frame.kind {
            CONTENT => Ok(Some(frame.payload)),
            WRITES_DONE => Ok(None),
            other => Err(SessionError::Protocol(format!(
                "unexpected {} frame from client",
                kind_name(other)
            ))),
        }
    }

    pub fn respond(&mut self, response: &Response) -> Result<()> {
        let payload = serde_json::to_vec(response)?;
        self.writer.send(RESPONSE, &payload).map_err(peer_gone)
    }

    /// Send the final status. This is always the last server frame.
    pub fn finish(mut self, status: &FinalStatus) -> Result<()> {
        let payload = serde_json::to_vec(status)?;
        self.writer.send(STATUS, &payload).map_err(peer_gone)
    }
}

/// A write to a client that already went away reports the same error as a
/// read that finds it gone.
fn peer_gone(err: FrameError) -> SessionError {
    match err {
        FrameError::ConnectionClosed => {
            SessionError::Disconnected("client closed before the response was written".into())
        }
        FrameError::Io(io) if io.kind() == std::io::ErrorKind::ConnectionReset => {
            SessionError::Disconnected(format!("client reset the connection: {io}"))
        }
        other => other.into(),
    }
}

/// Behaviour of the reference responder.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Chunks above this size get an error-flagged response.
    pub max_chunk: usize,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            max_chunk: crate::orchestrator::DEFAULT_CHUNK_SIZE,
        }
    }
}

/// What one answered exchange looked like.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServeSummary {
    pub chunks: u64,
    pub bytes: u64,
    pub rejected: u64,
}

/// Answer one exchange: one response per content chunk, then an OK status.
pub fn answer_exchange(mut exchange: ServerExchange, options: &ServeOptions) -> Result<ServeSummary> {
    let config = exchange.read_config()?;
    info!(feature = %config.feature, "exchange started");

    let mut summary = ServeSummary::default();
    while let Some(chunk) = exchange.next_content()? {
        summary.chunks += 1;
        summary.bytes += chunk.len() as u64;

        let response = if chunk.len() > options.max_chunk {
            summary.rejected += 1;
            warn!(len = chunk.len(), max = options.max_chunk, "rejecting oversized chunk");
            Response::with_error(
                CHUNK_TOO_LARGE,
                format!("chunk of {} bytes exceeds limit {}", chunk.len(), options.max_chunk),
            )
        } else {
            Response::with_results(json!({
                "chunk": summary.chunks,
                "bytes": chunk.len(),
                "feature": config.feature,
            }))
        };
        exchange.respond(&response)?;
    }

    debug!(chunks = summary.chunks, bytes = summary.bytes, "client half-closed");
    exchange.finish(&FinalStatus::ok())?;
    Ok(summary)
}
