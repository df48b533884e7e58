use std::io::ErrorKind;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use streamfeed_frame::{
    FrameConfig, FrameError, FrameReader, FrameWriter, CONFIG, CONTENT, RESPONSE, STATUS,
    WRITES_DONE,
};
use streamfeed_transport::{TransportError, UnixDomainSocket};
use tracing::{debug, warn};

use crate::channel::{ChannelFactory, DuplexChannel, MessageReceiver, MessageSender};
use crate::error::{Result, SessionError};
use crate::message::{FinalStatus, Request, Response};

const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Connects [`UdsChannel`]s to a listening exchange endpoint.
#[derive(Debug, Clone)]
pub struct UdsChannelFactory {
    path: PathBuf,
    frame_config: FrameConfig,
    retry_interval: Duration,
}

impl UdsChannelFactory {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            frame_config: FrameConfig::default(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    pub fn with_frame_config(mut self, config: FrameConfig) -> Self {
        self.frame_config = config;
        self
    }

    /// How long to wait between connect attempts while the endpoint is not up.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ChannelFactory for UdsChannelFactory {
    type Channel = UdsChannel;

    fn connect(&self, deadline: Instant) -> Result<UdsChannel> {
        let stream = loop {
            match UnixDomainSocket::connect(&self.path) {
                Ok(stream) => break stream,
                Err(TransportError::Connect { source, .. }) if is_not_ready(&source) => {
                    let Some(remaining) = remaining(deadline) else {
                        warn!(path = ?self.path, "endpoint not ready before deadline");
                        return Err(SessionError::DeadlineExceeded);
                    };
                    debug!(path = ?self.path, error = %source, "endpoint not ready; retrying");
                    std::thread::sleep(self.retry_interval.min(remaining));
                }
                Err(err) => return Err(err.into()),
            }
        };
        UdsChannel::from_stream(stream, self.frame_config.clone(), deadline)
    }
}

/// A duplex channel over one connected Unix domain socket.
pub struct UdsChannel {
    reader: FrameReader<UnixStream>,
    writer: FrameWriter<UnixStream>,
    deadline: Instant,
}

impl UdsChannel {
    /// Wrap an already-connected stream. Both directions stop at `deadline`.
    pub fn from_stream(stream: UnixStream, config: FrameConfig, deadline: Instant) -> Result<Self> {
        let reader_stream = stream.try_clone()?;
        Ok(Self {
            reader: FrameReader::with_config(reader_stream, config.clone()),
            writer: FrameWriter::with_config(stream, config),
            deadline,
        })
    }
}

impl DuplexChannel for UdsChannel {
    type Sender = UdsSender;
    type Receiver = UdsReceiver;

    fn into_split(self) -> (UdsSender, UdsReceiver) {
        (
            UdsSender {
                writer: self.writer,
                deadline: self.deadline,
                closed: false,
            },
            UdsReceiver {
                reader: self.reader,
                deadline: self.deadline,
                status: None,
                drained: false,
            },
        )
    }
}

/// Send half of a [`UdsChannel`].
pub struct UdsSender {
    writer: FrameWriter<UnixStream>,
    deadline: Instant,
    closed: bool,
}

impl UdsSender {
    fn arm(&self) -> Result<()> {
        let remaining = remaining(self.deadline).ok_or(SessionError::DeadlineExceeded)?;
        let timeout = cap(remaining, self.writer.config().write_timeout);
        self.writer.get_ref().set_write_timeout(Some(timeout))?;
        Ok(())
    }
}

impl MessageSender for UdsSender {
    fn send(&mut self, request: &Request) -> Result<()> {
        if self.closed {
            return Err(SessionError::Protocol("send after writes_done".into()));
        }
        self.arm()?;
        let sent = match request {
            Request::Config(config) => {
                let payload = serde_json::to_vec(config)?;
                self.writer.send(CONFIG, &payload)
            }
            Request::Content(chunk) => self.writer.send(CONTENT, chunk),
        };
        sent.map_err(deadline_or_frame)
    }

    fn writes_done(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.arm()?;
        self.writer
            .send(WRITES_DONE, &[])
            .map_err(deadline_or_frame)?;
        self.closed = true;
        match self.writer.get_ref().shutdown(Shutdown::Write) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Receive half of a [`UdsChannel`].
pub struct UdsReceiver {
    reader: FrameReader<UnixStream>,
    deadline: Instant,
    status: Option<FinalStatus>,
    drained: bool,
}

impl UdsReceiver {
    fn arm(&self) -> Result<()> {
        let remaining = remaining(self.deadline).ok_or(SessionError::DeadlineExceeded)?;
        let timeout = cap(remaining, self.reader.config().read_timeout);
        self.reader.get_ref().set_read_timeout(Some(timeout))?;
        Ok(())
    }
}

impl MessageReceiver for UdsReceiver {
    fn recv(&mut self) -> Result<Option<Response>> {
        if self.drained {
            return Ok(None);
        }
        self.arm()?;
        let Some(frame) = self.reader.next_frame().map_err(deadline_or_frame)? else {
            debug!("peer closed the channel");
            self.drained = true;
            return Ok(None);
        };

        match frame.kind {
            RESPONSE => Ok(Some(serde_json::from_slice(&frame.payload)?)),
            STATUS => {
                let status: FinalStatus = serde_json::from_slice(&frame.payload)?;
                debug!(code = status.code, "final status received");
                self.status = Some(status);
                self.drained = true;
                Ok(None)
            }
            other => Err(SessionError::Protocol(format!(
                "unexpected {} frame from server",
                streamfeed_frame::kind_name(other)
            ))),
        }
    }

    fn finish(&mut self) -> Result<FinalStatus> {
        while !self.drained {
            if let Some(response) = self.recv()? {
                warn!(error = response.is_error(), "discarding response received after drain");
            }
        }
        self.status
            .take()
            .ok_or_else(|| SessionError::Disconnected("channel closed without a final status".into()))
    }
}

fn remaining(deadline: Instant) -> Option<Duration> {
    deadline
        .checked_duration_since(Instant::now())
        .filter(|left| !left.is_zero())
}

/// Per-operation socket timeout: the time left, or the configured limit if shorter.
fn cap(remaining: Duration, configured: Option<Duration>) -> Duration {
    configured.map_or(remaining, |limit| limit.min(remaining))
}

fn is_not_ready(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::NotFound | ErrorKind::ConnectionRefused)
}

fn deadline_or_frame(err: FrameError) -> SessionError {
    match err {
        FrameError::Io(io) if matches!(io.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
            SessionError::DeadlineExceeded
        }
        other => other.into(),
    }
}
