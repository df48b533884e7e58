use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tracing::{debug, error, info, warn};

use crate::error::{Result, TransportError};
use crate::source::ByteSource;

/// Default pipe buffer size on Linux.
pub const DEFAULT_READ_CHUNK: usize = 65536;

/// Lifecycle of a [`PipeSource`].
///
/// `Closed` and `Errored` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeConnectionState {
    Opening,
    Reading,
    Closed,
    Errored,
}

impl PipeConnectionState {
    /// Whether the poller can still deliver bytes.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Opening | Self::Reading)
    }
}

/// Configuration for the background poller.
#[derive(Debug, Clone)]
pub struct PipeConfig {
    /// Upper bound on one `poll` call. Also bounds how long `close` waits.
    pub poll_interval: Duration,
    /// Size of each `read` issued while draining the descriptor.
    pub read_chunk: usize,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }
}

struct Buffered {
    data: BytesMut,
    state: PipeConnectionState,
}

struct Shared {
    buffered: Mutex<Buffered>,
    ready: Condvar,
    stop: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Buffered> {
        self.buffered.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn append(&self, bytes: &[u8]) {
        self.lock().data.extend_from_slice(bytes);
        self.ready.notify_all();
    }

    fn terminate(&self, state: PipeConnectionState) {
        let mut buffered = self.lock();
        if buffered.state.is_active() {
            buffered.state = state;
        }
        drop(buffered);
        self.ready.notify_all();
    }
}

/// A named pipe drained by a background poller into an in-memory buffer.
///
/// The poller waits on the non-blocking descriptor with `poll(2)` and appends
/// everything readable to a buffer shared with [`read_bytes`]. That buffer is
/// the only state the two threads share and it is always accessed under one
/// mutex.
///
/// Once the peer hangs up or the descriptor fails, `read_bytes` drains the
/// remaining buffer and then returns `Ok(0)` forever. Clean hang-up and I/O
/// failure look the same through `read_bytes`; use [`state`] to tell them
/// apart.
///
/// [`read_bytes`]: ByteSource::read_bytes
/// [`state`]: PipeSource::state
pub struct PipeSource {
    path: PathBuf,
    shared: Arc<Shared>,
    poller: Option<JoinHandle<()>>,
    config: PipeConfig,
}

impl PipeSource {
    /// Open `path` with the default poller configuration.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, PipeConfig::default())
    }

    /// Open `path` non-blocking and start the poller.
    pub fn open_with_config(path: impl AsRef<Path>, config: PipeConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let shared = Arc::new(Shared {
            buffered: Mutex::new(Buffered {
                data: BytesMut::new(),
                state: PipeConnectionState::Opening,
            }),
            ready: Condvar::new(),
            stop: AtomicBool::new(false),
        });

        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)
            .map_err(|e| {
                error!(?path, "failed to open pipe");
                TransportError::Open {
                    path: path.clone(),
                    source: e,
                }
            })?;

        shared.lock().state = PipeConnectionState::Reading;

        let poller = {
            let shared = Arc::clone(&shared);
            let path = path.clone();
            let config = config.clone();
            std::thread::Builder::new()
                .name("streamfeed-pipe".to_string())
                .spawn(move || poll_loop(file, &path, &shared, &config))?
        };

        debug!(?path, "pipe source reading");
        Ok(Self {
            path,
            shared,
            poller: Some(poller),
            config,
        })
    }

    /// Current connection state.
    pub fn state(&self) -> PipeConnectionState {
        self.shared.lock().state
    }

    /// Number of bytes received but not yet read.
    pub fn buffered_len(&self) -> usize {
        self.shared.lock().data.len()
    }

    /// The pipe path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for PipeSource {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut buffered = self.shared.lock();
        loop {
            if !buffered.data.is_empty() {
                let n = buf.len().min(buffered.data.len());
                buf[..n].copy_from_slice(&buffered.data[..n]);
                buffered.data.advance(n);
                return Ok(n);
            }
            if !buffered.state.is_active() {
                return Ok(0);
            }
            buffered = self
                .shared
                .ready
                .wait_timeout(buffered, self.config.poll_interval)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn close(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        if let Some(poller) = self.poller.take() {
            if poller.join().is_err() {
                warn!(path = ?self.path, "pipe poller panicked");
            }
            self.shared.terminate(PipeConnectionState::Closed);
            debug!(path = ?self.path, "pipe source closed");
        }
    }
}

impl Drop for PipeSource {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PipeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeSource")
            .field("path", &self.path)
            .field("state", &self.state())
            .finish()
    }
}

fn poll_loop(mut file: File, path: &Path, shared: &Shared, config: &PipeConfig) {
    let fd = file.as_raw_fd();
    let timeout_ms = config.poll_interval.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    let mut chunk = vec![0u8; config.read_chunk.max(1)];

    while !shared.stop.load(Ordering::Acquire) {
        let mut fds = libc::pollfd {
            fd,
            events: libc::POLLIN | libc::POLLHUP | libc::POLLERR,
            revents: 0,
        };

        // SAFETY: `fds` is a single valid, writable pollfd and `fd` stays open
        // for the whole loop because `file` is owned by this function.
        let rc = unsafe { libc::poll(&mut fds, 1, timeout_ms) };
        if rc == 0 {
            continue;
        }
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if matches!(err.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) {
                continue;
            }
            error!(?path, %err, "pipe poll failed");
            shared.terminate(PipeConnectionState::Errored);
            return;
        }

        if fds.revents & (libc::POLLIN | libc::POLLHUP) != 0 {
            if let Err(err) = drain(&mut file, &mut chunk, shared) {
                error!(?path, %err, "pipe read failed");
                shared.terminate(PipeConnectionState::Errored);
                return;
            }
        }

        if fds.revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
            error!(?path, revents = fds.revents, "pipe reported an error condition");
            shared.terminate(PipeConnectionState::Errored);
            return;
        }
        if fds.revents & libc::POLLHUP != 0 {
            info!(?path, "pipe has been closed by remote side");
            shared.terminate(PipeConnectionState::Closed);
            return;
        }
    }
    debug!(?path, "pipe poller stopped");
}

/// Read everything currently available. A zero-length read ends the pass
/// without closing the source.
fn drain(file: &mut File, chunk: &mut [u8], shared: &Shared) -> std::io::Result<()> {
    loop {
        match file.read(chunk) {
            Ok(0) => return Ok(()),
            Ok(n) => shared.append(&chunk[..n]),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(()),
            Err(err) => return Err(err),
        }
    }
}
