use std::io::ErrorKind;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Listening Unix domain socket used by the ingestion endpoint.
///
/// The socket file is removed on drop, unless something else has replaced it
/// in the meantime.
pub struct UnixDomainSocket {
    listener: UnixListener,
    path: PathBuf,
    identity: (u64, u64),
}

impl UnixDomainSocket {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// `sockaddr_un.sun_path` capacity.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on `path`, replacing a stale socket file if present.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, Self::DEFAULT_SOCKET_MODE)
    }

    /// Bind with an explicit permission mode.
    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let len = path.as_os_str().len();
        if len >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len,
                max: Self::MAX_PATH_LEN,
            });
        }

        let bind_err = |source: std::io::Error| TransportError::Bind {
            path: path.clone(),
            source,
        };

        // Never remove anything that is not a socket.
        if let Ok(existing) = std::fs::symlink_metadata(&path) {
            if !existing.file_type().is_socket() {
                return Err(bind_err(std::io::Error::new(
                    ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                )));
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(bind_err)?;
        }

        let listener = UnixListener::bind(&path).map_err(bind_err)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .map_err(bind_err)?;
        let created = std::fs::symlink_metadata(&path).map_err(bind_err)?;

        info!(?path, "listening on unix domain socket");
        Ok(Self {
            listener,
            path,
            identity: (created.dev(), created.ino()),
        })
    }

    /// Accept one connection (blocking).
    pub fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(path = ?self.path, "accepted connection");
        Ok(stream)
    }

    /// Accept one connection, checking `running` every `interval`.
    ///
    /// Returns `Ok(None)` once `running` is cleared.
    pub fn accept_while(&self, running: &AtomicBool, interval: Duration) -> Result<Option<UnixStream>> {
        self.listener
            .set_nonblocking(true)
            .map_err(TransportError::Accept)?;
        let outcome = loop {
            if !running.load(Ordering::SeqCst) {
                break Ok(None);
            }
            match self.listener.accept() {
                Ok((stream, _addr)) => break Ok(Some(stream)),
                Err(err) if err.kind() == ErrorKind::WouldBlock => std::thread::sleep(interval),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => break Err(TransportError::Accept(err)),
            }
        };
        self.listener
            .set_nonblocking(false)
            .map_err(TransportError::Accept)?;

        let stream = outcome?;
        if let Some(stream) = &stream {
            stream.set_nonblocking(false).map_err(TransportError::Accept)?;
            debug!(path = ?self.path, "accepted connection");
        }
        Ok(stream)
    }

    /// Connect to a listening socket (blocking).
    pub fn connect(path: impl AsRef<Path>) -> Result<UnixStream> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|e| TransportError::Connect {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!(?path, "connected to unix domain socket");
        Ok(stream)
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UnixDomainSocket {
    fn drop(&mut self) {
        let Ok(metadata) = std::fs::symlink_metadata(&self.path) else {
            return;
        };
        if metadata.file_type().is_socket() && (metadata.dev(), metadata.ino()) == self.identity {
            debug!(path = ?self.path, "cleaning up socket file");
            let _ = std::fs::remove_file(&self.path);
        } else {
            debug!(path = ?self.path, "socket path was replaced; skipping cleanup");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::sync::Arc;

    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sf-uds-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn bind_accept_connect() {
        let dir = temp_dir("basic");
        let sock_path = dir.join("ingest.sock");

        let listener = UnixDomainSocket::bind(&sock_path).unwrap();
        let mode = std::fs::metadata(&sock_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);

        let path_clone = sock_path.clone();
        let client = std::thread::spawn(move || {
            let mut stream = UnixDomainSocket::connect(&path_clone).unwrap();
            stream.write_all(b"chunk").unwrap();
        });

        let mut server = listener.accept().unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"chunk");
        client.join().unwrap();

        drop(listener);
        assert!(!sock_path.exists(), "socket file should be removed on drop");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn accept_while_returns_none_after_stop() {
        let dir = temp_dir("stop");
        let listener = UnixDomainSocket::bind(dir.join("stop.sock")).unwrap();
        let running = Arc::new(AtomicBool::new(true));

        let stopper = {
            let running = Arc::clone(&running);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(30));
                running.store(false, Ordering::SeqCst);
            })
        };

        let accepted = listener
            .accept_while(&running, Duration::from_millis(5))
            .unwrap();
        assert!(accepted.is_none());
        stopper.join().unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn path_too_long_rejected() {
        let long_path = "/tmp/".to_string() + &"s".repeat(200) + ".sock";
        let result = UnixDomainSocket::bind(&long_path);
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[test]
    fn refuses_to_replace_regular_file() {
        let dir = temp_dir("file");
        let path = dir.join("not-a-socket.sock");
        std::fs::write(&path, b"keep me").unwrap();

        let result = UnixDomainSocket::bind(&path);
        assert!(matches!(result, Err(TransportError::Bind { .. })));
        assert_eq!(std::fs::read(&path).unwrap(), b"keep me");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn connect_to_missing_socket_fails() {
        let result = UnixDomainSocket::connect("/nonexistent/streamfeed.sock");
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
