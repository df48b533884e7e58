use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::source::ByteSource;

/// A regular file read front to back.
///
/// Each `read_bytes` call fills the buffer completely unless the file ends
/// first, so chunk boundaries depend only on the requested size.
pub struct FileSource {
    file: Option<File>,
    path: PathBuf,
}

impl FileSource {
    /// Open `path` read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| TransportError::Open {
            path: path.clone(),
            source: e,
        })?;
        debug!(?path, "opened file source");
        Ok(Self {
            file: Some(file),
            path,
        })
    }

    /// The path this source reads from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileSource {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(file) = self.file.as_mut() else {
            return Ok(0);
        };

        let mut filled = 0usize;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        Ok(filled)
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            debug!(path = ?self.path, "closed file source");
        }
    }
}

impl std::fmt::Debug for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSource")
            .field("path", &self.path)
            .field("open", &self.file.is_some())
            .finish()
    }
}
