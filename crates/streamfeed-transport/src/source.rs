use std::path::Path;

use crate::error::Result;
use crate::file::FileSource;

/// A pull-style byte reader drained by the write path.
///
/// `read_bytes` fills at most `buf.len()` bytes and returns how many were
/// written. `Ok(0)` means the source is exhausted and will stay exhausted.
pub trait ByteSource {
    /// Read up to `buf.len()` bytes, blocking until data or end of stream.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Release the underlying resource. Calling it more than once is a no-op.
    fn close(&mut self);
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read_bytes(buf)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Which [`ByteSource`] implementation backs a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    /// A regular file read to EOF.
    #[default]
    File,
    /// A named pipe drained by a background poller.
    Pipe,
}

impl SourceKind {
    /// Short name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            SourceKind::File => "file",
            SourceKind::Pipe => "pipe",
        }
    }
}

/// Open the source selected by `kind` at `path`.
pub fn open_source(kind: SourceKind, path: impl AsRef<Path>) -> Result<Box<dyn ByteSource + Send>> {
    match kind {
        SourceKind::File => Ok(Box::new(FileSource::open(path)?)),
        #[cfg(unix)]
        SourceKind::Pipe => Ok(Box::new(crate::pipe::PipeSource::open(path)?)),
        #[cfg(not(unix))]
        SourceKind::Pipe => {
            let _ = path;
            Err(crate::error::TransportError::Unsupported(kind.name()))
        }
    }
}
