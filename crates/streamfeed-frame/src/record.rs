//! Length-prefixed record files.
//!
//! Each record is a 4-byte little-endian length `N` followed by exactly `N`
//! payload bytes. Records are concatenated with no header or trailer, so a
//! file is complete at every record boundary.

use std::io::{ErrorKind, Read, Write};

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{FrameError, Result};

/// Size of the record length prefix.
pub const RECORD_PREFIX_SIZE: usize = 4;

/// Default upper bound (exclusive) on a single record: 16 MiB.
pub const DEFAULT_MAX_RECORD: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct RecordConfig {
    /// Records of this size or larger are rejected by the reader.
    pub max_record_size: usize,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            max_record_size: DEFAULT_MAX_RECORD,
        }
    }
}

/// Appends length-prefixed records to a byte sink.
pub struct RecordWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Write one record: the payload length as u32 LE, then the payload.
    pub fn write_record(&mut self, payload: &[u8]) -> Result<()> {
        let len = u32::try_from(payload.len()).map_err(|_| FrameError::RecordTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        })?;
        self.inner.write_all(&len.to_le_bytes())?;
        self.inner.write_all(payload)?;
        self.written += 1;
        Ok(())
    }

    /// Serialize `value` as compact JSON and write it as one record.
    pub fn write_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let payload = serde_json::to_vec(value)?;
        self.write_record(&payload)
    }

    /// Number of records written so far.
    pub fn records_written(&self) -> u64 {
        self.written
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reads length-prefixed records back out of a byte stream.
///
/// Fewer than four bytes left before a record is a clean end of stream. Any
/// framing error (an oversized length or a short payload) poisons the reader:
/// every later call returns [`FrameError::Poisoned`].
pub struct RecordReader<R> {
    inner: R,
    config: RecordConfig,
    poisoned: bool,
}

impl<R: Read> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, RecordConfig::default())
    }

    pub fn with_config(inner: R, config: RecordConfig) -> Self {
        Self {
            inner,
            config,
            poisoned: false,
        }
    }

    /// Read the next record, or `Ok(None)` at end of stream.
    pub fn read_record(&mut self) -> Result<Option<Bytes>> {
        if self.poisoned {
            return Err(FrameError::Poisoned);
        }

        let mut prefix = [0u8; RECORD_PREFIX_SIZE];
        let got = read_full(&mut self.inner, &mut prefix)?;
        if got < RECORD_PREFIX_SIZE {
            if got > 0 {
                debug!(trailing = got, "ignoring partial record prefix at end of stream");
            }
            return Ok(None);
        }

        let len = u32::from_le_bytes(prefix) as usize;
        if len >= self.config.max_record_size {
            warn!(len, max = self.config.max_record_size, "record exceeds maximum size");
            self.poisoned = true;
            return Err(FrameError::RecordTooLarge {
                size: len,
                max: self.config.max_record_size,
            });
        }

        let mut payload = BytesMut::zeroed(len);
        let got = read_full(&mut self.inner, &mut payload)?;
        if got < len {
            warn!(expected = len, actual = got, "record payload truncated");
            self.poisoned = true;
            return Err(FrameError::Truncated {
                expected: len,
                actual: got,
            });
        }
        Ok(Some(payload.freeze()))
    }

    /// Read the next record and parse it as JSON.
    pub fn read_json<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        match self.read_record()? {
            Some(payload) => Ok(Some(serde_json::from_slice(&payload)?)),
            None => Ok(None),
        }
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Fill `buf` until it is full or the stream ends; returns bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(filled)
}
