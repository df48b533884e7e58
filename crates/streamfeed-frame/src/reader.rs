use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{decode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Reads complete wire frames from any `Read` stream.
///
/// Partial reads are buffered internally; callers only see whole frames.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    scratch: Vec<u8>,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            scratch: vec![0u8; READ_CHUNK_SIZE],
            config,
        }
    }

    /// Read the next frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` on EOF.
    pub fn read_frame(&mut self) -> Result<Frame> {
        self.next_frame()?.ok_or(FrameError::ConnectionClosed)
    }

    /// Read the next frame, or `Ok(None)` if the stream ended cleanly between
    /// frames. EOF inside a frame is still `ConnectionClosed`.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.max_payload_size)? {
                return Ok(Some(frame));
            }

            let read = match self.inner.read(&mut self.scratch) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&self.scratch[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::codec::{encode_frame, MAGIC};
    use crate::kind::{CONFIG, CONTENT, RESPONSE, STATUS};

    fn wire(frames: &[(u16, &[u8])]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for (kind, payload) in frames {
            encode_frame(*kind, payload, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn reads_frames_in_order() {
        let bytes = wire(&[
            (CONFIG, &b"{}"[..]),
            (CONTENT, &b"abc"[..]),
            (CONTENT, &b"def"[..]),
        ]);
        let mut reader = FrameReader::new(Cursor::new(bytes));

        assert_eq!(reader.read_frame().unwrap().kind, CONFIG);
        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), b"abc");
        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), b"def");
        assert!(matches!(reader.read_frame(), Err(FrameError::ConnectionClosed)));
    }

    #[test]
    fn clean_eof_between_frames_is_none() {
        let bytes = wire(&[(STATUS, &b"{\"code\":0}"[..])]);
        let mut reader = FrameReader::new(Cursor::new(bytes));
        assert!(reader.next_frame().unwrap().is_some());
        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn eof_mid_frame_is_connection_closed() {
        let mut partial = BytesMut::new();
        partial.put_slice(&MAGIC);
        partial.put_u32_le(32);
        partial.put_u16_le(RESPONSE);
        partial.put_slice(b"only-part");

        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()));
        assert!(matches!(reader.next_frame(), Err(FrameError::ConnectionClosed)));
    }

    #[test]
    fn reassembles_byte_by_byte_input() {
        let bytes = wire(&[(CONTENT, &b"slow-chunk"[..])]);
        let mut reader = FrameReader::new(OneByteReader { bytes, pos: 0 });
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload.as_ref(), b"slow-chunk");
    }

    #[test]
    fn large_payload_spanning_many_reads() {
        let payload = vec![0x5A; 300 * 1024];
        let bytes = wire(&[(CONTENT, payload.as_slice())]);
        let mut reader = FrameReader::new(Cursor::new(bytes));
        assert_eq!(reader.read_frame().unwrap().payload.len(), payload.len());
    }

    #[test]
    fn oversized_frame_rejected() {
        let bytes = wire(&[(CONTENT, &[0u8; 64][..])]);
        let cfg = FrameConfig {
            max_payload_size: 16,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(bytes), cfg);
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn interrupted_read_retries_and_would_block_surfaces() {
        let bytes = wire(&[(CONTENT, &b"ok"[..])]);
        let mut reader = FrameReader::new(FailOnce {
            kind: ErrorKind::Interrupted,
            failed: false,
            inner: Cursor::new(bytes.clone()),
        });
        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), b"ok");

        let mut reader = FrameReader::new(FailOnce {
            kind: ErrorKind::WouldBlock,
            failed: false,
            inner: Cursor::new(bytes),
        });
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::Io(e)) if e.kind() == ErrorKind::WouldBlock
        ));
    }

    #[cfg(unix)]
    #[test]
    fn roundtrip_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        let sender = std::thread::spawn(move || {
            for i in 0..32u8 {
                writer.send(CONTENT, &[i; 100]).unwrap();
            }
        });
        for i in 0..32u8 {
            let frame = reader.read_frame().unwrap();
            assert_eq!(frame.payload.as_ref(), &[i; 100][..]);
        }
        sender.join().unwrap();
    }

    struct OneByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for OneByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct FailOnce {
        kind: ErrorKind,
        failed: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for FailOnce {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.failed {
                self.failed = true;
                return Err(std::io::Error::from(self.kind));
            }
            self.inner.read(buf)
        }
    }
}
