use std::sync::Arc;

use bytes::{Buf, Bytes};
use tracing::debug;

use crate::error::Result;
use crate::queue::BoundedQueue;
use crate::source::ByteSource;

/// Producer half of a [`QueueSource`].
///
/// Chunks pushed here come out of the paired source in the same order. An
/// empty chunk is the end-of-stream marker; it is sent by [`finish`] or when
/// the injector is dropped.
///
/// [`finish`]: ChunkInjector::finish
pub struct ChunkInjector {
    queue: Arc<BoundedQueue<Bytes>>,
    finished: bool,
}

impl ChunkInjector {
    /// Queue a chunk, blocking while the queue is full. Empty chunks are ignored.
    pub fn push(&self, chunk: impl Into<Bytes>) {
        let chunk = chunk.into();
        if !chunk.is_empty() {
            self.queue.push(chunk);
        }
    }

    /// Queue a chunk without blocking, handing it back if the queue is full.
    pub fn try_push(&self, chunk: impl Into<Bytes>) -> std::result::Result<(), Bytes> {
        let chunk = chunk.into();
        if chunk.is_empty() {
            return Ok(());
        }
        self.queue.try_push(chunk)
    }

    /// Number of chunks waiting to be read.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Mark the end of the stream.
    pub fn finish(mut self) {
        self.send_end();
    }

    fn send_end(&mut self) {
        if !self.finished {
            self.finished = true;
            self.queue.push(Bytes::new());
        }
    }
}

impl Drop for ChunkInjector {
    fn drop(&mut self) {
        self.send_end();
    }
}

/// A [`ByteSource`] fed by another thread through a [`BoundedQueue`].
///
/// A chunk longer than the caller's buffer is handed out over several reads.
pub struct QueueSource {
    queue: Arc<BoundedQueue<Bytes>>,
    pending: Bytes,
    finished: bool,
}

impl QueueSource {
    /// Create a connected injector/source pair holding at most `capacity` chunks.
    pub fn channel(capacity: usize) -> (ChunkInjector, QueueSource) {
        let queue = Arc::new(BoundedQueue::with_capacity(capacity));
        let injector = ChunkInjector {
            queue: Arc::clone(&queue),
            finished: false,
        };
        let source = QueueSource {
            queue,
            pending: Bytes::new(),
            finished: false,
        };
        (injector, source)
    }
}

impl ByteSource for QueueSource {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pending.is_empty() {
            if self.finished {
                return Ok(0);
            }
            let chunk = self.queue.pop();
            if chunk.is_empty() {
                debug!("queue source reached end marker");
                self.finished = true;
                return Ok(0);
            }
            self.pending = chunk;
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }

    fn close(&mut self) {
        self.finished = true;
        self.pending.clear();
        self.queue.clear();
    }
}
