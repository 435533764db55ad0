//! Bounded byte FIFO with blocking push/pop.
//!
//! The buffered variant of [`IoChannel`](super::IoChannel). Capacity is fixed
//! at creation; both ends block up to a caller-supplied timeout and transfer
//! partial slices, which is what the element processing contract wants
//! (a short read is progress, a zero read is "no data yet").
//!
//! A `Mutex + Condvar` pair is used instead of a lock-free ring because both
//! ends need bounded blocking waits, not just try-operations.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

struct Ring {
    buf: Box<[u8]>,
    head: usize,
    len: usize,
    closed: bool,
}

impl Ring {
    fn free(&self) -> usize {
        self.buf.len() - self.len
    }

    /// Copy up to `bytes.len()` bytes in, handling wrap-around.
    fn write(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.free());
        let cap = self.buf.len();
        let tail = (self.head + self.len) % cap;
        let first = n.min(cap - tail);
        self.buf[tail..tail + first].copy_from_slice(&bytes[..first]);
        if n > first {
            self.buf[..n - first].copy_from_slice(&bytes[first..n]);
        }
        self.len += n;
        n
    }

    /// Copy up to `out.len()` bytes out, handling wrap-around.
    fn read(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.len);
        let cap = self.buf.len();
        let first = n.min(cap - self.head);
        out[..first].copy_from_slice(&self.buf[self.head..self.head + first]);
        if n > first {
            out[first..n].copy_from_slice(&self.buf[..n - first]);
        }
        self.head = (self.head + n) % cap;
        self.len -= n;
        n
    }
}

struct Shared {
    state: Mutex<Ring>,
    readable: Condvar,
    writable: Condvar,
}

/// Cloneable handle to a bounded byte FIFO.
///
/// A channel is shared by at most two parties (one writer task, one reader
/// task); the handle is cheap to clone and both clones address the same
/// buffer. Dropping the last handle releases the buffer.
#[derive(Clone)]
pub struct ByteChannel {
    shared: Arc<Shared>,
}

impl ByteChannel {
    /// Create a channel with a fixed capacity in bytes.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "byte channel capacity must be non-zero");
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(Ring {
                    buf: vec![0u8; capacity].into_boxed_slice(),
                    head: 0,
                    len: 0,
                    closed: false,
                }),
                readable: Condvar::new(),
                writable: Condvar::new(),
            }),
        }
    }

    /// Enqueue up to `bytes.len()` bytes, blocking up to `timeout` while the
    /// buffer is full.
    ///
    /// Returns the number of bytes accepted (possibly fewer than offered).
    /// Returns [`Error::ChannelFull`] if the deadline elapses with zero bytes
    /// accepted, [`Error::Closed`] if the channel was closed.
    pub fn push(&self, bytes: &[u8], timeout: Duration) -> Result<usize> {
        if bytes.is_empty() {
            return Ok(0);
        }
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock().expect("byte channel poisoned");
        loop {
            if state.closed {
                return Err(Error::Closed);
            }
            if state.free() > 0 {
                let n = state.write(bytes);
                self.shared.readable.notify_one();
                return Ok(n);
            }
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(d) if !d.is_zero() => d,
                _ => return Err(Error::ChannelFull),
            };
            let (guard, wait) = self
                .shared
                .writable
                .wait_timeout(state, remaining)
                .expect("byte channel poisoned");
            state = guard;
            if wait.timed_out() && state.free() == 0 {
                return Err(Error::ChannelFull);
            }
        }
    }

    /// Dequeue up to `out.len()` bytes, blocking up to `timeout` while the
    /// buffer is empty.
    ///
    /// Returns 0 if the deadline elapses with no data (a valid "no data yet"
    /// result, not an error). Returns [`Error::Closed`] once the channel is
    /// closed *and* drained.
    pub fn pop(&self, out: &mut [u8], timeout: Duration) -> Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock().expect("byte channel poisoned");
        loop {
            if state.len > 0 {
                let n = state.read(out);
                self.shared.writable.notify_one();
                return Ok(n);
            }
            if state.closed {
                return Err(Error::Closed);
            }
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(d) if !d.is_zero() => d,
                _ => return Ok(0),
            };
            let (guard, wait) = self
                .shared
                .readable
                .wait_timeout(state, remaining)
                .expect("byte channel poisoned");
            state = guard;
            if wait.timed_out() && state.len == 0 && !state.closed {
                return Ok(0);
            }
        }
    }

    /// Mark the channel finished and wake both ends.
    ///
    /// Buffered data can still be drained; pushes fail immediately.
    pub fn close(&self) {
        let mut state = self.shared.state.lock().expect("byte channel poisoned");
        state.closed = true;
        self.shared.readable.notify_all();
        self.shared.writable.notify_all();
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.shared.state.lock().expect("byte channel poisoned").len
    }

    /// True if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The fixed capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.shared
            .state
            .lock()
            .expect("byte channel poisoned")
            .buf
            .len()
    }
}
