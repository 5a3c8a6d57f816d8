//! Blocking fixed-capacity byte pipe.

use core::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::error::StreamError;
use crate::pipe::ring::BoundedRing;
use crate::pipe::DEFAULT_CAPACITY;
use crate::stream::{ByteReader, ByteWriter, Limit, Stream};

#[derive(Debug)]
struct PipeState {
  ring: BoundedRing,
  closed: bool,
}

struct PipeCore {
  /// Condition anchor. Held only for cursor math and the bounded copy of one
  /// contiguous run; both condvars wait on it.
  state: Mutex<PipeState>,
  data_available: Condvar,
  space_available: Condvar,
  /// Serializes writers against each other. Readers never touch it.
  write_serial: Mutex<()>,
  /// Serializes readers against each other. Writers never touch it.
  read_serial: Mutex<()>,
}

/// In-process byte pipe over a fixed-capacity circular buffer.
///
/// Clones share the same pipe, so one end can be handed to a producer thread
/// and the other kept by the consumer. A reader and a writer proceed
/// concurrently; concurrent readers (or writers) serialize against each
/// other. Writers block while the buffer is full, readers while it is empty.
///
/// Closing is a half-close: further writes fail with
/// [`StreamError::Closed`], while buffered bytes remain readable until
/// drained. A reader or writer blocked at close time returns its partial
/// result instead of failing.
#[derive(Clone)]
pub struct BytePipe {
  core: Arc<PipeCore>,
}

impl BytePipe {
  /// Creates a pipe with [`DEFAULT_CAPACITY`].
  pub fn new() -> Self {
    Self::with_capacity(DEFAULT_CAPACITY)
  }

  /// Creates a pipe holding at most `capacity` buffered bytes.
  ///
  /// Panics if `capacity` is zero.
  pub fn with_capacity(capacity: usize) -> Self {
    BytePipe {
      core: Arc::new(PipeCore {
        state: Mutex::new(PipeState {
          ring: BoundedRing::with_capacity(capacity),
          closed: false,
        }),
        data_available: Condvar::new(),
        space_available: Condvar::new(),
        write_serial: Mutex::new(()),
        read_serial: Mutex::new(()),
      }),
    }
  }

  /// Buffer capacity in bytes.
  pub fn capacity(&self) -> usize {
    self.core.state.lock().ring.capacity()
  }

  /// Bytes currently buffered, readable without blocking.
  pub fn readable_len(&self) -> usize {
    self.core.state.lock().ring.len()
  }

  /// Bytes currently writable without blocking.
  pub fn writable_len(&self) -> usize {
    self.core.state.lock().ring.free()
  }

  /// True once the pipe has been closed.
  pub fn is_closed(&self) -> bool {
    self.core.state.lock().closed
  }

  /// Closes the write side and wakes every blocked reader and writer.
  /// Idempotent; buffered bytes remain readable until drained.
  pub fn close(&self) {
    let mut state = self.core.state.lock();
    if !state.closed {
      state.closed = true;
      debug!(buffered = state.ring.len(), "byte pipe closed");
      self.core.data_available.notify_all();
      self.core.space_available.notify_all();
    }
  }

  /// Writes all of `data`, blocking whenever the buffer is full.
  ///
  /// Returns the number of bytes written, which equals `data.len()` unless
  /// the pipe closes mid-call, in which case the count so far is returned
  /// without error. Fails with [`StreamError::Closed`] only when the pipe is
  /// already closed at entry.
  pub fn write(&self, data: &[u8]) -> Result<usize, StreamError> {
    let _writer = self.core.write_serial.lock();
    let mut state = self.core.state.lock();
    if state.closed {
      return Err(StreamError::Closed);
    }
    let mut done = 0;
    while done < data.len() {
      while state.ring.is_full() && !state.closed {
        self.core.space_available.wait(&mut state);
      }
      if state.closed {
        trace!(written = done, requested = data.len(), "write cut short by close");
        return Ok(done);
      }
      let was_empty = state.ring.is_empty();
      done += state.ring.write_run(&data[done..]);
      if was_empty {
        // Edge-triggered: only the empty->nonempty transition can have a
        // reader parked behind it.
        self.core.data_available.notify_one();
      }
    }
    Ok(done)
  }

  /// Reads up to `limit` bytes, blocking while the pipe is empty and open.
  ///
  /// `Limit::Unbounded` reads until the pipe is closed and drained. Fails
  /// with [`StreamError::Closed`] only when the pipe is already closed and
  /// drained at entry; closing mid-call yields the bytes collected so far.
  pub fn read(&self, limit: impl Into<Limit>) -> Result<Vec<u8>, StreamError> {
    self.read_inner(limit.into(), false)
  }

  /// Like [`read`](Self::read), but stops after the first `\n` (inclusive).
  pub fn readline(&self, limit: impl Into<Limit>) -> Result<Vec<u8>, StreamError> {
    self.read_inner(limit.into(), true)
  }

  /// Reads into `buf`, blocking until it is filled, the pipe closes, or —
  /// drained and closed — nothing more can arrive. Returns the bytes placed.
  pub fn read_into(&self, buf: &mut [u8]) -> Result<usize, StreamError> {
    let _reader = self.core.read_serial.lock();
    let mut state = self.entry_checked_read_state()?;
    let mut done = 0;
    while done < buf.len() {
      if !Self::await_data(&self.core, &mut state) {
        break;
      }
      let was_full = state.ring.is_full();
      let run = state.ring.peek_run(buf.len() - done);
      let n = run.len();
      buf[done..done + n].copy_from_slice(run);
      state.ring.advance_read(n);
      done += n;
      if was_full {
        self.core.space_available.notify_one();
      }
      if state.closed && state.ring.is_empty() {
        break;
      }
    }
    Ok(done)
  }

  fn read_inner(&self, limit: Limit, stop_at_newline: bool) -> Result<Vec<u8>, StreamError> {
    let _reader = self.core.read_serial.lock();
    let mut state = self.entry_checked_read_state()?;
    let mut out = Vec::new();
    while !limit.reached(out.len()) {
      if !Self::await_data(&self.core, &mut state) {
        break;
      }
      let was_full = state.ring.is_full();
      let run = state.ring.peek_run(limit.remaining(out.len()));
      let newline = if stop_at_newline {
        run.iter().position(|&b| b == b'\n').map(|at| at + 1)
      } else {
        None
      };
      let take = newline.unwrap_or(run.len());
      out.extend_from_slice(&run[..take]);
      state.ring.advance_read(take);
      if was_full {
        self.core.space_available.notify_one();
      }
      if newline.is_some() {
        break;
      }
      if state.closed && state.ring.is_empty() {
        break;
      }
    }
    Ok(out)
  }

  fn entry_checked_read_state(&self) -> Result<MutexGuard<'_, PipeState>, StreamError> {
    let state = self.core.state.lock();
    if state.closed && state.ring.is_empty() {
      return Err(StreamError::Closed);
    }
    Ok(state)
  }

  /// Waits until the ring holds data. Returns false on the reader terminal
  /// condition (closed and drained).
  fn await_data(core: &PipeCore, state: &mut MutexGuard<'_, PipeState>) -> bool {
    while state.ring.is_empty() && !state.closed {
      core.data_available.wait(state);
    }
    !state.ring.is_empty()
  }
}

impl Default for BytePipe {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for BytePipe {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.core.state.lock();
    f.debug_struct("BytePipe")
      .field("capacity", &state.ring.capacity())
      .field("buffered", &state.ring.len())
      .field("closed", &state.closed)
      .finish()
  }
}

impl Stream for BytePipe {
  fn readable(&self) -> bool {
    true
  }

  fn writable(&self) -> bool {
    true
  }

  fn is_closed(&self) -> bool {
    BytePipe::is_closed(self)
  }

  fn close(&self) {
    BytePipe::close(self)
  }

  fn tell(&self) -> Result<u64, StreamError> {
    let state = self.core.state.lock();
    if state.closed {
      return Err(StreamError::Closed);
    }
    Ok(state.ring.total_written())
  }
}

impl ByteReader for BytePipe {
  fn read_blocking(&self) -> bool {
    true
  }

  fn read(&self, limit: Limit) -> Result<Vec<u8>, StreamError> {
    BytePipe::read(self, limit)
  }

  fn read_into(&self, buf: &mut [u8]) -> Result<usize, StreamError> {
    BytePipe::read_into(self, buf)
  }

  fn readline(&self, limit: Limit) -> Result<Vec<u8>, StreamError> {
    BytePipe::readline(self, limit)
  }
}

impl ByteWriter for BytePipe {
  fn write_blocking(&self) -> bool {
    true
  }

  fn write(&self, data: &[u8]) -> Result<usize, StreamError> {
    BytePipe::write(self, data)
  }
}
