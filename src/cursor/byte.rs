//! Seekable unbounded in-memory byte stream.

use core::fmt;
use std::io::SeekFrom;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::error::StreamError;
use crate::stream::{ByteReader, ByteWriter, Limit, Stream};

#[derive(Debug)]
struct CursorState {
  buf: Vec<u8>,
  /// May run past the end of `buf`; writes there zero-fill the gap.
  pos: usize,
  closed: bool,
}

/// Growable in-memory byte stream with a seekable position.
///
/// The IO counterpart of a byte vector: unbounded, so writes never block,
/// and reads return whatever lies between the position and the end. Clones
/// share the same buffer and position. Unlike pipes, closing disables both
/// sides at once.
#[derive(Clone)]
pub struct ByteCursor {
  state: Arc<Mutex<CursorState>>,
}

impl ByteCursor {
  /// Creates an empty cursor positioned at zero.
  pub fn new() -> Self {
    Self::from_bytes(Vec::new())
  }

  /// Creates a cursor over `data`, positioned at zero.
  pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
    ByteCursor {
      state: Arc::new(Mutex::new(CursorState {
        buf: data.into(),
        pos: 0,
        closed: false,
      })),
    }
  }

  /// Bytes between the position and the end of the buffer.
  pub fn readable_len(&self) -> usize {
    let state = self.state.lock();
    state.buf.len().saturating_sub(state.pos)
  }

  /// Total buffer length in bytes.
  pub fn len(&self) -> usize {
    self.state.lock().buf.len()
  }

  /// True when the buffer holds no bytes.
  pub fn is_empty(&self) -> bool {
    self.state.lock().buf.is_empty()
  }

  /// True once the cursor has been closed.
  pub fn is_closed(&self) -> bool {
    self.state.lock().closed
  }

  /// Closes the cursor; every subsequent operation fails with
  /// [`StreamError::Closed`]. Idempotent.
  pub fn close(&self) {
    self.state.lock().closed = true;
  }

  /// Consumes the cursor's current contents, where this is the only handle.
  pub fn into_bytes(self) -> Vec<u8> {
    match Arc::try_unwrap(self.state) {
      Ok(mutex) => mutex.into_inner().buf,
      Err(shared) => shared.lock().buf.clone(),
    }
  }

  /// Writes `data` at the position, overwriting what is there and growing
  /// the buffer as needed. A position past the end zero-fills the gap.
  /// Never blocks.
  pub fn write(&self, data: &[u8]) -> Result<usize, StreamError> {
    let mut state = self.guard()?;
    let pos = state.pos;
    if pos > state.buf.len() {
      state.buf.resize(pos, 0);
    }
    let overlap = data.len().min(state.buf.len() - pos);
    state.buf[pos..pos + overlap].copy_from_slice(&data[..overlap]);
    state.buf.extend_from_slice(&data[overlap..]);
    state.pos += data.len();
    Ok(data.len())
  }

  /// Reads up to `limit` bytes from the position. Never blocks; an
  /// exhausted buffer yields an empty result.
  pub fn read(&self, limit: impl Into<Limit>) -> Result<Vec<u8>, StreamError> {
    let mut state = self.guard()?;
    let window = Self::window(&state, limit.into());
    let out = state.buf[window.clone()].to_vec();
    state.pos = window.end;
    Ok(out)
  }

  /// Like [`read`](Self::read), but stops after the first `\n` (inclusive).
  pub fn readline(&self, limit: impl Into<Limit>) -> Result<Vec<u8>, StreamError> {
    let mut state = self.guard()?;
    let mut window = Self::window(&state, limit.into());
    if let Some(at) = state.buf[window.clone()].iter().position(|&b| b == b'\n') {
      window.end = window.start + at + 1;
    }
    let out = state.buf[window.clone()].to_vec();
    state.pos = window.end;
    Ok(out)
  }

  /// Reads into `buf`, returning the number of bytes placed there.
  pub fn read_into(&self, buf: &mut [u8]) -> Result<usize, StreamError> {
    let mut state = self.guard()?;
    let window = Self::window(&state, Limit::Bounded(buf.len()));
    let n = window.len();
    buf[..n].copy_from_slice(&state.buf[window.clone()]);
    state.pos = window.end;
    Ok(n)
  }

  /// Moves the position. Positions past the end are allowed; positions
  /// before the start fail with [`StreamError::InvalidPosition`].
  pub fn seek(&self, target: SeekFrom) -> Result<u64, StreamError> {
    let mut state = self.guard()?;
    let pos = resolve_seek(target, state.pos as u64, state.buf.len() as u64)?;
    state.pos = pos as usize;
    Ok(pos)
  }

  /// Current position in bytes.
  pub fn tell(&self) -> Result<u64, StreamError> {
    Ok(self.guard()?.pos as u64)
  }

  /// Resizes the buffer to `size` bytes (default: the current position),
  /// zero-filling growth. The position does not move.
  pub fn truncate(&self, size: Option<u64>) -> Result<(), StreamError> {
    let mut state = self.guard()?;
    let size = size.unwrap_or(state.pos as u64) as usize;
    state.buf.resize(size, 0);
    Ok(())
  }

  fn guard(&self) -> Result<MutexGuard<'_, CursorState>, StreamError> {
    let state = self.state.lock();
    if state.closed {
      return Err(StreamError::Closed);
    }
    Ok(state)
  }

  /// The readable byte range starting at the position, capped by `limit`.
  fn window(state: &CursorState, limit: Limit) -> std::ops::Range<usize> {
    let start = state.pos.min(state.buf.len());
    let end = match limit {
      Limit::Bounded(max) => (start + max).min(state.buf.len()),
      Limit::Unbounded => state.buf.len(),
    };
    start..end
  }
}

impl Default for ByteCursor {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for ByteCursor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("ByteCursor")
      .field("len", &state.buf.len())
      .field("pos", &state.pos)
      .field("closed", &state.closed)
      .finish()
  }
}

impl Stream for ByteCursor {
  fn readable(&self) -> bool {
    true
  }

  fn writable(&self) -> bool {
    true
  }

  fn seekable(&self) -> bool {
    true
  }

  fn is_closed(&self) -> bool {
    ByteCursor::is_closed(self)
  }

  fn close(&self) {
    ByteCursor::close(self)
  }

  fn tell(&self) -> Result<u64, StreamError> {
    ByteCursor::tell(self)
  }

  fn seek(&self, target: SeekFrom) -> Result<u64, StreamError> {
    ByteCursor::seek(self, target)
  }
}

impl ByteReader for ByteCursor {
  fn read_blocking(&self) -> bool {
    false
  }

  fn read(&self, limit: Limit) -> Result<Vec<u8>, StreamError> {
    ByteCursor::read(self, limit)
  }

  fn read_into(&self, buf: &mut [u8]) -> Result<usize, StreamError> {
    ByteCursor::read_into(self, buf)
  }

  fn readline(&self, limit: Limit) -> Result<Vec<u8>, StreamError> {
    ByteCursor::readline(self, limit)
  }
}

impl ByteWriter for ByteCursor {
  fn write_blocking(&self) -> bool {
    false
  }

  fn write(&self, data: &[u8]) -> Result<usize, StreamError> {
    ByteCursor::write(self, data)
  }

  fn truncate(&self, size: Option<u64>) -> Result<(), StreamError> {
    ByteCursor::truncate(self, size)
  }
}

/// Resolves a seek target against the current position and the stream end,
/// in whatever unit the stream measures positions.
pub(crate) fn resolve_seek(target: SeekFrom, pos: u64, end: u64) -> Result<u64, StreamError> {
  let resolved = match target {
    SeekFrom::Start(at) => Some(at),
    SeekFrom::Current(delta) => pos.checked_add_signed(delta),
    SeekFrom::End(delta) => end.checked_add_signed(delta),
  };
  resolved.ok_or(StreamError::InvalidPosition)
}
