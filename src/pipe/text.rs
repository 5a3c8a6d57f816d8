//! Blocking fixed-capacity text pipe.
//!
//! Same ring mechanism as [`BytePipe`](crate::pipe::BytePipe), but the
//! payload is UTF-8 text: writes encode, reads decode incrementally, and a
//! character is never split across two returned chunks. Because character
//! counts and encoded byte lengths differ, the advertised writable space is
//! an approximation; writes that were promised not to block stage their
//! encoded overflow in a small side buffer ("extra") which readers flush
//! back into the ring opportunistically.

use core::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::error::StreamError;
use crate::pipe::decoder::ChunkDecoder;
use crate::pipe::ring::BoundedRing;
use crate::pipe::DEFAULT_CAPACITY;
use crate::stream::{Limit, Stream, TextReader, TextWriter};

#[derive(Debug)]
struct TextState {
  ring: BoundedRing,
  /// Encoded bytes that did not fit the ring on a promised-non-blocking
  /// write. Flushed into the ring whenever a reader finds it empty.
  extra: Vec<u8>,
  closed: bool,
  /// Characters ever accepted by `write`. `readable_len` is defined against
  /// characters logically written, not bytes physically stored.
  written_chars: u64,
  /// Characters ever returned to readers.
  read_chars: u64,
}

impl TextState {
  /// True when nothing more can ever be read.
  fn drained(&self) -> bool {
    self.ring.is_empty() && self.extra.is_empty()
  }

  /// Moves as much staged data as fits into the ring. Never waits.
  fn flush_extra(&mut self) {
    let n = self.ring.fill(&self.extra);
    if n > 0 {
      self.extra.drain(..n);
      trace!(flushed = n, staged = self.extra.len(), "flushed staged bytes into ring");
    }
  }
}

struct TextCore {
  state: Mutex<TextState>,
  data_available: Condvar,
  space_available: Condvar,
  write_serial: Mutex<()>,
  read_serial: Mutex<()>,
}

/// In-process text pipe over a fixed-capacity circular byte buffer.
///
/// Sizes on the read side are measured in characters. Reads never return a
/// partially decoded character: a multi-byte sequence whose tail has not
/// been written yet is withheld until it completes.
///
/// Closing is a half-close exactly as for the byte pipe; staged overflow
/// counts as buffered data and remains readable after close.
#[derive(Clone)]
pub struct TextPipe {
  core: Arc<TextCore>,
}

impl TextPipe {
  /// Creates a pipe with [`DEFAULT_CAPACITY`].
  pub fn new() -> Self {
    Self::with_capacity(DEFAULT_CAPACITY)
  }

  /// Creates a pipe whose ring holds at most `capacity` encoded bytes.
  ///
  /// Panics if `capacity` is zero.
  pub fn with_capacity(capacity: usize) -> Self {
    TextPipe {
      core: Arc::new(TextCore {
        state: Mutex::new(TextState {
          ring: BoundedRing::with_capacity(capacity),
          extra: Vec::new(),
          closed: false,
          written_chars: 0,
          read_chars: 0,
        }),
        data_available: Condvar::new(),
        space_available: Condvar::new(),
        write_serial: Mutex::new(()),
        read_serial: Mutex::new(()),
      }),
    }
  }

  /// Ring capacity in encoded bytes.
  pub fn capacity(&self) -> usize {
    self.core.state.lock().ring.capacity()
  }

  /// Characters written but not yet read.
  pub fn readable_len(&self) -> usize {
    let state = self.core.state.lock();
    (state.written_chars - state.read_chars) as usize
  }

  /// Free ring bytes. An estimate of how many characters can be written
  /// without blocking: multi-byte characters may exceed it, in which case
  /// the overflow is staged rather than blocking the promised write.
  pub fn writable_len(&self) -> usize {
    self.core.state.lock().ring.free()
  }

  /// True once the pipe has been closed.
  pub fn is_closed(&self) -> bool {
    self.core.state.lock().closed
  }

  /// Closes the write side and wakes every blocked reader and writer.
  /// Idempotent; buffered and staged data remains readable until drained.
  pub fn close(&self) {
    let mut state = self.core.state.lock();
    if !state.closed {
      state.closed = true;
      debug!(
        buffered = state.ring.len(),
        staged = state.extra.len(),
        "text pipe closed"
      );
      self.core.data_available.notify_all();
      self.core.space_available.notify_all();
    }
  }

  /// Writes `text`, returning the number of characters written.
  ///
  /// When the character count is within the current [`writable_len`]
  /// estimate the call is guaranteed not to block: only the encoded bytes
  /// that fit the ring are written and the remainder is staged for a later
  /// flush. Larger writes block until every encoded byte is in the ring.
  /// Fails with [`StreamError::Closed`] only when the pipe is already
  /// closed at entry; closing mid-call returns the number of characters
  /// whose encoded bytes were fully written.
  ///
  /// [`writable_len`]: Self::writable_len
  pub fn write(&self, text: &str) -> Result<usize, StreamError> {
    let _writer = self.core.write_serial.lock();
    let mut state = self.core.state.lock();
    if state.closed {
      return Err(StreamError::Closed);
    }
    let chars = text.chars().count();
    let mut payload = std::mem::take(&mut state.extra);
    let staged_prefix = payload.len();
    payload.extend_from_slice(text.as_bytes());

    // The no-block promise: when the character count fits the advertised
    // free space, size the ring write to what fits and stage the rest.
    let mut stash = Vec::new();
    if chars <= state.ring.free() {
      let cut = payload.len().min(state.ring.free());
      stash = payload.split_off(cut);
    }

    let mut done = 0;
    while done < payload.len() {
      while state.ring.is_full() && !state.closed {
        self.core.space_available.wait(&mut state);
      }
      if state.closed {
        let flushed = chars_flushed(text, done.saturating_sub(staged_prefix));
        trace!(flushed, requested = chars, "text write cut short by close");
        return Ok(flushed);
      }
      let was_empty = state.ring.is_empty();
      done += state.ring.write_run(&payload[done..]);
      if was_empty {
        self.core.data_available.notify_one();
      }
    }

    if !stash.is_empty() {
      trace!(staged = stash.len(), "staging encoded overflow");
      state.extra = stash;
    }
    state.written_chars += chars as u64;
    Ok(chars)
  }

  /// Reads up to `limit` characters, blocking while the pipe holds no data
  /// and is open.
  ///
  /// `Limit::Unbounded` reads until the pipe is closed and drained. Fails
  /// with [`StreamError::Closed`] only when the pipe is already closed and
  /// drained (ring and staging both empty) at entry.
  pub fn read(&self, limit: impl Into<Limit>) -> Result<String, StreamError> {
    self.read_inner(limit.into(), false)
  }

  /// Like [`read`](Self::read), but stops after the first `'\n'`
  /// (inclusive).
  pub fn readline(&self, limit: impl Into<Limit>) -> Result<String, StreamError> {
    self.read_inner(limit.into(), true)
  }

  fn read_inner(&self, limit: Limit, stop_at_newline: bool) -> Result<String, StreamError> {
    let _reader = self.core.read_serial.lock();
    let mut state = self.core.state.lock();
    if state.closed && state.drained() {
      return Err(StreamError::Closed);
    }
    let mut decoder = ChunkDecoder::new(limit, stop_at_newline);
    let mut out = String::new();
    let mut produced = 0;
    while !decoder.is_done() {
      if !Self::await_data(&self.core, &mut state) {
        break;
      }
      let was_full = state.ring.is_full();
      // Capping the chunk at the remaining character budget bounds the
      // bulk-decode; the decoder still stops on the exact boundary.
      let run = state.ring.peek_run(limit.remaining(produced));
      let (used, text) = decoder.feed(run)?;
      state.ring.advance_read(used);
      if was_full && used > 0 {
        self.core.space_available.notify_one();
      }
      let count = text.chars().count();
      produced += count;
      state.read_chars += count as u64;
      out.push_str(&text);
      if state.closed && state.drained() {
        break;
      }
    }
    Ok(out)
  }

  /// Waits until the ring holds data, flushing staged bytes whenever the
  /// ring is empty so stalled data is not stranded behind an idle producer.
  /// Returns false on the reader terminal condition.
  fn await_data(core: &TextCore, state: &mut MutexGuard<'_, TextState>) -> bool {
    loop {
      while state.ring.is_empty() && state.extra.is_empty() && !state.closed {
        core.data_available.wait(state);
      }
      if state.ring.is_empty() && !state.extra.is_empty() {
        state.flush_extra();
      }
      if !state.ring.is_empty() {
        return true;
      }
      if state.closed && state.drained() {
        return false;
      }
    }
  }
}

/// Characters of `text` whose encoded bytes landed entirely within the first
/// `flushed_bytes` bytes of its encoding.
fn chars_flushed(text: &str, flushed_bytes: usize) -> usize {
  text
    .char_indices()
    .map(|(at, ch)| at + ch.len_utf8())
    .take_while(|&end| end <= flushed_bytes)
    .count()
}

impl Default for TextPipe {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for TextPipe {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.core.state.lock();
    f.debug_struct("TextPipe")
      .field("capacity", &state.ring.capacity())
      .field("buffered", &state.ring.len())
      .field("staged", &state.extra.len())
      .field("closed", &state.closed)
      .finish()
  }
}

impl Stream for TextPipe {
  fn readable(&self) -> bool {
    true
  }

  fn writable(&self) -> bool {
    true
  }

  fn is_closed(&self) -> bool {
    TextPipe::is_closed(self)
  }

  fn close(&self) {
    TextPipe::close(self)
  }

  fn tell(&self) -> Result<u64, StreamError> {
    let state = self.core.state.lock();
    if state.closed {
      return Err(StreamError::Closed);
    }
    Ok(state.written_chars)
  }
}

impl TextReader for TextPipe {
  fn read_blocking(&self) -> bool {
    true
  }

  fn read(&self, limit: Limit) -> Result<String, StreamError> {
    TextPipe::read(self, limit)
  }

  fn readline(&self, limit: Limit) -> Result<String, StreamError> {
    TextPipe::readline(self, limit)
  }
}

impl TextWriter for TextPipe {
  fn write_blocking(&self) -> bool {
    true
  }

  fn write(&self, text: &str) -> Result<usize, StreamError> {
    TextPipe::write(self, text)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ascii_roundtrip() {
    let pipe = TextPipe::with_capacity(16);
    assert_eq!(pipe.write("hello").unwrap(), 5);
    assert_eq!(pipe.readable_len(), 5);
    assert_eq!(pipe.read(5).unwrap(), "hello");
    assert_eq!(pipe.readable_len(), 0);
  }

  #[test]
  fn multibyte_character_spanning_the_wrap() {
    let pipe = TextPipe::with_capacity(4);
    pipe.write("ab").unwrap();
    assert_eq!(pipe.read(2).unwrap(), "ab");
    // Three encoded bytes land split around the wrap point.
    pipe.write("日").unwrap();
    assert_eq!(pipe.read(1).unwrap(), "日");
  }

  #[test]
  fn promised_write_stages_encoded_overflow() {
    let pipe = TextPipe::with_capacity(8);
    // Five characters fit the 8 free bytes, their 10 encoded bytes do not.
    // The call must complete without blocking and stage the overflow.
    assert_eq!(pipe.write("ééééé").unwrap(), 5);
    assert_eq!(pipe.readable_len(), 5);
    assert_eq!(pipe.read(5).unwrap(), "ééééé");
  }

  #[test]
  fn staged_bytes_survive_close() {
    let pipe = TextPipe::with_capacity(4);
    assert_eq!(pipe.write("ééé").unwrap(), 3);
    pipe.close();
    assert_eq!(pipe.read(3).unwrap(), "ééé");
    assert_eq!(pipe.read(1), Err(StreamError::Closed));
  }

  #[test]
  fn readline_stops_at_the_terminator() {
    let pipe = TextPipe::with_capacity(32);
    pipe.write("one\ntwo\n").unwrap();
    assert_eq!(pipe.readline(Limit::Unbounded).unwrap(), "one\n");
    assert_eq!(pipe.readline(Limit::Unbounded).unwrap(), "two\n");
  }

  #[test]
  fn readline_size_cap_wins_over_the_terminator() {
    let pipe = TextPipe::with_capacity(32);
    pipe.write("abcdef\n").unwrap();
    assert_eq!(pipe.readline(5).unwrap(), "abcde");
    assert_eq!(pipe.readline(Limit::Unbounded).unwrap(), "f\n");
  }

  #[test]
  fn write_to_closed_pipe_fails() {
    let pipe = TextPipe::with_capacity(4);
    pipe.close();
    assert_eq!(pipe.write("x"), Err(StreamError::Closed));
  }

  #[test]
  fn drain_then_closed_error() {
    let pipe = TextPipe::with_capacity(16);
    pipe.write("abc").unwrap();
    pipe.close();
    assert_eq!(pipe.read(Limit::Unbounded).unwrap(), "abc");
    assert_eq!(pipe.read(1), Err(StreamError::Closed));
  }

  #[test]
  fn zero_sized_read_returns_immediately() {
    let pipe = TextPipe::with_capacity(4);
    pipe.write("ab").unwrap();
    assert_eq!(pipe.read(0).unwrap(), "");
    assert_eq!(pipe.readable_len(), 2);
  }

  #[test]
  fn tell_counts_characters() {
    let pipe = TextPipe::with_capacity(32);
    pipe.write("héllo").unwrap();
    assert_eq!(Stream::tell(&pipe).unwrap(), 5);
  }

  #[test]
  fn chars_flushed_counts_whole_characters_only() {
    assert_eq!(chars_flushed("héllo", 0), 0);
    assert_eq!(chars_flushed("héllo", 1), 1);
    // The second character is two bytes; two flushed bytes split it.
    assert_eq!(chars_flushed("héllo", 2), 1);
    assert_eq!(chars_flushed("héllo", 3), 2);
    assert_eq!(chars_flushed("héllo", 6), 5);
  }
}
