//! Seekable unbounded in-memory text stream.
//!
//! Positions, limits and lengths are measured in characters while the
//! storage is UTF-8. The state keeps the byte position and the character
//! position in lockstep, so bounded reads and splice writes land exactly on
//! character boundaries; a position past the end is measured one byte per
//! character and zero-filled on write, like the byte cursor's gap.

use core::fmt;
use std::io::SeekFrom;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::cursor::byte::resolve_seek;
use crate::error::StreamError;
use crate::stream::{Limit, Stream, TextReader, TextWriter};

#[derive(Debug)]
struct TextCursorState {
  /// Always valid UTF-8; padding writes use `'\0'`.
  buf: String,
  /// Byte offset matching `char_pos`. May run past `buf.len()` (the
  /// virtual zone, one byte per character).
  byte_pos: usize,
  char_pos: usize,
  /// Cached `buf.chars().count()`.
  char_len: usize,
  closed: bool,
}

impl TextCursorState {
  /// Byte offset of character `target`, counting one byte per character
  /// past the end.
  fn byte_of_char(&self, target: usize) -> usize {
    if target >= self.char_len {
      self.buf.len() + (target - self.char_len)
    } else {
      self
        .buf
        .char_indices()
        .nth(target)
        .map(|(at, _)| at)
        .unwrap_or(self.buf.len())
    }
  }
}

/// Growable in-memory text stream with a seekable character position.
///
/// The IO counterpart of a string: unbounded, so writes never block.
/// Overwrites splice in the character domain, shifting the tail when old
/// and new encodings differ in length. Clones share the same buffer and
/// position; closing disables both sides.
#[derive(Clone)]
pub struct TextCursor {
  state: Arc<Mutex<TextCursorState>>,
}

impl TextCursor {
  /// Creates an empty cursor positioned at zero.
  pub fn new() -> Self {
    Self::from_text("")
  }

  /// Creates a cursor over `text`, positioned at zero.
  pub fn from_text(text: impl Into<String>) -> Self {
    let buf = text.into();
    let char_len = buf.chars().count();
    TextCursor {
      state: Arc::new(Mutex::new(TextCursorState {
        buf,
        byte_pos: 0,
        char_pos: 0,
        char_len,
        closed: false,
      })),
    }
  }

  /// Characters between the position and the end of the buffer.
  pub fn readable_len(&self) -> usize {
    let state = self.state.lock();
    state.char_len.saturating_sub(state.char_pos)
  }

  /// Total buffer length in characters.
  pub fn len(&self) -> usize {
    self.state.lock().char_len
  }

  /// True when the buffer holds no text.
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
  pub fn into_text(self) -> String {
    match Arc::try_unwrap(self.state) {
      Ok(mutex) => mutex.into_inner().buf,
      Err(shared) => shared.lock().buf.clone(),
    }
  }

  /// Writes `text` at the position, overwriting the same number of
  /// characters and growing the buffer as needed. The tail shifts when the
  /// old and new encodings differ in length; a position past the end
  /// zero-fills the gap. Never blocks. Returns the characters written.
  pub fn write(&self, text: &str) -> Result<usize, StreamError> {
    let mut state = self.guard()?;
    if state.byte_pos > state.buf.len() {
      let pad = state.byte_pos - state.buf.len();
      for _ in 0..pad {
        state.buf.push('\0');
      }
      state.char_len += pad;
    }
    let new_chars = text.chars().count();
    let start_b = state.byte_pos;
    let start_c = state.char_pos;
    let (end_b, old_chars) = if start_c + new_chars >= state.char_len {
      (state.buf.len(), state.char_len - start_c)
    } else {
      (state.byte_of_char(start_c + new_chars), new_chars)
    };
    state.buf.replace_range(start_b..end_b, text);
    state.char_len = state.char_len - old_chars + new_chars;
    state.byte_pos = start_b + text.len();
    state.char_pos = start_c + new_chars;
    Ok(new_chars)
  }

  /// Reads up to `limit` characters from the position. Never blocks; an
  /// exhausted buffer yields an empty result.
  pub fn read(&self, limit: impl Into<Limit>) -> Result<String, StreamError> {
    let mut state = self.guard()?;
    let out = take_chars(&state, limit.into(), false);
    state.byte_pos += out.len();
    state.char_pos += out.chars().count();
    Ok(out)
  }

  /// Like [`read`](Self::read), but stops after the first `'\n'`
  /// (inclusive).
  pub fn readline(&self, limit: impl Into<Limit>) -> Result<String, StreamError> {
    let mut state = self.guard()?;
    let out = take_chars(&state, limit.into(), true);
    state.byte_pos += out.len();
    state.char_pos += out.chars().count();
    Ok(out)
  }

  /// Moves the position, measured in characters. Positions past the end are
  /// allowed; positions before the start fail with
  /// [`StreamError::InvalidPosition`].
  pub fn seek(&self, target: SeekFrom) -> Result<u64, StreamError> {
    let mut state = self.guard()?;
    let virtual_end = state.char_len as u64;
    let target = resolve_seek(target, state.char_pos as u64, virtual_end)? as usize;
    state.byte_pos = state.byte_of_char(target);
    state.char_pos = target;
    Ok(target as u64)
  }

  /// Current position in characters.
  pub fn tell(&self) -> Result<u64, StreamError> {
    Ok(self.guard()?.char_pos as u64)
  }

  /// Resizes the buffer to `size` characters (default: the current
  /// position), zero-filling growth. The position does not move.
  pub fn truncate(&self, size: Option<u64>) -> Result<(), StreamError> {
    let mut state = self.guard()?;
    let target = size.unwrap_or(state.char_pos as u64) as usize;
    if target >= state.char_len {
      for _ in state.char_len..target {
        state.buf.push('\0');
      }
    } else {
      let at = state.byte_of_char(target);
      state.buf.truncate(at);
    }
    state.char_len = target;
    Ok(())
  }

  fn guard(&self) -> Result<MutexGuard<'_, TextCursorState>, StreamError> {
    let state = self.state.lock();
    if state.closed {
      return Err(StreamError::Closed);
    }
    Ok(state)
  }
}

/// Collects up to `limit` characters after the position, optionally stopping
/// after the first newline.
fn take_chars(state: &TextCursorState, limit: Limit, stop_at_newline: bool) -> String {
  if state.byte_pos >= state.buf.len() {
    return String::new();
  }
  let rest = &state.buf[state.byte_pos..];
  let mut end = 0;
  let mut count = 0;
  for (at, ch) in rest.char_indices() {
    if limit.reached(count) {
      break;
    }
    end = at + ch.len_utf8();
    count += 1;
    if stop_at_newline && ch == '\n' {
      break;
    }
  }
  rest[..end].to_string()
}

impl Default for TextCursor {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for TextCursor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("TextCursor")
      .field("chars", &state.char_len)
      .field("pos", &state.char_pos)
      .field("closed", &state.closed)
      .finish()
  }
}

impl Stream for TextCursor {
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
    TextCursor::is_closed(self)
  }

  fn close(&self) {
    TextCursor::close(self)
  }

  fn tell(&self) -> Result<u64, StreamError> {
    TextCursor::tell(self)
  }

  fn seek(&self, target: SeekFrom) -> Result<u64, StreamError> {
    TextCursor::seek(self, target)
  }
}

impl TextReader for TextCursor {
  fn read_blocking(&self) -> bool {
    false
  }

  fn read(&self, limit: Limit) -> Result<String, StreamError> {
    TextCursor::read(self, limit)
  }

  fn readline(&self, limit: Limit) -> Result<String, StreamError> {
    TextCursor::readline(self, limit)
  }
}

impl TextWriter for TextCursor {
  fn write_blocking(&self) -> bool {
    false
  }

  fn write(&self, text: &str) -> Result<usize, StreamError> {
    TextCursor::write(self, text)
  }

  fn truncate(&self, size: Option<u64>) -> Result<(), StreamError> {
    TextCursor::truncate(self, size)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn write_then_rewind_then_read() {
    let cursor = TextCursor::new();
    assert_eq!(cursor.write("héllo wörld").unwrap(), 11);
    cursor.seek(SeekFrom::Start(0)).unwrap();
    assert_eq!(cursor.read(5).unwrap(), "héllo");
    assert_eq!(cursor.read(Limit::Unbounded).unwrap(), " wörld");
    assert_eq!(cursor.read(3).unwrap(), "");
  }

  #[test]
  fn positions_are_characters_not_bytes() {
    let cursor = TextCursor::from_text("ééé");
    cursor.seek(SeekFrom::Start(2)).unwrap();
    assert_eq!(cursor.tell().unwrap(), 2);
    assert_eq!(cursor.read(Limit::Unbounded).unwrap(), "é");
  }

  #[test]
  fn splice_with_longer_encoding_shifts_the_tail() {
    let cursor = TextCursor::from_text("abcdef");
    cursor.seek(SeekFrom::Start(2)).unwrap();
    // Two 2-byte characters over two 1-byte ones.
    cursor.write("éö").unwrap();
    assert_eq!(cursor.tell().unwrap(), 4);
    cursor.seek(SeekFrom::Start(0)).unwrap();
    assert_eq!(cursor.read(Limit::Unbounded).unwrap(), "abéöef");
    assert_eq!(cursor.len(), 6);
  }

  #[test]
  fn splice_with_shorter_encoding_shifts_the_tail() {
    let cursor = TextCursor::from_text("abéöef");
    cursor.seek(SeekFrom::Start(2)).unwrap();
    cursor.write("cd").unwrap();
    cursor.seek(SeekFrom::Start(0)).unwrap();
    assert_eq!(cursor.read(Limit::Unbounded).unwrap(), "abcdef");
  }

  #[test]
  fn overwrite_past_the_end_grows() {
    let cursor = TextCursor::from_text("abcd");
    cursor.seek(SeekFrom::Start(2)).unwrap();
    cursor.write("WXYZ").unwrap();
    cursor.seek(SeekFrom::Start(0)).unwrap();
    assert_eq!(cursor.read(Limit::Unbounded).unwrap(), "abWXYZ");
    assert_eq!(cursor.len(), 6);
  }

  #[test]
  fn write_past_the_end_zero_fills() {
    let cursor = TextCursor::from_text("ab");
    cursor.seek(SeekFrom::Start(4)).unwrap();
    cursor.write("cd").unwrap();
    cursor.seek(SeekFrom::Start(0)).unwrap();
    assert_eq!(cursor.read(Limit::Unbounded).unwrap(), "ab\0\0cd");
    assert_eq!(cursor.len(), 6);
  }

  #[test]
  fn readline_inclusive() {
    let cursor = TextCursor::from_text("höne\ntwo");
    assert_eq!(cursor.readline(Limit::Unbounded).unwrap(), "höne\n");
    assert_eq!(cursor.readline(Limit::Unbounded).unwrap(), "two");
  }

  #[test]
  fn readline_size_cap() {
    let cursor = TextCursor::from_text("abcdef\n");
    assert_eq!(cursor.readline(5).unwrap(), "abcde");
  }

  #[test]
  fn truncate_cuts_on_character_boundaries() {
    let cursor = TextCursor::from_text("ééé");
    cursor.truncate(Some(2)).unwrap();
    assert_eq!(cursor.len(), 2);
    cursor.seek(SeekFrom::Start(0)).unwrap();
    assert_eq!(cursor.read(Limit::Unbounded).unwrap(), "éé");
  }

  #[test]
  fn truncate_pads_growth() {
    let cursor = TextCursor::from_text("ab");
    cursor.truncate(Some(4)).unwrap();
    cursor.seek(SeekFrom::Start(0)).unwrap();
    assert_eq!(cursor.read(Limit::Unbounded).unwrap(), "ab\0\0");
  }

  #[test]
  fn seek_whences_and_bounds() {
    let cursor = TextCursor::from_text("héllo");
    assert_eq!(cursor.seek(SeekFrom::End(-2)).unwrap(), 3);
    assert_eq!(cursor.read(Limit::Unbounded).unwrap(), "lo");
    assert_eq!(
      cursor.seek(SeekFrom::Current(-100)),
      Err(StreamError::InvalidPosition)
    );
  }

  #[test]
  fn closed_cursor_rejects_everything() {
    let cursor = TextCursor::from_text("ab");
    cursor.close();
    assert_eq!(cursor.read(1), Err(StreamError::Closed));
    assert_eq!(cursor.write("x"), Err(StreamError::Closed));
    assert_eq!(cursor.tell(), Err(StreamError::Closed));
    cursor.close();
    assert!(cursor.is_closed());
  }
}
