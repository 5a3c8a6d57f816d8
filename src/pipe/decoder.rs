//! Incremental UTF-8 decoding with exact consumed-byte accounting.
//!
//! [`Utf8Decoder`] is the resumable state machine: it can be fed partial
//! input across calls and completes a multi-byte sequence whenever its
//! remaining bytes arrive. [`ChunkDecoder`] drives one bounded read on top of
//! it, stopping at a character budget or a line terminator without ever
//! reporting more consumed bytes than the produced characters required.

use crate::error::StreamError;
use crate::stream::Limit;

/// Resumable UTF-8 state machine holding at most one partial scalar sequence.
///
/// Cheap to copy, which is what makes the rewind in [`ChunkDecoder::feed`]
/// a snapshot-and-restore rather than a re-parse.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Utf8Decoder {
  pending: [u8; 4],
  pending_len: u8,
}

impl Utf8Decoder {
  /// Feeds one byte; yields a character once a full sequence is assembled.
  ///
  /// Incomplete sequences are buffered (`Ok(None)`); invalid ones reset the
  /// state and fail.
  pub(crate) fn push(&mut self, byte: u8) -> Result<Option<char>, StreamError> {
    debug_assert!(self.pending_len < 4);
    self.pending[self.pending_len as usize] = byte;
    self.pending_len += 1;
    match core::str::from_utf8(&self.pending[..self.pending_len as usize]) {
      Ok(s) => {
        let ch = s.chars().next().ok_or(StreamError::InvalidUtf8)?;
        self.pending_len = 0;
        Ok(Some(ch))
      }
      // `error_len() == None` is the "unexpected end of input" case: the
      // prefix is a valid but incomplete sequence. At most 3 bytes can be
      // pending this way, so the buffer never overflows.
      Err(e) if e.error_len().is_none() => Ok(None),
      Err(_) => {
        self.pending_len = 0;
        Err(StreamError::InvalidUtf8)
      }
    }
  }

  /// True if a partial sequence is buffered.
  #[inline]
  pub(crate) fn has_pending(&self) -> bool {
    self.pending_len > 0
  }

  /// Decodes all of `chunk` into `out`, buffering any trailing partial
  /// sequence. The whole chunk counts as consumed.
  pub(crate) fn decode(&mut self, chunk: &[u8], out: &mut String) -> Result<(), StreamError> {
    let mut rest = chunk;
    // Finish a sequence left over from the previous chunk first.
    while self.has_pending() && !rest.is_empty() {
      let byte = rest[0];
      rest = &rest[1..];
      if let Some(ch) = self.push(byte)? {
        out.push(ch);
      }
    }
    match core::str::from_utf8(rest) {
      Ok(s) => out.push_str(s),
      Err(e) if e.error_len().is_none() => {
        let valid = e.valid_up_to();
        out.push_str(core::str::from_utf8(&rest[..valid]).map_err(|_| StreamError::InvalidUtf8)?);
        for &byte in &rest[valid..] {
          if self.push(byte)?.is_some() {
            return Err(StreamError::InvalidUtf8);
          }
        }
      }
      Err(_) => return Err(StreamError::InvalidUtf8),
    }
    Ok(())
  }
}

enum Boundary {
  Newline,
  Count(usize),
}

/// Drives a single bounded read: decodes successive ring chunks until a
/// character budget is exhausted or, when requested, a newline is produced.
///
/// Per feed, the reported consumed count is exactly the bytes taken from that
/// chunk; bytes absorbed into the pending state count when absorbed and yield
/// their character on a later feed, so the caller can advance its cursor by
/// the reported amount with nothing lost or double-counted.
#[derive(Debug)]
pub(crate) struct ChunkDecoder {
  utf8: Utf8Decoder,
  budget: Limit,
  stop_at_newline: bool,
  produced: usize,
  done: bool,
}

impl ChunkDecoder {
  pub(crate) fn new(budget: Limit, stop_at_newline: bool) -> Self {
    ChunkDecoder {
      utf8: Utf8Decoder::default(),
      budget,
      stop_at_newline,
      produced: 0,
      done: budget.reached(0),
    }
  }

  /// True once the budget is exhausted or the requested newline was produced.
  #[inline]
  pub(crate) fn is_done(&self) -> bool {
    self.done
  }

  /// Decodes as much of `chunk` as the limits allow, returning the bytes
  /// consumed from it and the characters produced.
  ///
  /// The whole chunk is bulk-decoded first; only when a newline or the
  /// budget lands inside it does the decoder rewind to the pre-feed snapshot
  /// and re-decode byte-by-byte so the consumed count stops exactly on the
  /// boundary.
  pub(crate) fn feed(&mut self, chunk: &[u8]) -> Result<(usize, String), StreamError> {
    if self.done || chunk.is_empty() {
      return Ok((0, String::new()));
    }
    let snapshot = self.utf8;
    let mut text = String::with_capacity(chunk.len());
    self.utf8.decode(chunk, &mut text)?;
    let mut used = chunk.len();

    if self.stop_at_newline {
      if let Some(at) = text.find('\n') {
        self.done = true;
        // When the newline is the final character and nothing trails it in
        // the pending state, the bulk pass already stopped on the boundary.
        if at != text.len() - 1 || self.utf8.has_pending() {
          self.utf8 = snapshot;
          let redone = self.redecode(chunk, Boundary::Newline)?;
          used = redone.0;
          text = redone.1;
        }
      }
    }

    if let Limit::Bounded(max) = self.budget {
      let room = max - self.produced;
      if text.chars().count() > room {
        self.utf8 = snapshot;
        let redone = self.redecode(chunk, Boundary::Count(room))?;
        used = redone.0;
        text = redone.1;
      }
    }

    self.produced += text.chars().count();
    if self.budget.reached(self.produced) {
      self.done = true;
    }
    Ok((used, text))
  }

  fn redecode(&mut self, chunk: &[u8], stop: Boundary) -> Result<(usize, String), StreamError> {
    let mut out = String::new();
    let mut used = 0;
    let mut count = 0;
    for &byte in chunk {
      used += 1;
      if let Some(ch) = self.utf8.push(byte)? {
        out.push(ch);
        count += 1;
        let hit = match stop {
          Boundary::Newline => ch == '\n',
          Boundary::Count(room) => count >= room,
        };
        if hit {
          break;
        }
      }
    }
    Ok((used, out))
  }
}
