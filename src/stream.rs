//! Capability traits shared by every stream in the crate.
//!
//! The traits split the surface the way the streams themselves do: [`Stream`]
//! carries lifecycle and position queries, [`ByteReader`]/[`ByteWriter`] the
//! byte-domain operations and [`TextReader`]/[`TextWriter`] the character
//! domain. Pipes implement reader and writer with both capability flags true;
//! cursors additionally support `seek` and `truncate`.

use std::io::SeekFrom;

use crate::error::StreamError;

/// Size argument for bounded reads.
///
/// `Unbounded` means "read until the stream ends" — for pipes, until the
/// write side closes and the buffer drains (or a line terminator is found,
/// for `readline`); for cursors, until the end of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Limit {
  /// Read at most this many units (bytes or characters).
  Bounded(usize),
  /// No bound.
  #[default]
  Unbounded,
}

impl Limit {
  /// True once `count` units satisfy the limit.
  #[inline]
  pub fn reached(self, count: usize) -> bool {
    match self {
      Limit::Bounded(max) => count >= max,
      Limit::Unbounded => false,
    }
  }

  /// Units still allowed after `count` have been taken.
  #[inline]
  pub fn remaining(self, count: usize) -> usize {
    match self {
      Limit::Bounded(max) => max.saturating_sub(count),
      Limit::Unbounded => usize::MAX,
    }
  }
}

impl From<usize> for Limit {
  fn from(max: usize) -> Self {
    Limit::Bounded(max)
  }
}

/// Lifecycle, capability and position queries common to all streams.
pub trait Stream {
  /// True if the stream supports the reading operations.
  fn readable(&self) -> bool;

  /// True if the stream supports the writing operations.
  fn writable(&self) -> bool;

  /// True if the stream supports `seek`. Pipes never do.
  fn seekable(&self) -> bool {
    false
  }

  /// True once the stream has been closed.
  fn is_closed(&self) -> bool;

  /// Closes the stream. Idempotent.
  ///
  /// For pipes this is a half-close: writes are rejected afterwards while
  /// buffered data remains readable until drained. Cursors reject every
  /// operation once closed.
  fn close(&self);

  /// Current position: bytes or characters ever written for pipes, the
  /// cursor position for seekable streams.
  fn tell(&self) -> Result<u64, StreamError>;

  /// Moves the position. Unsupported by default.
  fn seek(&self, _target: SeekFrom) -> Result<u64, StreamError> {
    Err(StreamError::Unsupported("seek"))
  }

  /// In-memory streams are not backed by an OS descriptor.
  fn fileno(&self) -> Result<i32, StreamError> {
    Err(StreamError::Unsupported("fileno"))
  }
}

/// Reading half of a byte stream.
pub trait ByteReader: Stream {
  /// True if `read` may block waiting for data.
  fn read_blocking(&self) -> bool;

  /// Reads up to `limit` bytes.
  fn read(&self, limit: Limit) -> Result<Vec<u8>, StreamError>;

  /// Reads into `buf`, returning the number of bytes placed there.
  fn read_into(&self, buf: &mut [u8]) -> Result<usize, StreamError>;

  /// Like `read`, but stops after the first `\n` (inclusive).
  fn readline(&self, limit: Limit) -> Result<Vec<u8>, StreamError>;
}

/// Writing half of a byte stream.
pub trait ByteWriter: Stream {
  /// True if `write` may block waiting for space.
  fn write_blocking(&self) -> bool;

  /// Writes `data`, returning the number of bytes written.
  fn write(&self, data: &[u8]) -> Result<usize, StreamError>;

  /// Flushes buffered data where applicable. The default only checks for
  /// closure.
  fn flush(&self) -> Result<(), StreamError> {
    if self.is_closed() {
      Err(StreamError::Closed)
    } else {
      Ok(())
    }
  }

  /// Resizes the stream. Unsupported by default; pipes never support it.
  fn truncate(&self, _size: Option<u64>) -> Result<(), StreamError> {
    Err(StreamError::Unsupported("truncate"))
  }
}

/// Reading half of a text stream. Limits and results are measured in
/// characters; there is no `read_into`, byte buffers cannot receive text.
pub trait TextReader: Stream {
  /// True if `read` may block waiting for data.
  fn read_blocking(&self) -> bool;

  /// Reads up to `limit` characters.
  fn read(&self, limit: Limit) -> Result<String, StreamError>;

  /// Like `read`, but stops after the first `'\n'` (inclusive).
  fn readline(&self, limit: Limit) -> Result<String, StreamError>;
}

/// Writing half of a text stream.
pub trait TextWriter: Stream {
  /// True if `write` may block waiting for space.
  fn write_blocking(&self) -> bool;

  /// Writes `text`, returning the number of characters written.
  fn write(&self, text: &str) -> Result<usize, StreamError>;

  /// Flushes buffered data where applicable. The default only checks for
  /// closure.
  fn flush(&self) -> Result<(), StreamError> {
    if self.is_closed() {
      Err(StreamError::Closed)
    } else {
      Ok(())
    }
  }

  /// Resizes the stream in characters. Unsupported by default.
  fn truncate(&self, _size: Option<u64>) -> Result<(), StreamError> {
    Err(StreamError::Unsupported("truncate"))
  }
}
