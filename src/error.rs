use core::fmt;

/// Error returned by stream operations.
///
/// Mid-call conditions (a pipe closing while a reader or writer is blocked)
/// are not errors: those calls return a partial result instead. `Closed` is
/// reserved for operations that cannot possibly make progress at entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamError {
  /// The stream was already closed when the operation was called.
  ///
  /// For pipes this means the write side is closed (writes), or the pipe is
  /// closed and fully drained (reads). Cursors reject every operation once
  /// closed.
  Closed,
  /// The operation is not supported by this stream type, e.g. `seek` on a
  /// pipe. Carries the operation name.
  Unsupported(&'static str),
  /// A seek resolved to a position before the start of the stream.
  InvalidPosition,
  /// The decoder encountered a byte sequence that is not valid UTF-8.
  InvalidUtf8,
}

impl fmt::Display for StreamError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StreamError::Closed => write!(f, "stream is closed"),
      StreamError::Unsupported(op) => write!(f, "stream does not support {}", op),
      StreamError::InvalidPosition => write!(f, "negative position in stream"),
      StreamError::InvalidUtf8 => write!(f, "invalid utf-8 sequence in stream"),
    }
  }
}

impl std::error::Error for StreamError {}
