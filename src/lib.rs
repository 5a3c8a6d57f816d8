#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

//! In-process, thread-synchronized stream primitives.
//!
//! Culvert provides two families of streams behind one capability surface:
//!
//! - **Pipes** ([`BytePipe`], [`TextPipe`]): fixed-capacity circular buffers
//!   for producer/consumer handoff between threads, with blocking
//!   backpressure and half-duplex close. The text pipe decodes UTF-8
//!   incrementally and never splits a character across two reads.
//! - **Cursors** ([`ByteCursor`], [`TextCursor`]): unbounded seekable
//!   in-memory buffers for random-access IO, never blocking.
//!
//! All four implement the reader/writer traits in [`stream`], so adapters
//! can be written against the capability contract rather than a concrete
//! type.
//!
//! ```
//! use culvert::{BytePipe, Limit};
//! use std::thread;
//!
//! let pipe = BytePipe::with_capacity(4096);
//! let writer = pipe.clone();
//! let producer = thread::spawn(move || {
//!   writer.write(b"one\ntwo\n").unwrap();
//!   writer.close();
//! });
//!
//! assert_eq!(pipe.readline(Limit::Unbounded).unwrap(), b"one\n");
//! assert_eq!(pipe.read(Limit::Unbounded).unwrap(), b"two\n");
//! producer.join().unwrap();
//! ```

pub mod cursor;
pub mod error;
pub mod pipe;
pub mod stream;

pub use cursor::{ByteCursor, TextCursor};
pub use error::StreamError;
pub use pipe::{BytePipe, TextPipe, DEFAULT_CAPACITY};
pub use stream::{ByteReader, ByteWriter, Limit, Stream, TextReader, TextWriter};
