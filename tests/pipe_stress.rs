//! Cross-thread behavior of the byte pipe: backpressure, half-close
//! draining, close-during-wait partial results, and a randomized
//! producer/consumer stress run.

mod common;

use common::{XorShift, LONG_TIMEOUT, SHORT_TIMEOUT, STRESS_CAPACITY, STRESS_TOTAL};
use culvert::{BytePipe, Limit, StreamError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

#[test]
fn ordered_roundtrip_within_capacity() {
  let pipe = BytePipe::with_capacity(256);
  for chunk in [&b"alpha"[..], b"beta", b"gamma"] {
    assert_eq!(pipe.write(chunk).unwrap(), chunk.len());
  }
  assert_eq!(pipe.read(14).unwrap(), b"alphabetagamma");
}

#[test]
fn writer_blocks_until_a_byte_is_read() {
  common::init_tracing();
  let pipe = BytePipe::with_capacity(4);
  pipe.write(b"full").unwrap();

  let finished = Arc::new(AtomicBool::new(false));
  let writer = pipe.clone();
  let flag = finished.clone();
  let handle = thread::spawn(move || {
    let n = writer.write(b"x").unwrap();
    flag.store(true, Ordering::SeqCst);
    n
  });

  thread::sleep(SHORT_TIMEOUT / 5);
  assert!(!finished.load(Ordering::SeqCst), "writer ran ahead of capacity");

  assert_eq!(pipe.read(1).unwrap(), b"f");
  assert_eq!(handle.join().unwrap(), 1);
  assert_eq!(pipe.read(4).unwrap(), b"ullx");
}

#[test]
fn blocked_writer_progresses_exactly_by_bytes_read() {
  let pipe = BytePipe::with_capacity(8);
  let writer = pipe.clone();
  let handle = thread::spawn(move || {
    let n = writer.write(&[7u8; 20]).unwrap();
    writer.close();
    n
  });

  // Drain in small steps; the writer can only ever be 8 ahead of the reader.
  let mut total = 0;
  loop {
    match pipe.read(3) {
      Ok(chunk) => {
        if chunk.is_empty() {
          break;
        }
        assert!(chunk.len() <= 3);
        assert!(chunk.iter().all(|&b| b == 7));
        total += chunk.len();
      }
      Err(StreamError::Closed) => break,
      Err(e) => panic!("unexpected error: {e}"),
    }
  }
  assert_eq!(handle.join().unwrap(), 20);
  assert_eq!(total, 20);
}

#[test]
fn half_close_yields_buffered_bytes_then_fails() {
  let pipe = BytePipe::with_capacity(16);
  pipe.write(b"leftover").unwrap();
  pipe.close();

  let mut drained = Vec::new();
  drained.extend(pipe.read(3).unwrap());
  drained.extend(pipe.read(3).unwrap());
  drained.extend(pipe.read(Limit::Unbounded).unwrap());
  assert_eq!(drained, b"leftover");
  assert_eq!(pipe.read(1), Err(StreamError::Closed));
  assert_eq!(pipe.write(b"x"), Err(StreamError::Closed));
}

#[test]
fn close_wakes_a_blocked_reader() {
  let pipe = BytePipe::with_capacity(4);
  let reader = pipe.clone();
  let handle = thread::spawn(move || reader.read(10).unwrap());

  thread::sleep(SHORT_TIMEOUT / 5);
  let start = Instant::now();
  pipe.close();
  assert_eq!(handle.join().unwrap(), b"");
  assert!(start.elapsed() < LONG_TIMEOUT, "reader missed the close wakeup");
}

#[test]
fn close_wakes_a_blocked_writer_with_partial_count() {
  let pipe = BytePipe::with_capacity(4);
  let writer = pipe.clone();
  let handle = thread::spawn(move || writer.write(&[1u8; 100]).unwrap());

  thread::sleep(SHORT_TIMEOUT / 5);
  pipe.close();
  assert_eq!(handle.join().unwrap(), 4);
  assert_eq!(pipe.read(Limit::Unbounded).unwrap(), vec![1u8; 4]);
}

#[test]
fn unbounded_read_collects_until_close() {
  let pipe = BytePipe::with_capacity(8);
  let writer = pipe.clone();
  let handle = thread::spawn(move || {
    for _ in 0..10 {
      writer.write(b"0123456789").unwrap();
    }
    writer.close();
  });

  let all = pipe.read(Limit::Unbounded).unwrap();
  handle.join().unwrap();
  assert_eq!(all.len(), 100);
}

#[test]
fn readline_across_thread_boundary() {
  let pipe = BytePipe::with_capacity(4);
  let writer = pipe.clone();
  let handle = thread::spawn(move || {
    writer.write(b"a line longer than the ring\n").unwrap();
    writer.close();
  });

  assert_eq!(
    pipe.readline(Limit::Unbounded).unwrap(),
    b"a line longer than the ring\n"
  );
  handle.join().unwrap();
}

#[test]
fn two_writers_serialize_without_interleaving_within_a_call() {
  let pipe = BytePipe::with_capacity(8);
  let mut handles = Vec::new();
  for fill in [b'a', b'b'] {
    let writer = pipe.clone();
    handles.push(thread::spawn(move || {
      writer.write(&[fill; 64]).unwrap();
    }));
  }

  let mut all = Vec::new();
  while all.len() < 128 {
    all.extend(pipe.read(16).unwrap());
  }
  for handle in handles {
    handle.join().unwrap();
  }
  // Each 64-byte write is serialized whole: one uninterrupted run per fill.
  let flips = all.windows(2).filter(|w| w[0] != w[1]).count();
  assert!(flips <= 1, "writer calls interleaved: {} flips", flips);
}

#[test]
fn randomized_producer_consumer_stress() {
  common::init_tracing();
  let pipe = BytePipe::with_capacity(STRESS_CAPACITY);

  let mut payload = vec![0u8; STRESS_TOTAL];
  XorShift::new(0xC0FFEE).fill_bytes(&mut payload);
  let expected = payload.clone();

  let writer = pipe.clone();
  let producer = thread::spawn(move || {
    let mut rng = XorShift::new(1);
    let mut sent = 0;
    while sent < payload.len() {
      let n = rng.range(1, 8192).min(payload.len() - sent);
      assert_eq!(writer.write(&payload[sent..sent + n]).unwrap(), n);
      sent += n;
    }
    writer.close();
  });

  let mut rng = XorShift::new(2);
  let mut received = Vec::with_capacity(STRESS_TOTAL);
  loop {
    match pipe.read(rng.range(1, 8192)) {
      Ok(chunk) => {
        if chunk.is_empty() {
          break;
        }
        received.extend(chunk);
      }
      Err(StreamError::Closed) => break,
      Err(e) => panic!("unexpected error: {e}"),
    }
  }

  producer.join().unwrap();
  assert_eq!(received.len(), expected.len());
  assert_eq!(received, expected);
}
