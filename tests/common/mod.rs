#![allow(dead_code)]

use std::sync::Once;
use std::time::Duration;

pub const SHORT_TIMEOUT: Duration = Duration::from_millis(500);
pub const LONG_TIMEOUT: Duration = Duration::from_secs(5);
pub const STRESS_TOTAL: usize = 1_000_000;
pub const STRESS_CAPACITY: usize = 4096;

/// Installs a fmt subscriber once per test binary; filter via RUST_LOG.
pub fn init_tracing() {
  static INIT: Once = Once::new();
  INIT.call_once(|| {
    let _ = tracing_subscriber::fmt()
      .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
      .with_test_writer()
      .try_init();
  });
}

/// Deterministic xorshift64* generator, enough for chunk-size jitter and
/// payload bytes without pulling in a full RNG.
pub struct XorShift(u64);

impl XorShift {
  pub fn new(seed: u64) -> Self {
    XorShift(seed.max(1))
  }

  pub fn next_u64(&mut self) -> u64 {
    let mut x = self.0;
    x ^= x >> 12;
    x ^= x << 25;
    x ^= x >> 27;
    self.0 = x;
    x.wrapping_mul(0x2545_F491_4F6C_DD1D)
  }

  /// Uniform-ish value in `lo..=hi`.
  pub fn range(&mut self, lo: usize, hi: usize) -> usize {
    lo + (self.next_u64() as usize) % (hi - lo + 1)
  }

  pub fn fill_bytes(&mut self, buf: &mut [u8]) {
    for byte in buf.iter_mut() {
      *byte = self.next_u64() as u8;
    }
  }
}
