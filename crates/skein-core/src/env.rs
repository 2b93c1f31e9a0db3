//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples session logic from system resources
//! (time, randomness, sleeping). This enables:
//!
//! - Deterministic tests: the harness supplies a seeded RNG so local echo ids
//!   and retry timing are reproducible.
//!
//! - Production runtime: the client crate's `SystemEnv` uses the OS clock and
//!   entropy pool without any change to the sync or outbox logic.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Determinism: Given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: Implementations must not share global state

use std::time::{Duration, Instant};

/// Abstract environment providing time, randomness, and async sleeping.
///
/// Every session context owns one clone of its environment; nothing in the
/// core reaches for `Instant::now()` or an RNG directly.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Returns the current time.
    ///
    /// # Invariants
    ///
    /// - Monotonicity: subsequent calls return times >= previous calls.
    fn now(&self) -> Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only the sync loop sleeps (between failed polls). Components that
    /// react to store changes never sleep.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Determinism during tests: Given the same RNG seed, this produces the
    ///   same sequence of bytes
    /// - Unpredictability in production: Uses the OS entropy pool
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates a random `u128`.
    ///
    /// Used for local echo ids.
    fn random_u128(&self) -> u128 {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes);
        u128::from_be_bytes(bytes)
    }
}
