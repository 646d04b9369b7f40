//! Environment abstraction for deterministic scenario runs.
//!
//! The `Environment` trait decouples the harness from system resources
//! (time, randomness). Scenario identity, message nonces and adapter latency
//! all flow through it, so two runs with the same seeded environment observe
//! the same sequence of artifacts.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Determinism: Given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: Implementations must not share global state between
//!   scenarios

use std::time::Duration;

/// Abstract environment providing time, randomness, and async sleeping.
///
/// # Implementations
///
/// - Simulation (`mqcheck-harness::SimEnv`): tokio time (virtual under
///   turmoil), seeded ChaCha RNG for reproducible message bodies.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Type representing a point in time.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Returns the current time.
    ///
    /// Subsequent calls must return times >= previous calls.
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only adapter code sleeps. The sequencer never does: it returns
    /// `Schedule` actions and the event loop owns the clock.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// Used for message body nonces.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
