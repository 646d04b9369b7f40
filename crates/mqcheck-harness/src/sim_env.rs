//! Seeded Environment implementation for deterministic scenario runs.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use mqcheck_core::env::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Simulation environment using tokio time and a seeded RNG.
///
/// - **Time**: `now()` and `sleep()` go through tokio, so inside a turmoil
///   simulation they follow turmoil's virtual clock.
/// - **Seeded RNG**: `random_bytes()` uses ChaCha20Rng, so message body
///   nonces are the same on every run with the same seed.
///
/// ```ignore
/// let env = SimEnv::with_seed(12345);
/// let nonce = env.random_u64();
/// ```
///
/// # Panics
///
/// - `sleep()` panics outside a tokio runtime
#[derive(Clone)]
pub struct SimEnv {
    /// Shared across clones so every clone continues the same sequence.
    rng: Arc<Mutex<ChaCha20Rng>>,
    seed: u64,
}

impl SimEnv {
    /// Create a SimEnv with the default seed (0).
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Create a SimEnv with a specific seed.
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))), seed }
    }

    /// Seed this environment was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimEnv").field("seed", &self.seed).finish_non_exhaustive()
    }
}

impl Environment for SimEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now().into()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn random_bytes(&self, dest: &mut [u8]) {
        // A panic while holding the lock cannot leave the RNG half-updated,
        // so a poisoned lock is still usable.
        let mut rng = self.rng.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        rng.fill_bytes(dest);
    }
}
