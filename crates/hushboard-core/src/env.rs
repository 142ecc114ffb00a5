//! Environment abstraction for deterministic testing.
//!
//! Decouples messaging logic from system resources (wall clock, randomness).
//! Simulation uses a settable clock and a seeded RNG; production uses the
//! system clock and OS entropy.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::{RngCore, rngs::OsRng};

/// Abstract environment providing wall-clock time and randomness.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Methods are infallible except in exceptional circumstances (e.g., OS
///   entropy exhaustion, incorrect simulation setup)
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current Unix time in seconds.
    ///
    /// Used for decryption permit validity windows, which are expressed in
    /// wall-clock seconds on-chain.
    fn unix_time(&self) -> u64;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Given the same RNG seed, this produces the same sequence of bytes
    /// - Uses cryptographically secure RNG
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates a random 32-byte array.
    ///
    /// Useful for secrets and nonces.
    fn random_32(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        self.random_bytes(&mut bytes);
        bytes
    }
}

/// Production environment backed by the system clock and OS entropy.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    #[allow(clippy::disallowed_methods)]
    fn unix_time(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_secs())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        OsRng.fill_bytes(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_after_2023() {
        assert!(SystemEnv.unix_time() > 1_672_531_200);
    }

    #[test]
    fn system_entropy_fills_buffer() {
        // Two 32-byte draws colliding is not a realistic outcome
        assert_ne!(SystemEnv.random_32(), SystemEnv.random_32());
    }
}
