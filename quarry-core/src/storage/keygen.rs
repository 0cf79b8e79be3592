//! KeyGenerator - Random primary keys
//!
//! TigerStyle: Bounded by default. The retry cap lives here, next to the
//! key length it trades off against.

use std::sync::Mutex;

use crate::config::OdmConfig;
use crate::constants::{
    KEYGEN_ALPHABET, KEYGEN_ATTEMPTS_MAX_DEFAULT, KEYGEN_LENGTH_DEFAULT, KEYGEN_LENGTH_MAX,
};
use crate::dst::DeterministicRng;
use crate::key::Key;

/// Draws random fixed-length keys of distinct characters.
#[derive(Debug)]
pub struct KeyGenerator {
    length: usize,
    attempts_max: Option<u32>,
    rng: Mutex<DeterministicRng>,
}

impl KeyGenerator {
    /// Create a generator seeded from OS entropy.
    ///
    /// `attempts_max` of `None` retries until an insert succeeds.
    ///
    /// # Panics
    /// Panics if `length` is zero or larger than the alphabet, or if
    /// `attempts_max` is `Some(0)`.
    #[must_use]
    pub fn new(length: usize, attempts_max: Option<u32>) -> Self {
        Self::with_rng(length, attempts_max, DeterministicRng::from_entropy())
    }

    /// Create a generator over an explicit RNG (for simulation).
    ///
    /// # Panics
    /// Same as [`new`](Self::new).
    #[must_use]
    pub fn with_rng(length: usize, attempts_max: Option<u32>, rng: DeterministicRng) -> Self {
        // Preconditions
        assert!(length > 0, "key length must be positive");
        assert!(
            length <= KEYGEN_LENGTH_MAX,
            "key length {length} exceeds alphabet size {KEYGEN_LENGTH_MAX}"
        );
        assert!(attempts_max != Some(0), "attempts_max must be positive");

        Self {
            length,
            attempts_max,
            rng: Mutex::new(rng),
        }
    }

    /// Create from configuration.
    #[must_use]
    pub fn from_config(config: &OdmConfig) -> Self {
        Self::new(config.keygen_length, config.keygen_attempts_max)
    }

    /// Characters per key.
    #[must_use]
    pub fn length(&self) -> usize {
        self.length
    }

    /// Insert attempts before giving up, `None` for unbounded.
    #[must_use]
    pub fn attempts_max(&self) -> Option<u32> {
        self.attempts_max
    }

    /// Draw a key.
    pub fn generate(&self) -> Key {
        let alphabet: Vec<char> = KEYGEN_ALPHABET.chars().collect();
        let drawn = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            rng.sample(&alphabet, self.length)
        };
        let key: String = drawn.into_iter().collect();

        // Postcondition
        assert_eq!(key.len(), self.length, "generated key has wrong length");
        Key::Str(key)
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new(KEYGEN_LENGTH_DEFAULT, Some(KEYGEN_ATTEMPTS_MAX_DEFAULT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_use_alphabet() {
        let keygen = KeyGenerator::with_rng(5, None, DeterministicRng::new(11));
        for _ in 0..50 {
            let Key::Str(key) = keygen.generate() else {
                panic!("generated keys are strings");
            };
            assert_eq!(key.len(), 5);
            assert!(key.chars().all(|c| KEYGEN_ALPHABET.contains(c)));

            let mut chars: Vec<char> = key.chars().collect();
            chars.sort_unstable();
            chars.dedup();
            assert_eq!(chars.len(), 5, "characters must be distinct");
        }
    }

    #[test]
    fn test_same_seed_same_keys() {
        let a = KeyGenerator::with_rng(8, None, DeterministicRng::new(99));
        let b = KeyGenerator::with_rng(8, None, DeterministicRng::new(99));
        assert_eq!(a.generate(), b.generate());
    }

    #[test]
    fn test_default_is_bounded() {
        let keygen = KeyGenerator::default();
        assert_eq!(keygen.length(), KEYGEN_LENGTH_DEFAULT);
        assert_eq!(keygen.attempts_max(), Some(KEYGEN_ATTEMPTS_MAX_DEFAULT));
    }

    #[test]
    #[should_panic(expected = "exceeds alphabet size")]
    fn test_length_too_long() {
        let _ = KeyGenerator::new(KEYGEN_LENGTH_MAX + 1, None);
    }

    #[test]
    #[should_panic(expected = "attempts_max must be positive")]
    fn test_zero_attempts() {
        let _ = KeyGenerator::new(5, Some(0));
    }
}
