//! FaultInjector - Probabilistic and scripted faults
//!
//! TigerStyle: Faults are decided by the seeded RNG, so a failing run
//! replays exactly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::rng::DeterministicRng;

/// Kinds of injectable faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultType {
    /// Inserts, updates and deletes fail with a write error
    StorageWriteFail,
    /// Finds and counts fail with a read error
    StorageReadFail,
    /// Inserts report a duplicate key without writing
    DuplicateKey,
}

impl FaultType {
    /// Get string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StorageWriteFail => "storage_write_fail",
            Self::StorageReadFail => "storage_read_fail",
            Self::DuplicateKey => "duplicate_key",
        }
    }
}

/// One fault rule.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultConfig {
    /// Fault to inject
    pub fault_type: FaultType,
    /// Chance per eligible operation
    pub probability: f64,
    /// Stop injecting after this many triggers
    pub max_triggers: Option<u64>,
    /// Let this many eligible operations pass before rolling
    pub skip_first: u64,
}

impl FaultConfig {
    /// Create a rule.
    ///
    /// # Panics
    /// Panics if `probability` is outside `0.0..=1.0`.
    #[must_use]
    pub fn new(fault_type: FaultType, probability: f64) -> Self {
        // Precondition
        assert!(
            (0.0..=1.0).contains(&probability),
            "probability {probability} out of range"
        );
        Self {
            fault_type,
            probability,
            max_triggers: None,
            skip_first: 0,
        }
    }

    /// Trigger at most `n` times.
    #[must_use]
    pub fn max_triggers(mut self, n: u64) -> Self {
        self.max_triggers = Some(n);
        self
    }

    /// Start rolling only after `n` eligible operations went through.
    #[must_use]
    pub fn after(mut self, n: u64) -> Self {
        self.skip_first = n;
        self
    }
}

#[derive(Debug)]
struct FaultRule {
    config: FaultConfig,
    seen: AtomicU64,
    triggered: AtomicU64,
}

/// Decides, per operation, whether to inject a fault.
#[derive(Debug)]
pub struct FaultInjector {
    rng: Mutex<DeterministicRng>,
    rules: Vec<FaultRule>,
}

impl FaultInjector {
    /// Start building an injector.
    #[must_use]
    pub fn builder(rng: DeterministicRng) -> FaultInjectorBuilder {
        FaultInjectorBuilder {
            rng,
            faults: Vec::new(),
        }
    }

    /// Roll for `fault_type`. Returns true if the fault fires.
    pub fn should_inject(&self, fault_type: FaultType) -> bool {
        for rule in self.rules.iter().filter(|r| r.config.fault_type == fault_type) {
            if rule.seen.fetch_add(1, Ordering::SeqCst) < rule.config.skip_first {
                continue;
            }
            if let Some(max) = rule.config.max_triggers {
                if rule.triggered.load(Ordering::SeqCst) >= max {
                    continue;
                }
            }

            let fire = {
                let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
                rng.next_bool(rule.config.probability)
            };
            if fire {
                rule.triggered.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(fault = fault_type.as_str(), "injecting fault");
                return true;
            }
        }
        false
    }

    /// How many times `fault_type` has fired.
    #[must_use]
    pub fn triggered(&self, fault_type: FaultType) -> u64 {
        self.rules
            .iter()
            .filter(|r| r.config.fault_type == fault_type)
            .map(|r| r.triggered.load(Ordering::SeqCst))
            .sum()
    }
}

/// Builder for [`FaultInjector`].
#[derive(Debug)]
pub struct FaultInjectorBuilder {
    rng: DeterministicRng,
    faults: Vec<FaultConfig>,
}

impl FaultInjectorBuilder {
    /// Add a rule.
    #[must_use]
    pub fn with_fault(mut self, fault: FaultConfig) -> Self {
        self.faults.push(fault);
        self
    }

    /// Build the injector.
    #[must_use]
    pub fn build(self) -> FaultInjector {
        FaultInjector {
            rng: Mutex::new(self.rng),
            rules: self
                .faults
                .into_iter()
                .map(|config| FaultRule {
                    config,
                    seen: AtomicU64::new(0),
                    triggered: AtomicU64::new(0),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_triggers() {
        let injector = FaultInjector::builder(DeterministicRng::new(42))
            .with_fault(FaultConfig::new(FaultType::DuplicateKey, 1.0).max_triggers(2))
            .build();

        assert!(injector.should_inject(FaultType::DuplicateKey));
        assert!(injector.should_inject(FaultType::DuplicateKey));
        assert!(!injector.should_inject(FaultType::DuplicateKey));
        assert_eq!(injector.triggered(FaultType::DuplicateKey), 2);
    }

    #[test]
    fn test_after_lets_first_operations_through() {
        let injector = FaultInjector::builder(DeterministicRng::new(42))
            .with_fault(
                FaultConfig::new(FaultType::StorageWriteFail, 1.0)
                    .after(2)
                    .max_triggers(1),
            )
            .build();

        assert!(!injector.should_inject(FaultType::StorageWriteFail));
        assert!(!injector.should_inject(FaultType::StorageWriteFail));
        assert!(injector.should_inject(FaultType::StorageWriteFail));
        assert!(!injector.should_inject(FaultType::StorageWriteFail));
        assert_eq!(injector.triggered(FaultType::StorageWriteFail), 1);
    }

    #[test]
    fn test_unrelated_fault_type() {
        let injector = FaultInjector::builder(DeterministicRng::new(42))
            .with_fault(FaultConfig::new(FaultType::StorageWriteFail, 1.0))
            .build();
        assert!(!injector.should_inject(FaultType::StorageReadFail));
        assert!(injector.should_inject(FaultType::StorageWriteFail));
    }

    #[test]
    fn test_zero_probability_never_fires() {
        let injector = FaultInjector::builder(DeterministicRng::new(9))
            .with_fault(FaultConfig::new(FaultType::StorageReadFail, 0.0))
            .build();
        for _ in 0..100 {
            assert!(!injector.should_inject(FaultType::StorageReadFail));
        }
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_invalid_probability() {
        let _ = FaultConfig::new(FaultType::DuplicateKey, 1.5);
    }
}
