//! DST - Deterministic Simulation Testing
//!
//! TigerBeetle/FoundationDB-style simulation support for the storage layer.
//!
//! # Philosophy
//!
//! > "If you're not testing with fault injection, you're not testing."
//!
//! # Usage
//!
//! ```rust
//! use quarry_core::dst::{FaultConfig, FaultInjector, FaultType, SimConfig};
//! use quarry_core::driver::MemoryCollection;
//!
//! let config = SimConfig::with_seed(42);
//! let faults = FaultInjector::builder(config.rng())
//!     .with_fault(FaultConfig::new(FaultType::DuplicateKey, 1.0).max_triggers(2))
//!     .build();
//! let users = MemoryCollection::new("users").with_faults(faults);
//! ```
//!
//! Run with explicit seed for reproducibility:
//! ```bash
//! DST_SEED=12345 cargo test
//! ```

mod config;
mod fault;
mod rng;

pub use config::SimConfig;
pub use fault::{FaultConfig, FaultInjector, FaultInjectorBuilder, FaultType};
pub use rng::DeterministicRng;
