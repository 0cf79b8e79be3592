//! Storage - Backend Trait and Implementations
//!
//! TigerStyle: Abstract storage with simulation-first testing.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    StorageBackend Trait                      │
//! └─────────────────────────────────────────────────────────────┘
//!          ↑                     ↑                      ↑
//!          │                     │                      │
//! ┌────────┴────────┐  ┌────────┴────────┐  ┌──────────┴────────┐
//! │ DocumentStorage │  │ PostgresBackend │  │  Instrumented<S>  │
//! │ (any Collection)│  │   (production)  │  │ (logs + counters) │
//! └─────────────────┘  └─────────────────┘  └───────────────────┘
//! ```
//!
//! Queries come back as a [`Cursor`]: nothing is fetched until the cursor
//! is counted, indexed or collected.

mod backend;
mod cursor;
mod document;
mod error;
mod instrumented;
mod keygen;

#[cfg(feature = "postgres")]
mod postgres;

pub use backend::StorageBackend;
pub use cursor::{Cursor, CursorWindow, RecordSource, SortKey, SortOrder};
pub use document::DocumentStorage;
pub use error::{StorageError, StorageResult};
pub use instrumented::{Instrumented, Op, OpStats};
pub use keygen::KeyGenerator;

#[cfg(feature = "postgres")]
pub use postgres::PostgresBackend;
