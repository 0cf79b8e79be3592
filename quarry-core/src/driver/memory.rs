//! MemoryCollection - In-process document collection
//!
//! TigerStyle: Simulation-first. Every primitive consults an optional
//! [`FaultInjector`] before touching state.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::matcher::{compare_values, matches};
use super::Collection;
use crate::dst::{FaultInjector, FaultType};
use crate::key::Key;
use crate::storage::{CursorWindow, SortOrder, StorageError, StorageResult};
use crate::Record;

#[derive(Debug, Default)]
struct CollectionState {
    /// Documents in insertion order
    documents: Vec<Record>,
    /// Attributes with a unique index
    unique: Vec<String>,
}

/// A document collection held in memory.
#[derive(Debug)]
pub struct MemoryCollection {
    name: String,
    state: RwLock<CollectionState>,
    faults: Option<Arc<FaultInjector>>,
}

impl MemoryCollection {
    /// Create an empty collection.
    ///
    /// # Panics
    /// Panics if the name is empty.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        // Precondition
        assert!(!name.is_empty(), "collection name cannot be empty");

        Self {
            name,
            state: RwLock::new(CollectionState::default()),
            faults: None,
        }
    }

    /// Attach a fault injector.
    #[must_use]
    pub fn with_faults(mut self, faults: FaultInjector) -> Self {
        self.faults = Some(Arc::new(faults));
        self
    }

    /// The attached fault injector, if any.
    #[must_use]
    pub fn faults(&self) -> Option<&FaultInjector> {
        self.faults.as_deref()
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.state.read().await.documents.len()
    }

    /// True if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn fault(&self, fault_type: FaultType) -> bool {
        self.faults
            .as_ref()
            .is_some_and(|f| f.should_inject(fault_type))
    }

    fn check_read(&self) -> StorageResult<()> {
        if self.fault(FaultType::StorageReadFail) {
            return Err(StorageError::Injected(format!("read on {}", self.name)));
        }
        Ok(())
    }

    fn check_write(&self) -> StorageResult<()> {
        if self.fault(FaultType::StorageWriteFail) {
            return Err(StorageError::Injected(format!("write on {}", self.name)));
        }
        Ok(())
    }

    /// Matching documents in window order, before skip/limit.
    fn select(state: &CollectionState, filter: &Value, window: &CursorWindow) -> StorageResult<Vec<Record>> {
        let mut selected = Vec::new();
        for document in &state.documents {
            if matches(document, filter)? {
                selected.push(document.clone());
            }
        }

        if !window.sort.is_empty() {
            // Stable: ties keep insertion order
            selected.sort_by(|a, b| {
                for key in &window.sort {
                    let null = Value::Null;
                    let left = a.get(&key.attribute).unwrap_or(&null);
                    let right = b.get(&key.attribute).unwrap_or(&null);
                    let ordering = match key.order {
                        SortOrder::Ascending => compare_values(left, right),
                        SortOrder::Descending => compare_values(right, left),
                    };
                    if ordering.is_ne() {
                        return ordering;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        Ok(selected)
    }
}

fn to_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

#[async_trait]
impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_unique_index(&self, attribute: &str) -> StorageResult<()> {
        let mut state = self.state.write().await;
        if !state.unique.iter().any(|a| a == attribute) {
            state.unique.push(attribute.to_string());
        }
        Ok(())
    }

    async fn insert_one(&self, document: Record) -> StorageResult<()> {
        self.check_write()?;

        let mut state = self.state.write().await;

        for attribute in &state.unique {
            let Some(value) = document.get(attribute) else {
                continue;
            };
            let injected = self.fault(FaultType::DuplicateKey);
            let taken = injected
                || state
                    .documents
                    .iter()
                    .any(|d| d.get(attribute) == Some(value));
            if taken {
                let key = Key::from_value(value).unwrap_or_else(|| Key::Str(value.to_string()));
                return Err(StorageError::duplicate_key(&self.name, key));
            }
        }

        let count_before = state.documents.len();
        state.documents.push(document);

        // Postcondition
        assert_eq!(state.documents.len(), count_before + 1, "insert must add one document");
        Ok(())
    }

    async fn find(&self, filter: &Value, window: &CursorWindow) -> StorageResult<Vec<Record>> {
        self.check_read()?;

        let state = self.state.read().await;
        let selected = Self::select(&state, filter, window)?;
        let limit = window.limit.map_or(usize::MAX, to_usize);

        Ok(selected
            .into_iter()
            .skip(to_usize(window.skip))
            .take(limit)
            .collect())
    }

    async fn count(&self, filter: &Value, window: &CursorWindow) -> StorageResult<u64> {
        self.check_read()?;

        let state = self.state.read().await;
        let mut matched = 0u64;
        for document in &state.documents {
            if matches(document, filter)? {
                matched += 1;
            }
        }
        Ok(window.clamp_count(matched))
    }

    async fn update_one(&self, filter: &Value, patch: &Record) -> StorageResult<bool> {
        self.check_write()?;

        let mut state = self.state.write().await;
        for document in &mut state.documents {
            if matches(document, filter)? {
                for (attribute, value) in patch {
                    document.insert(attribute.clone(), value.clone());
                }
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn delete_many(&self, filter: &Value) -> StorageResult<u64> {
        self.check_write()?;

        let mut state = self.state.write().await;

        // Evaluate everything first so a filter error deletes nothing
        let mut doomed = Vec::with_capacity(state.documents.len());
        for document in &state.documents {
            doomed.push(matches(document, filter)?);
        }
        let deleted = doomed.iter().filter(|d| **d).count() as u64;

        let mut flags = doomed.into_iter();
        state.documents.retain(|_| !flags.next().unwrap_or(false));
        Ok(deleted)
    }
}

// =============================================================================
// Tests
// =============================================================================
