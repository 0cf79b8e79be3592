//! ResultSet - Lazy, hydrated query results
//!
//! TigerStyle: Nothing is fetched until asked for, and only what is asked
//! for. Every `stream()` starts over from the beginning of the window.

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::stream::{self, Stream};

use crate::constants::RESULT_SET_BATCH_SIZE_MAX;
use crate::error::OdmResult;
use crate::identity::{IdentityMap, Instance};
use crate::key::Key;
use crate::model::Model;
use crate::query::QueryError;
use crate::storage::Cursor;
use crate::Record;

/// Records matching a query, hydrated through the identity map on access.
pub struct ResultSet<T> {
    cursor: Cursor,
    identity: Arc<IdentityMap>,
    batch_size: u64,
    _model: PhantomData<fn() -> T>,
}

impl<T> Clone for ResultSet<T> {
    fn clone(&self) -> Self {
        Self {
            cursor: self.cursor.clone(),
            identity: Arc::clone(&self.identity),
            batch_size: self.batch_size,
            _model: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for ResultSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("window", self.cursor.window())
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl<T: Model> ResultSet<T> {
    pub(crate) fn new(cursor: Cursor, identity: Arc<IdentityMap>, batch_size: u64) -> Self {
        Self {
            cursor,
            identity,
            batch_size,
            _model: PhantomData,
        }
        .batch_size(batch_size)
    }

    /// Sort by attributes; a leading `-` sorts descending.
    ///
    /// # Errors
    /// Returns `InvalidSortKey` for a key without an attribute name.
    pub fn sort<S: AsRef<str>>(mut self, keys: &[S]) -> Result<Self, QueryError> {
        self.cursor = self.cursor.sort(keys)?;
        Ok(self)
    }

    /// Skip the first `n` matches.
    #[must_use]
    pub fn offset(mut self, n: u64) -> Self {
        self.cursor = self.cursor.skip(n);
        self
    }

    /// Return at most `n` matches.
    #[must_use]
    pub fn limit(mut self, n: u64) -> Self {
        self.cursor = self.cursor.limit(n);
        self
    }

    /// Records fetched per round trip while streaming.
    ///
    /// # Panics
    /// Panics if `n` is zero or above `RESULT_SET_BATCH_SIZE_MAX`.
    #[must_use]
    pub fn batch_size(mut self, n: u64) -> Self {
        // Precondition
        assert!(
            n > 0 && n <= RESULT_SET_BATCH_SIZE_MAX,
            "batch size {n} outside 1..={RESULT_SET_BATCH_SIZE_MAX}"
        );
        self.batch_size = n;
        self
    }

    /// The raw cursor.
    #[must_use]
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Number of matches inside the window. Fetches no records.
    ///
    /// # Errors
    /// Storage errors.
    pub async fn count(&self) -> OdmResult<u64> {
        Ok(self.cursor.count().await?)
    }

    /// The instance at `index`, fetching that one record only.
    ///
    /// # Errors
    /// Storage or deserialization errors. Past the end is `Ok(None)`.
    pub async fn get(&self, index: u64) -> OdmResult<Option<Instance<T>>> {
        match self.cursor.nth(index).await? {
            Some(record) => Ok(Some(self.identity.hydrate::<T>(record).await?)),
            None => Ok(None),
        }
    }

    /// Stream every instance in the window, fetched in batches.
    pub fn stream(&self) -> impl Stream<Item = OdmResult<Instance<T>>> + Send + 'static {
        let state = StreamState {
            cursor: self.cursor.clone(),
            identity: Arc::clone(&self.identity),
            batch_size: self.batch_size,
            offset: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        };
        stream::try_unfold(state, next_instance::<T>)
    }

    /// Every instance in the window.
    ///
    /// # Errors
    /// Storage or deserialization errors.
    pub async fn to_vec(&self) -> OdmResult<Vec<Instance<T>>> {
        let records = self.cursor.to_vec().await?;
        let mut instances = Vec::with_capacity(records.len());
        for record in records {
            instances.push(self.identity.hydrate::<T>(record).await?);
        }
        Ok(instances)
    }

    /// Primary keys in the window, without hydrating.
    ///
    /// # Errors
    /// Storage errors.
    pub async fn keys(&self) -> OdmResult<Vec<Key>> {
        let records = self.cursor.to_vec().await?;
        Ok(records
            .iter()
            .filter_map(|record| record.get(T::primary_name()).and_then(Key::from_value))
            .collect())
    }
}

struct StreamState {
    cursor: Cursor,
    identity: Arc<IdentityMap>,
    batch_size: u64,
    offset: u64,
    buffer: VecDeque<Record>,
    exhausted: bool,
}

async fn next_instance<T: Model>(
    mut state: StreamState,
) -> OdmResult<Option<(Instance<T>, StreamState)>> {
    loop {
        if let Some(record) = state.buffer.pop_front() {
            let instance = state.identity.hydrate::<T>(record).await?;
            return Ok(Some((instance, state)));
        }
        if state.exhausted {
            return Ok(None);
        }

        let batch = state.cursor.batch(state.offset, state.batch_size).await?;
        let fetched = batch.len() as u64;
        tracing::trace!(offset = state.offset, fetched, "fetched batch");

        state.offset += fetched;
        state.exhausted = fetched < state.batch_size;
        if fetched == 0 {
            return Ok(None);
        }
        state.buffer.extend(batch);
    }
}
