//! Cursor - Lazy, restartable access to matching records
//!
//! TigerStyle: A cursor is a source plus a window. Consuming it never moves
//! shared state, so any number of passes see the same records.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::error::StorageResult;
use crate::constants::SORT_DESCENDING_PREFIX;
use crate::query::QueryError;
use crate::Record;

// =============================================================================
// Window
// =============================================================================

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest first
    Ascending,
    /// Largest first
    Descending,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Attribute to sort by
    pub attribute: String,
    /// Direction
    pub order: SortOrder,
}

impl SortKey {
    /// Parse `"name"` (ascending) or `"-name"` (descending).
    ///
    /// # Errors
    /// Returns `InvalidSortKey` if no attribute name is left.
    pub fn parse(text: &str) -> Result<Self, QueryError> {
        let (attribute, order) = match text.strip_prefix(SORT_DESCENDING_PREFIX) {
            Some(rest) => (rest, SortOrder::Descending),
            None => (text, SortOrder::Ascending),
        };
        if attribute.is_empty() {
            return Err(QueryError::InvalidSortKey(text.to_string()));
        }

        Ok(Self {
            attribute: attribute.to_string(),
            order,
        })
    }
}

/// Pending sort/skip/limit configuration of a cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CursorWindow {
    /// Sort keys, most significant first
    pub sort: Vec<SortKey>,
    /// Records skipped from the start
    pub skip: u64,
    /// Maximum records returned
    pub limit: Option<u64>,
}

impl CursorWindow {
    /// Narrow this window to `count` records starting `offset` into it.
    #[must_use]
    pub fn slice(&self, offset: u64, count: u64) -> Self {
        let remaining = self.limit.map(|limit| limit.saturating_sub(offset));
        let count = remaining.map_or(count, |remaining| remaining.min(count));
        Self {
            sort: self.sort.clone(),
            skip: self.skip.saturating_add(offset),
            limit: Some(count),
        }
    }

    /// Apply skip and limit to a total match count.
    #[must_use]
    pub fn clamp_count(&self, matched: u64) -> u64 {
        let after_skip = matched.saturating_sub(self.skip);
        self.limit.map_or(after_skip, |limit| after_skip.min(limit))
    }
}

// =============================================================================
// Record Source
// =============================================================================

/// Backend half of a cursor: runs the translated query for a window.
#[async_trait]
pub trait RecordSource: Send + Sync + fmt::Debug {
    /// Fetch the records inside `window`, in window order.
    async fn fetch(&self, window: &CursorWindow) -> StorageResult<Vec<Record>>;

    /// Count the records inside `window`.
    async fn count(&self, window: &CursorWindow) -> StorageResult<u64>;
}

// =============================================================================
// Cursor
// =============================================================================

/// Lazy handle on the records matching a query.
#[derive(Debug, Clone)]
pub struct Cursor {
    source: Arc<dyn RecordSource>,
    window: CursorWindow,
}

impl Cursor {
    /// Create a cursor over a source with an open window.
    #[must_use]
    pub fn new(source: Arc<dyn RecordSource>) -> Self {
        Self {
            source,
            window: CursorWindow::default(),
        }
    }

    /// Current window.
    #[must_use]
    pub fn window(&self) -> &CursorWindow {
        &self.window
    }

    /// Sort by keys; a leading `-` sorts descending.
    ///
    /// # Errors
    /// Returns `InvalidSortKey` for a key without an attribute name.
    pub fn sort<S: AsRef<str>>(mut self, keys: &[S]) -> Result<Self, QueryError> {
        self.window.sort = keys
            .iter()
            .map(|k| SortKey::parse(k.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(self)
    }

    /// Skip the first `n` records.
    #[must_use]
    pub fn skip(mut self, n: u64) -> Self {
        self.window.skip = n;
        self
    }

    /// Return at most `n` records.
    #[must_use]
    pub fn limit(mut self, n: u64) -> Self {
        self.window.limit = Some(n);
        self
    }

    /// Number of records in the window.
    pub async fn count(&self) -> StorageResult<u64> {
        self.source.count(&self.window).await
    }

    /// Fetch the record at `index` within the window, and nothing else.
    pub async fn nth(&self, index: u64) -> StorageResult<Option<Record>> {
        let mut records = self.source.fetch(&self.window.slice(index, 1)).await?;
        // Postcondition
        assert!(records.len() <= 1, "single-record fetch returned {}", records.len());
        Ok(records.pop())
    }

    /// Fetch up to `count` records starting `offset` into the window.
    pub async fn batch(&self, offset: u64, count: u64) -> StorageResult<Vec<Record>> {
        let records = self.source.fetch(&self.window.slice(offset, count)).await?;
        // Postcondition
        assert!(
            records.len() as u64 <= count,
            "batch returned {} records, asked for {}",
            records.len(),
            count
        );
        Ok(records)
    }

    /// Fetch every record in the window.
    pub async fn to_vec(&self) -> StorageResult<Vec<Record>> {
        self.source.fetch(&self.window).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_key_parse() {
        assert_eq!(
            SortKey::parse("-age").unwrap(),
            SortKey {
                attribute: "age".to_string(),
                order: SortOrder::Descending
            }
        );
        assert_eq!(SortKey::parse("name").unwrap().order, SortOrder::Ascending);
    }

    #[test]
    fn test_sort_key_without_attribute() {
        assert_eq!(
            SortKey::parse("-").unwrap_err(),
            QueryError::InvalidSortKey("-".to_string())
        );
        assert!(SortKey::parse("").is_err());
    }

    #[test]
    fn test_window_slice_respects_limit() {
        let window = CursorWindow {
            sort: vec![],
            skip: 10,
            limit: Some(5),
        };

        let slice = window.slice(3, 100);
        assert_eq!(slice.skip, 13);
        assert_eq!(slice.limit, Some(2));

        let past_end = window.slice(7, 1);
        assert_eq!(past_end.limit, Some(0));

        let open = CursorWindow::default().slice(4, 1);
        assert_eq!(open.skip, 4);
        assert_eq!(open.limit, Some(1));
    }

    #[test]
    fn test_window_clamp_count() {
        let window = CursorWindow {
            sort: vec![],
            skip: 2,
            limit: Some(3),
        };
        assert_eq!(window.clamp_count(10), 3);
        assert_eq!(window.clamp_count(4), 2);
        assert_eq!(window.clamp_count(1), 0);
        assert_eq!(CursorWindow::default().clamp_count(7), 7);
    }
}
