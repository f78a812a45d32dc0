//! In-memory cursor store for testing.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use parking_lot::RwLock;

use crate::application::ports::{CursorStoreError, CursorStorePort};
use crate::domain::cursor::ProgressCursor;

/// In-memory implementation of `CursorStorePort`.
///
/// Suitable for testing and development. Not for production use.
#[derive(Debug, Default)]
pub struct InMemoryCursorStore {
    cursor: RwLock<Option<ProgressCursor>>,
    saves: RwLock<usize>,
}

impl InMemoryCursorStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding `cursor`.
    #[must_use]
    pub fn with_cursor(cursor: ProgressCursor) -> Self {
        Self {
            cursor: RwLock::new(Some(cursor)),
            saves: RwLock::new(0),
        }
    }

    /// The stored cursor, if any has been saved.
    #[must_use]
    pub fn current(&self) -> Option<ProgressCursor> {
        self.cursor.read().clone()
    }

    /// Number of successful saves.
    #[must_use]
    pub fn save_count(&self) -> usize {
        *self.saves.read()
    }
}

#[async_trait]
impl CursorStorePort for InMemoryCursorStore {
    async fn load(&self, now: NaiveDateTime) -> ProgressCursor {
        self.cursor
            .read()
            .clone()
            .unwrap_or_else(|| ProgressCursor::start_of_day(now))
    }

    async fn save(&self, cursor: &ProgressCursor) -> Result<(), CursorStoreError> {
        *self.cursor.write() = Some(cursor.clone());
        *self.saves.write() += 1;
        Ok(())
    }
}
