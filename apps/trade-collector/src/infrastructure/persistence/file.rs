//! JSON File Cursor Store
//!
//! Persists the cursor as a pretty-printed JSON document. Saves write a
//! sibling temporary file and rename it over the target, so a crash leaves
//! either the old or the new cursor on disk. A torn or corrupt file loads as
//! the start-of-day default.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::application::ports::{CursorStoreError, CursorStorePort};
use crate::domain::cursor::ProgressCursor;

/// Default cursor file location.
pub const DEFAULT_CURSOR_PATH: &str = "data/collection-cursor.json";

/// File-backed implementation of `CursorStorePort`.
#[derive(Debug, Clone)]
pub struct FileCursorStore {
    path: PathBuf,
}

impl Default for FileCursorStore {
    fn default() -> Self {
        Self::new(DEFAULT_CURSOR_PATH)
    }
}

impl FileCursorStore {
    /// Store the cursor at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Cursor file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CursorStorePort for FileCursorStore {
    async fn load(&self, now: NaiveDateTime) -> ProgressCursor {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No cursor file found, starting from today");
                return ProgressCursor::start_of_day(now);
            }
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to read cursor file, using default"
                );
                return ProgressCursor::start_of_day(now);
            }
        };

        match serde_json::from_str::<ProgressCursor>(&contents) {
            Ok(cursor) => {
                tracing::debug!(
                    watermark = %cursor.last_watermark(),
                    backfill_complete = cursor.backfill_complete(),
                    "Loaded cursor"
                );
                cursor
            }
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "Corrupt cursor file, using default"
                );
                ProgressCursor::start_of_day(now)
            }
        }
    }

    async fn save(&self, cursor: &ProgressCursor) -> Result<(), CursorStoreError> {
        let json = serde_json::to_vec_pretty(cursor)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &json).await?;
        if let Err(e) = tokio::fs::rename(&temp, &self.path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            tracing::error!(path = %self.path.display(), error = %e, "Failed to save cursor");
            return Err(e.into());
        }

        tracing::debug!(watermark = %cursor.last_watermark(), "Saved cursor");
        Ok(())
    }
}
