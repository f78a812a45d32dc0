//! Cursor persistence adapters.

mod file;
mod in_memory;

pub use file::{DEFAULT_CURSOR_PATH, FileCursorStore};
pub use in_memory::InMemoryCursorStore;
