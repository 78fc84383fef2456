//! Storage trait definitions

use anyhow::Result;

use crate::models::{ActiveWindow, WindowId};

/// Durable storage of active window records keyed by window id
///
/// Calls are synchronous; the cache runs them on the blocking pool and never
/// awaits writes on behalf of its callers.
pub trait WindowStore: Send + Sync {
    /// Get the record for a window
    fn get(&self, window_id: WindowId) -> Result<Option<ActiveWindow>>;

    /// Get every stored record, ordered by window id
    fn get_all(&self) -> Result<Vec<ActiveWindow>>;

    /// Store a new record; fails if the window is already stored
    fn add(&self, window: &ActiveWindow) -> Result<()>;

    /// Replace a record, inserting it if missing
    fn update(&self, window: &ActiveWindow) -> Result<()>;

    /// Remove a record; removing an unknown window is not an error
    fn remove(&self, window_id: WindowId) -> Result<()>;

    /// Remove every record
    fn clear(&self) -> Result<()>;
}
