//! In-memory storage implementation

use anyhow::{Result, bail};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use super::WindowStore;
use crate::models::{ActiveWindow, WindowId};

/// In-memory implementation of [`WindowStore`]
#[derive(Default)]
pub struct InMemoryWindowStore {
    windows: RwLock<BTreeMap<WindowId, ActiveWindow>>,
}

impl InMemoryWindowStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with records
    pub fn with_windows(windows: impl IntoIterator<Item = ActiveWindow>) -> Self {
        let store = Self::new();
        store
            .windows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(windows.into_iter().map(|w| (w.window_id, w)));
        store
    }
}

impl WindowStore for InMemoryWindowStore {
    fn get(&self, window_id: WindowId) -> Result<Option<ActiveWindow>> {
        let windows = self.windows.read().unwrap_or_else(PoisonError::into_inner);
        Ok(windows.get(&window_id).cloned())
    }

    fn get_all(&self) -> Result<Vec<ActiveWindow>> {
        let windows = self.windows.read().unwrap_or_else(PoisonError::into_inner);
        Ok(windows.values().cloned().collect())
    }

    fn add(&self, window: &ActiveWindow) -> Result<()> {
        let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);
        if windows.contains_key(&window.window_id) {
            bail!("Window {} is already stored", window.window_id);
        }
        windows.insert(window.window_id, window.clone());
        Ok(())
    }

    fn update(&self, window: &ActiveWindow) -> Result<()> {
        let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);
        windows.insert(window.window_id, window.clone());
        Ok(())
    }

    fn remove(&self, window_id: WindowId) -> Result<()> {
        let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);
        windows.remove(&window_id);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.windows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}
