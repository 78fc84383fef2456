//! Active window cache with a one-time synchronization barrier
//!
//! The cache mirrors every [`ActiveWindow`] record of the [`WindowStore`].
//! The first access of any kind starts a single load from the store; every
//! caller, including ones arriving mid-load, waits until the load has
//! finished before touching the cache. The one exception is the caller that
//! triggered the load through [`ActiveWindowCache::get`]: its window is read
//! from the store first and handed back before the full load completes.
//!
//! Mutations are applied to the in-memory map immediately and written through
//! to the store by a single writer task, in the order they were made. Callers
//! never wait for persistence and write failures are only logged.

use log::{debug, error, info};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::EngineError;
use crate::models::{ActiveWindow, ActiveWindowPatch, WindowId};
use crate::storage::WindowStore;

/// Progress of the one-time load from the store
#[derive(Debug, Clone, PartialEq, Eq)]
enum SyncPhase {
    Unstarted,
    Loading,
    Loaded,
    Failed(String),
}

/// A queued write-through to the store
enum StoreWrite {
    Add(ActiveWindow),
    Update(ActiveWindow),
    Remove(WindowId),
    Clear,
    Flush(oneshot::Sender<()>),
}

impl StoreWrite {
    fn apply(&self, store: &dyn WindowStore) -> anyhow::Result<()> {
        match self {
            StoreWrite::Add(window) => store.add(window),
            StoreWrite::Update(window) => store.update(window),
            StoreWrite::Remove(window_id) => store.remove(*window_id),
            StoreWrite::Clear => store.clear(),
            StoreWrite::Flush(_) => Ok(()),
        }
    }

    fn describe(&self) -> String {
        match self {
            StoreWrite::Add(window) => format!("add window {}", window.window_id),
            StoreWrite::Update(window) => format!("update window {}", window.window_id),
            StoreWrite::Remove(window_id) => format!("remove window {}", window_id),
            StoreWrite::Clear => "clear".to_string(),
            StoreWrite::Flush(_) => "flush".to_string(),
        }
    }
}

struct Shared {
    store: Arc<dyn WindowStore>,
    windows: Mutex<BTreeMap<WindowId, ActiveWindow>>,
    phase: watch::Sender<SyncPhase>,
}

impl Shared {
    fn windows(&self) -> MutexGuard<'_, BTreeMap<WindowId, ActiveWindow>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-memory view of the active window records
pub struct ActiveWindowCache {
    shared: Arc<Shared>,
    writes: mpsc::UnboundedSender<StoreWrite>,
    /// Taken by the loader, which starts the writer once loading succeeds
    pending_writer: Mutex<Option<mpsc::UnboundedReceiver<StoreWrite>>>,
}

impl ActiveWindowCache {
    /// Create an unloaded cache over `store`; nothing is read until first use
    pub fn new(store: Arc<dyn WindowStore>) -> Self {
        let (phase, _) = watch::channel(SyncPhase::Unstarted);
        let (writes, receiver) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                store,
                windows: Mutex::new(BTreeMap::new()),
                phase,
            }),
            writes,
            pending_writer: Mutex::new(Some(receiver)),
        }
    }

    /// Whether the load from the store has completed successfully
    pub fn is_loaded(&self) -> bool {
        *self.shared.phase.borrow() == SyncPhase::Loaded
    }

    // === Barrier ===

    /// Start the load if nobody has yet.
    ///
    /// Returns a receiver for the priority window when this call started the
    /// load and a priority window was requested.
    fn begin_load(
        &self,
        priority: Option<WindowId>,
    ) -> Option<oneshot::Receiver<Result<Option<ActiveWindow>, String>>> {
        let started = self.shared.phase.send_if_modified(|phase| {
            if *phase == SyncPhase::Unstarted {
                *phase = SyncPhase::Loading;
                true
            } else {
                false
            }
        });
        if !started {
            return None;
        }

        let writer = self
            .pending_writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let (priority_tx, priority_rx) = match priority {
            Some(_) => {
                let (tx, rx) = oneshot::channel();
                (Some(tx), Some(rx))
            }
            None => (None, None),
        };

        debug!("Loading active window cache (priority window: {:?})", priority);
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            if let (Some(window_id), Some(tx)) = (priority, priority_tx) {
                let store = Arc::clone(&shared.store);
                let result = run_blocking(move || store.get(window_id)).await;
                let _ = tx.send(result.map_err(|e| format!("{:#}", e)));
            }

            let store = Arc::clone(&shared.store);
            match run_blocking(move || store.get_all()).await {
                Ok(windows) => {
                    let count = windows.len();
                    shared
                        .windows()
                        .extend(windows.into_iter().map(|w| (w.window_id, w)));
                    if let Some(receiver) = writer {
                        tokio::spawn(run_writer(Arc::clone(&shared.store), receiver));
                    }
                    shared.phase.send_replace(SyncPhase::Loaded);
                    info!("Active window cache loaded {} windows", count);
                }
                Err(e) => {
                    error!("Active window cache failed to load: {:#}", e);
                    shared.phase.send_replace(SyncPhase::Failed(format!("{:#}", e)));
                }
            }
        });

        priority_rx
    }

    /// Wait until the cache is loaded, starting the load if needed
    async fn synchronize(&self) -> Result<(), EngineError> {
        self.begin_load(None);
        let mut phase = self.shared.phase.subscribe();
        let phase = phase
            .wait_for(|p| matches!(p, SyncPhase::Loaded | SyncPhase::Failed(_)))
            .await
            .map(|p| p.clone())
            .map_err(|_| EngineError::CacheLoadFailed {
                message: "cache dropped during load".to_string(),
            })?;
        match phase {
            SyncPhase::Failed(message) => Err(EngineError::CacheLoadFailed { message }),
            _ => Ok(()),
        }
    }

    fn check_synchronized(&self) -> Result<(), EngineError> {
        if self.is_loaded() {
            Ok(())
        } else {
            Err(EngineError::CacheNotSynchronized)
        }
    }

    fn write(&self, write: StoreWrite) {
        if self.writes.send(write).is_err() {
            error!("Active window writer is gone; dropping store write");
        }
    }

    // === Reads ===

    /// Get the record for a window
    pub async fn get(&self, window_id: WindowId) -> Result<Option<ActiveWindow>, EngineError> {
        if let Some(priority) = self.begin_load(Some(window_id)) {
            match priority.await {
                Ok(Ok(window)) => return Ok(window),
                Ok(Err(message)) => return Err(EngineError::CacheLoadFailed { message }),
                // Loader went away; fall back to the full barrier
                Err(_) => {}
            }
        }
        self.synchronize().await?;
        Ok(self.shared.windows().get(&window_id).cloned())
    }

    /// Get the record for a window, failing if it is not active
    pub async fn get_or_throw(&self, window_id: WindowId) -> Result<ActiveWindow, EngineError> {
        self.get(window_id)
            .await?
            .ok_or(EngineError::MissingActiveWindow(window_id))
    }

    /// Get every record, ordered by window id
    pub async fn get_all(&self) -> Result<Vec<ActiveWindow>, EngineError> {
        self.synchronize().await?;
        Ok(self.shared.windows().values().cloned().collect())
    }

    // === Mutations ===

    /// Add a record for a newly activated window
    pub async fn add(&self, window: ActiveWindow) -> Result<ActiveWindow, EngineError> {
        self.synchronize().await?;
        self.add_synced(window)
    }

    fn add_synced(&self, window: ActiveWindow) -> Result<ActiveWindow, EngineError> {
        self.check_synchronized()?;
        let mut windows = self.shared.windows();
        if windows.contains_key(&window.window_id) {
            return Err(EngineError::WindowAlreadyActive(window.window_id));
        }
        windows.insert(window.window_id, window.clone());
        drop(windows);
        self.write(StoreWrite::Add(window.clone()));
        Ok(window)
    }

    /// Remove a window's record, returning it if it existed
    pub async fn remove(&self, window_id: WindowId) -> Result<Option<ActiveWindow>, EngineError> {
        self.synchronize().await?;
        self.remove_synced(window_id)
    }

    fn remove_synced(&self, window_id: WindowId) -> Result<Option<ActiveWindow>, EngineError> {
        self.check_synchronized()?;
        let removed = self.shared.windows().remove(&window_id);
        if removed.is_some() {
            self.write(StoreWrite::Remove(window_id));
        }
        Ok(removed)
    }

    /// Apply a patch to a window's record and return the result
    pub async fn update(
        &self,
        window_id: WindowId,
        patch: ActiveWindowPatch,
    ) -> Result<ActiveWindow, EngineError> {
        self.synchronize().await?;
        self.update_synced(window_id, patch)
    }

    fn update_synced(
        &self,
        window_id: WindowId,
        patch: ActiveWindowPatch,
    ) -> Result<ActiveWindow, EngineError> {
        self.check_synchronized()?;
        let mut windows = self.shared.windows();
        let window = windows
            .get_mut(&window_id)
            .ok_or(EngineError::MissingActiveWindow(window_id))?;
        window.apply(patch);
        let updated = window.clone();
        drop(windows);
        self.write(StoreWrite::Update(updated.clone()));
        Ok(updated)
    }

    /// Remove every record
    pub async fn clear(&self) -> Result<(), EngineError> {
        self.synchronize().await?;
        self.check_synchronized()?;
        self.shared.windows().clear();
        self.write(StoreWrite::Clear);
        Ok(())
    }

    /// Wait until every write queued so far has reached the store
    pub async fn flush(&self) {
        if !self.is_loaded() {
            return;
        }
        let (tx, rx) = oneshot::channel();
        self.write(StoreWrite::Flush(tx));
        let _ = rx.await;
    }
}

/// Run a store call on the blocking pool
async fn run_blocking<T, F>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

/// Apply store writes one at a time, in order
async fn run_writer(store: Arc<dyn WindowStore>, mut writes: mpsc::UnboundedReceiver<StoreWrite>) {
    while let Some(write) = writes.recv().await {
        if let StoreWrite::Flush(done) = write {
            let _ = done.send(());
            continue;
        }
        let description = write.describe();
        let store = Arc::clone(&store);
        match run_blocking(move || write.apply(store.as_ref())).await {
            Ok(()) => debug!("Persisted {}", description),
            Err(e) => error!("Failed to persist {}: {:#}", description, e),
        }
    }
    debug!("Active window writer stopped");
}
