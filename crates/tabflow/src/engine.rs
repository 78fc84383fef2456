//! Engine instance wiring the queue, cache, retry handler and handlers
//!
//! One [`Engine`] owns everything the handlers share. Browser notifications,
//! UI requests and preference changes all enter through it and become queued
//! operations; nothing touches the cache or the browser outside the queue.

use log::{debug, info, warn};
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::oneshot;

use crate::browser::{Browser, BrowserEvent};
use crate::cache::ActiveWindowCache;
use crate::config::{EngineSettings, PreferenceToggle, Preferences};
use crate::error::EngineError;
use crate::handlers::{self, Request, Response};
use crate::queue::{ErrorHandler, OperationQueue, Priority};
use crate::retry::RetryHandler;
use crate::storage::WindowStore;

/// State shared by every queued operation
pub struct EngineContext {
    pub browser: Arc<dyn Browser>,
    pub cache: ActiveWindowCache,
    pub retry: RetryHandler,
    pub settings: EngineSettings,
    preferences: RwLock<Preferences>,
}

impl EngineContext {
    pub fn new(
        browser: Arc<dyn Browser>,
        store: Arc<dyn WindowStore>,
        preferences: Preferences,
        settings: EngineSettings,
    ) -> Self {
        Self {
            browser,
            cache: ActiveWindowCache::new(store),
            retry: RetryHandler::new(settings.retry_delay()),
            settings,
            preferences: RwLock::new(preferences),
        }
    }

    /// Current preferences, read at the moment of the call
    pub fn preferences(&self) -> Preferences {
        self.preferences
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the preferences, returning the ones they replaced
    fn swap_preferences(&self, next: Preferences) -> Preferences {
        let mut current = self
            .preferences
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, next)
    }
}

/// The tab group engine
pub struct Engine {
    ctx: Arc<EngineContext>,
    queue: OperationQueue,
}

impl Engine {
    /// Build a stopped engine; call [`Engine::start`] to begin processing
    pub fn new(
        browser: Arc<dyn Browser>,
        store: Arc<dyn WindowStore>,
        preferences: Preferences,
        settings: EngineSettings,
        on_error: ErrorHandler,
    ) -> Self {
        let queue = OperationQueue::new(settings.operation_timeout(), on_error);
        let ctx = Arc::new(EngineContext::new(browser, store, preferences, settings));
        Self { ctx, queue }
    }

    /// Start processing once `bootstrap` resolves, reconciling stored records first
    pub fn start<B>(&self, bootstrap: B)
    where
        B: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        info!("Starting tab group engine");
        let ctx = Arc::clone(&self.ctx);
        self.queue
            .enqueue("startupReconcile", Priority::Next, move || async move {
                handlers::startup_reconcile(&ctx).await
            });
        self.queue.start(bootstrap);
    }

    /// Queue the handler for a browser notification
    pub fn dispatch(&self, event: BrowserEvent) {
        let ctx = Arc::clone(&self.ctx);
        let priority = handlers::priority(&event);
        self.queue.enqueue(event.name(), priority, move || async move {
            handlers::handle_event(&ctx, event).await
        });
    }

    /// Queue a UI request and wait for its response.
    ///
    /// A failed request answers with its error and also fails its operation,
    /// which suspends the queue.
    pub async fn request(&self, request: Request) -> Result<Response, EngineError> {
        if self.queue.is_suspended() {
            return Err(EngineError::QueueSuspended);
        }
        if let Request::UpdateActiveWindow { patch, .. } = &request {
            if let Some(field) = patch.engine_owned_field() {
                return Err(EngineError::EngineOwnedField { field });
            }
        }
        let (tx, rx) = oneshot::channel();
        let ctx = Arc::clone(&self.ctx);
        let name = request.name();
        self.queue.enqueue(name, Priority::End, move || async move {
            match handlers::handle_request(&ctx, request).await {
                Ok(response) => {
                    let _ = tx.send(Ok(response));
                    Ok(())
                }
                Err(e) => {
                    let _ = tx.send(Err(EngineError::from_anyhow(&e)));
                    Err(e)
                }
            }
        });

        tokio::select! {
            biased;
            response = rx => response.unwrap_or_else(|_| {
                debug!("{} was dropped before answering", name);
                Err(EngineError::QueueSuspended)
            }),
            _ = self.queue.wait_suspended() => Err(EngineError::QueueSuspended),
        }
    }

    /// Replace preferences and queue a pass for every toggled boolean
    pub fn set_preferences(&self, preferences: Preferences) {
        let previous = self.ctx.swap_preferences(preferences.clone());
        for toggle in previous.toggled(&preferences) {
            let ctx = Arc::clone(&self.ctx);
            let name = match toggle {
                PreferenceToggle::CollapseUnfocusedTabGroups(_) => "collapseUnfocusedTabGroups",
                PreferenceToggle::AlwaysGroupTabs(_) => "alwaysGroupTabs",
                PreferenceToggle::AutoActivateNewWindows(_) => "autoActivateNewWindows",
            };
            debug!("Preference changed: {:?}", toggle);
            self.queue.enqueue(name, Priority::End, move || async move {
                handlers::apply_toggle(&ctx, toggle).await
            });
        }
    }

    pub fn preferences(&self) -> Preferences {
        self.ctx.preferences()
    }

    pub fn is_suspended(&self) -> bool {
        self.queue.is_suspended()
    }

    pub fn cache(&self) -> &ActiveWindowCache {
        &self.ctx.cache
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    /// Wait until the queue is idle, then until pending store writes land
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await;
        if self.queue.is_suspended() {
            warn!("Engine is suspended; pending operations will not run");
            return;
        }
        self.ctx.cache.flush().await;
    }
}
