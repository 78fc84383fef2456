//! Strictly ordered operation queue
//!
//! Every reaction to a browser notification or a UI message runs as one
//! queued operation, and exactly one operation runs at a time. Entries with
//! [`Priority::Next`] run before any entry with [`Priority::End`] that has
//! not started yet; entries of the same priority run in enqueue order.
//!
//! The first failure (an error, a timeout, or a failed bootstrap) is handed to
//! the error handler and suspends the queue for good. A suspended queue keeps
//! accepting entries but never runs them; recovery means building a new
//! engine.

use anyhow::anyhow;
use log::{debug, error, warn};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::EngineError;

type BoxFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
type Operation = Box<dyn FnOnce() -> BoxFuture + Send>;

/// Callback invoked with the error that suspended the queue
pub type ErrorHandler = Arc<dyn Fn(&anyhow::Error) + Send + Sync>;

/// Scheduling class of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Structural changes (window and group creation/removal)
    Next,
    /// Refinements (activation, title sync, UI messages)
    End,
}

struct QueueEntry {
    name: String,
    operation: Operation,
}

#[derive(Default)]
struct QueueState {
    next: VecDeque<QueueEntry>,
    end: VecDeque<QueueEntry>,
    running: bool,
    started: bool,
    suspended: bool,
}

impl QueueState {
    fn pop(&mut self) -> Option<QueueEntry> {
        self.next.pop_front().or_else(|| self.end.pop_front())
    }

    fn len(&self) -> usize {
        self.next.len() + self.end.len()
    }

    fn is_idle(&self) -> bool {
        self.suspended || (!self.running && self.len() == 0)
    }
}

struct QueueInner {
    state: Mutex<QueueState>,
    /// Wakes the drain loop when an entry arrives
    work: Notify,
    /// Wakes `wait_idle` callers whenever the queue may have gone idle
    idle: Notify,
    timeout: Duration,
    on_error: ErrorHandler,
}

impl QueueInner {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn suspend(&self, err: &anyhow::Error) {
        {
            let mut state = self.state();
            state.suspended = true;
            state.running = false;
            if state.len() > 0 {
                warn!("Queue suspended with {} operations pending", state.len());
            }
        }
        (self.on_error)(err);
        self.idle.notify_waiters();
    }
}

/// Single-consumer queue of named async operations
#[derive(Clone)]
pub struct OperationQueue {
    inner: Arc<QueueInner>,
}

impl OperationQueue {
    /// Create a stopped queue; nothing runs until [`OperationQueue::start`]
    pub fn new(timeout: Duration, on_error: ErrorHandler) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState::default()),
                work: Notify::new(),
                idle: Notify::new(),
                timeout,
                on_error,
            }),
        }
    }

    /// Add an operation to the queue
    pub fn enqueue<F, Fut>(&self, name: impl Into<String>, priority: Priority, operation: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        let entry = QueueEntry {
            name: name.clone(),
            operation: Box::new(move || Box::pin(operation()) as BoxFuture),
        };
        let mut state = self.inner.state();
        match priority {
            Priority::Next => state.next.push_back(entry),
            Priority::End => state.end.push_back(entry),
        }
        if state.suspended {
            debug!("Queued {} on a suspended queue; it will not run", name);
        } else {
            debug!("Queued {} ({:?}, {} pending)", name, priority, state.len());
        }
        drop(state);
        self.inner.work.notify_one();
    }

    /// Start draining once `bootstrap` resolves.
    ///
    /// A bootstrap failure suspends the queue before anything runs. Calling
    /// this more than once has no effect.
    pub fn start<B>(&self, bootstrap: B)
    where
        B: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        {
            let mut state = self.inner.state();
            if state.started {
                warn!("Operation queue already started");
                return;
            }
            state.started = true;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(e) = bootstrap.await {
                let err = anyhow!(EngineError::Bootstrap {
                    message: format!("{:#}", e),
                });
                error!("{}", err);
                inner.suspend(&err);
                return;
            }
            debug!("Operation queue bootstrapped");
            drain(inner).await;
        });
    }

    /// Number of entries waiting to run
    pub fn len(&self) -> usize {
        self.inner.state().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.state().suspended
    }

    /// Resolve once the queue is suspended
    pub async fn wait_suspended(&self) {
        loop {
            let mut notified = std::pin::pin!(self.inner.idle.notified());
            notified.as_mut().enable();
            if self.inner.state().suspended {
                return;
            }
            notified.await;
        }
    }

    /// Resolve once nothing is pending or running, or the queue is suspended
    pub async fn wait_idle(&self) {
        loop {
            let mut notified = std::pin::pin!(self.inner.idle.notified());
            notified.as_mut().enable();
            if self.inner.state().is_idle() {
                return;
            }
            notified.await;
        }
    }
}

async fn drain(inner: Arc<QueueInner>) {
    loop {
        let entry = {
            let mut state = inner.state();
            if state.suspended {
                return;
            }
            let entry = state.pop();
            state.running = entry.is_some();
            entry
        };
        let Some(QueueEntry { name, operation }) = entry else {
            inner.idle.notify_waiters();
            inner.work.notified().await;
            continue;
        };

        debug!("Running {}", name);
        let started = Instant::now();
        let result = match tokio::time::timeout(inner.timeout, operation()).await {
            Ok(result) => result.map_err(|e| e.context(format!("{} failed", name))),
            Err(_) => Err(anyhow!(EngineError::OperationTimedOut {
                name: name.clone(),
                timeout: inner.timeout,
            })),
        };

        match result {
            Ok(()) => {
                debug!("Finished {} in {:?}", name, started.elapsed());
                inner.state().running = false;
                inner.idle.notify_waiters();
            }
            Err(e) => {
                error!("Suspending operation queue: {:#}", e);
                inner.suspend(&e);
                return;
            }
        }
    }
}
