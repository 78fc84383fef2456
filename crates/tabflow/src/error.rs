//! Error types shared across the engine

use std::time::Duration;

use crate::models::{TabGroupId, WindowId};

/// Failures of the engine itself: invariant violations, fatal queue
/// conditions, and request errors reported back to the UI.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Active window cache accessed before synchronization")]
    CacheNotSynchronized,

    #[error("Active window cache failed to load: {message}")]
    CacheLoadFailed { message: String },

    #[error("No active window record for window {0}")]
    MissingActiveWindow(WindowId),

    #[error("Window {0} is already active")]
    WindowAlreadyActive(WindowId),

    #[error("Tab group {tab_group_id} is not tracked in window {window_id}")]
    MissingTabGroup {
        window_id: WindowId,
        tab_group_id: TabGroupId,
    },

    #[error("Focus mode is already enabled for window {0}")]
    FocusModeAlreadyEnabled(WindowId),

    #[error("Focus mode is already disabled for window {0}")]
    FocusModeAlreadyDisabled(WindowId),

    #[error("Operation {name} timed out after {timeout:?}")]
    OperationTimedOut { name: String, timeout: Duration },

    #[error("Field {field} of an active window is managed by the engine")]
    EngineOwnedField { field: &'static str },

    #[error("Operation queue is suspended")]
    QueueSuspended,

    #[error("Queue bootstrap failed: {message}")]
    Bootstrap { message: String },

    #[error("Operation failed: {message}")]
    Operation { message: String },
}

impl EngineError {
    /// Recover the typed error from an operation failure, flattening anything else
    pub fn from_anyhow(error: &anyhow::Error) -> Self {
        error
            .downcast_ref::<EngineError>()
            .cloned()
            .unwrap_or_else(|| EngineError::Operation {
                message: format!("{:#}", error),
            })
    }
}

/// Errors returned by the window/tab service
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrowserError {
    /// The browser refuses edits while the user is mid-gesture (e.g. dragging a tab)
    #[error("Tabs cannot be edited right now (user may be dragging a tab)")]
    Busy,

    #[error("No {kind} with id {id}")]
    NotFound { kind: &'static str, id: i64 },

    #[error("Browser rejected the call: {0}")]
    Rejected(String),
}

impl BrowserError {
    pub fn is_busy(&self) -> bool {
        matches!(self, BrowserError::Busy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_from_anyhow_keeps_typed_error() {
        let err: anyhow::Error = EngineError::FocusModeAlreadyEnabled(WindowId::new(4)).into();
        let err = err.context("onChangeFocusMode");
        assert_eq!(
            EngineError::from_anyhow(&err),
            EngineError::FocusModeAlreadyEnabled(WindowId::new(4))
        );
    }

    #[test]
    fn test_from_anyhow_flattens_other_errors() {
        let err = Err::<(), _>(BrowserError::Rejected("bad index".into()))
            .context("moveTab")
            .unwrap_err();
        match EngineError::from_anyhow(&err) {
            EngineError::Operation { message } => {
                assert!(message.contains("moveTab"));
                assert!(message.contains("bad index"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
