//! Tabflow crate - Tab group focus engine
//!
//! This crate keeps a browser's tab groups organized around the tab the user
//! is working in:
//! - Domain models (windows, tabs, tab groups, active window records)
//! - The `Browser` boundary and an in-memory simulation of it
//! - Active window storage (SQLite or in-memory) behind a cache with a
//!   one-time synchronization barrier
//! - A strictly ordered operation queue that runs every reaction
//! - Staleness validation, retry of refused edits, and the focus/collapse
//!   reconciler
//! - Focus mode, auto-grouping, group title sync, and UI requests
//!
//! The crate has no UI dependencies; hosts drive it through [`Engine`].

pub mod browser;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod focus_mode;
pub mod handlers;
pub mod models;
pub mod queue;
pub mod reconcile;
pub mod retry;
pub mod storage;
pub mod validate;

pub use browser::{
    Browser, BrowserEvent, GroupTarget, InMemoryBrowser, MoveTarget, Mutation, TabChange,
    TabGroupQuery, TabGroupUpdate, TabQuery, TabUpdate, WindowQuery,
};
pub use cache::ActiveWindowCache;
pub use config::{EngineSettings, PreferenceToggle, Preferences};
pub use engine::{Engine, EngineContext};
pub use error::{BrowserError, EngineError};
pub use handlers::{Request, Response};
pub use models::{
    ActiveWindow, ActiveWindowPatch, ActiveWindowTabGroup, BrowserTab, BrowserTabGroup,
    BrowserWindow, FocusMode, FocusModeColors, SavedTabGroupColor, TabGroupColor, TabGroupId,
    TabGroupPatch, TabId, WindowId, WindowKind,
};
pub use queue::{ErrorHandler, OperationQueue, Priority};
pub use retry::RetryHandler;
pub use storage::{InMemoryWindowStore, SqliteWindowStore, WindowStore};
