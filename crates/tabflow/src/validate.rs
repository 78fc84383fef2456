//! Staleness validation
//!
//! Notifications are delivered late and out of order, so by the time a
//! handler runs the entity it was told about may be gone or may have changed
//! again. Every id-keyed handler starts with [`validate`]:
//! 1. fetch the live entity (gone ⇒ stale)
//! 2. compare every field the handler relies on (any difference ⇒ stale)
//! 3. fetch the owning window's active record (not managed ⇒ stale)
//!
//! A stale check is not an error: the handler simply does nothing, since a
//! later notification describes the newer state.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use std::fmt;

use crate::browser::Browser;
use crate::cache::ActiveWindowCache;
use crate::error::BrowserError;
use crate::models::{
    ActiveWindow, BrowserTab, BrowserTabGroup, BrowserWindow, TabGroupColor, TabGroupId, TabId,
    WindowId,
};

/// A live entity that can be re-fetched and compared against expectations
#[async_trait]
pub trait LiveEntity: Sized + Send {
    type Id: Copy + fmt::Display + Send + Sync;
    /// Fields the caller expects the live entity to still have
    type Expected: Send + Sync;

    /// Entity name used in logs
    const KIND: &'static str;

    async fn fetch(browser: &dyn Browser, id: Self::Id) -> Result<Option<Self>, BrowserError>;

    /// Window that owns the entity
    fn window_id(&self) -> WindowId;

    /// Name of the first expected field that no longer matches
    fn mismatch(&self, expected: &Self::Expected) -> Option<&'static str>;
}

/// A live entity confirmed fresh, with the record of its managed window
#[derive(Debug, Clone)]
pub struct Validated<E> {
    pub live: E,
    pub active_window: ActiveWindow,
}

/// Re-confirm an entity against live state before acting on it.
///
/// `Ok(None)` means the entity is stale or its window is not managed.
pub async fn validate<E: LiveEntity>(
    browser: &dyn Browser,
    cache: &ActiveWindowCache,
    id: E::Id,
    expected: &E::Expected,
) -> Result<Option<Validated<E>>> {
    let live = E::fetch(browser, id)
        .await
        .with_context(|| format!("Failed to fetch {} {}", E::KIND, id))?;
    let Some(live) = live else {
        debug!("Stale {} {}: no longer exists", E::KIND, id);
        return Ok(None);
    };

    if let Some(field) = live.mismatch(expected) {
        debug!("Stale {} {}: {} changed", E::KIND, id, field);
        return Ok(None);
    }

    let window_id = live.window_id();
    let Some(active_window) = cache.get(window_id).await? else {
        debug!("Ignoring {} {}: window {} is not active", E::KIND, id, window_id);
        return Ok(None);
    };

    Ok(Some(Validated {
        live,
        active_window,
    }))
}

fn differs<T: PartialEq>(expected: &Option<T>, live: &T) -> bool {
    expected.as_ref().is_some_and(|expected| expected != live)
}

// === Windows ===

/// Expected window fields; unset fields are not checked
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedWindow {
    pub focused: Option<bool>,
}

impl ExpectedWindow {
    pub fn focused() -> Self {
        Self {
            focused: Some(true),
        }
    }
}

#[async_trait]
impl LiveEntity for BrowserWindow {
    type Id = WindowId;
    type Expected = ExpectedWindow;

    const KIND: &'static str = "window";

    async fn fetch(browser: &dyn Browser, id: WindowId) -> Result<Option<Self>, BrowserError> {
        browser.get_window(id).await
    }

    fn window_id(&self) -> WindowId {
        self.id
    }

    fn mismatch(&self, expected: &ExpectedWindow) -> Option<&'static str> {
        differs(&expected.focused, &self.focused).then_some("focused")
    }
}

// === Tabs ===

/// Expected tab fields; unset fields are not checked
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedTab {
    pub active: Option<bool>,
    pub window_id: Option<WindowId>,
    /// `Some(None)` expects the tab to be ungrouped
    pub group_id: Option<Option<TabGroupId>>,
    pub title: Option<String>,
    pub pinned: Option<bool>,
}

impl ExpectedTab {
    /// The tab is still active in `window_id`
    pub fn active_in(window_id: WindowId) -> Self {
        Self {
            active: Some(true),
            window_id: Some(window_id),
            ..Self::default()
        }
    }

    pub fn in_window(window_id: WindowId) -> Self {
        Self {
            window_id: Some(window_id),
            ..Self::default()
        }
    }
}

#[async_trait]
impl LiveEntity for BrowserTab {
    type Id = TabId;
    type Expected = ExpectedTab;

    const KIND: &'static str = "tab";

    async fn fetch(browser: &dyn Browser, id: TabId) -> Result<Option<Self>, BrowserError> {
        browser.get_tab(id).await
    }

    fn window_id(&self) -> WindowId {
        self.window_id
    }

    fn mismatch(&self, expected: &ExpectedTab) -> Option<&'static str> {
        if differs(&expected.active, &self.active) {
            return Some("active");
        }
        if differs(&expected.window_id, &self.window_id) {
            return Some("windowId");
        }
        if differs(&expected.group_id, &self.group_id) {
            return Some("groupId");
        }
        if expected
            .title
            .as_ref()
            .is_some_and(|title| self.title.as_ref() != Some(title))
        {
            return Some("title");
        }
        if differs(&expected.pinned, &self.pinned) {
            return Some("pinned");
        }
        None
    }
}

// === Tab groups ===

/// Expected tab group fields; unset fields are not checked
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedTabGroup {
    pub color: Option<TabGroupColor>,
    pub collapsed: Option<bool>,
    pub title: Option<Option<String>>,
    pub window_id: Option<WindowId>,
}

impl ExpectedTabGroup {
    /// Expect the group to look exactly like a notification payload
    pub fn matching(group: &BrowserTabGroup) -> Self {
        Self {
            color: Some(group.color),
            collapsed: Some(group.collapsed),
            title: Some(group.title.clone()),
            window_id: Some(group.window_id),
        }
    }
}

#[async_trait]
impl LiveEntity for BrowserTabGroup {
    type Id = TabGroupId;
    type Expected = ExpectedTabGroup;

    const KIND: &'static str = "tab group";

    async fn fetch(browser: &dyn Browser, id: TabGroupId) -> Result<Option<Self>, BrowserError> {
        browser.get_tab_group(id).await
    }

    fn window_id(&self) -> WindowId {
        self.window_id
    }

    fn mismatch(&self, expected: &ExpectedTabGroup) -> Option<&'static str> {
        if differs(&expected.color, &self.color) {
            return Some("color");
        }
        if differs(&expected.collapsed, &self.collapsed) {
            return Some("collapsed");
        }
        if differs(&expected.title, &self.title) {
            return Some("title");
        }
        if differs(&expected.window_id, &self.window_id) {
            return Some("windowId");
        }
        None
    }
}
