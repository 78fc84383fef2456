//! Window/tab service boundary
//!
//! This module provides:
//! - The [`Browser`] trait the engine drives (queries and edits)
//! - Query and update property types
//! - [`BrowserEvent`], the change notifications the engine consumes
//! - [`InMemoryBrowser`], a simulated browser for tests and the simulator

mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BrowserError;
use crate::models::{
    BrowserTab, BrowserTabGroup, BrowserWindow, TabGroupColor, TabGroupId, TabId, WindowId,
    WindowKind, present,
};

pub use memory::{InMemoryBrowser, Mutation};

/// Live window/tab/tab-group environment.
///
/// Edits may fail with [`BrowserError::Busy`] while the user is mid-gesture;
/// callers go through [`crate::retry::RetryHandler`] for those.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn query_windows(&self, query: &WindowQuery) -> Result<Vec<BrowserWindow>, BrowserError>;

    async fn query_tabs(&self, query: &TabQuery) -> Result<Vec<BrowserTab>, BrowserError>;

    async fn query_tab_groups(
        &self,
        query: &TabGroupQuery,
    ) -> Result<Vec<BrowserTabGroup>, BrowserError>;

    async fn get_window(&self, id: WindowId) -> Result<Option<BrowserWindow>, BrowserError>;

    async fn get_tab(&self, id: TabId) -> Result<Option<BrowserTab>, BrowserError>;

    async fn get_tab_group(&self, id: TabGroupId) -> Result<Option<BrowserTabGroup>, BrowserError>;

    async fn update_tab(&self, id: TabId, update: &TabUpdate) -> Result<BrowserTab, BrowserError>;

    async fn update_tab_group(
        &self,
        id: TabGroupId,
        update: &TabGroupUpdate,
    ) -> Result<BrowserTabGroup, BrowserError>;

    async fn move_tab(&self, id: TabId, to: &MoveTarget) -> Result<BrowserTab, BrowserError>;

    async fn move_tab_group(
        &self,
        id: TabGroupId,
        to: &MoveTarget,
    ) -> Result<BrowserTabGroup, BrowserError>;

    /// Put tabs into a group, creating one when the target is [`GroupTarget::New`]
    async fn group_tabs(
        &self,
        tab_ids: &[TabId],
        target: &GroupTarget,
    ) -> Result<TabGroupId, BrowserError>;
}

/// Filter for [`Browser::query_windows`]; unset fields match anything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowQuery {
    pub kind: Option<WindowKind>,
    pub focused: Option<bool>,
}

impl WindowQuery {
    pub fn matches(&self, window: &BrowserWindow) -> bool {
        self.kind.is_none_or(|kind| window.kind == kind)
            && self.focused.is_none_or(|focused| window.focused == focused)
    }
}

/// Filter for [`Browser::query_tabs`]; unset fields match anything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabQuery {
    pub window_id: Option<WindowId>,
    pub active: Option<bool>,
    pub pinned: Option<bool>,
    /// `Some(None)` matches ungrouped tabs only
    pub group_id: Option<Option<TabGroupId>>,
}

impl TabQuery {
    pub fn in_window(window_id: WindowId) -> Self {
        Self {
            window_id: Some(window_id),
            ..Self::default()
        }
    }

    /// The active tab of a window
    pub fn active_in(window_id: WindowId) -> Self {
        Self {
            window_id: Some(window_id),
            active: Some(true),
            ..Self::default()
        }
    }

    pub fn in_group(group_id: TabGroupId) -> Self {
        Self {
            group_id: Some(Some(group_id)),
            ..Self::default()
        }
    }

    pub fn matches(&self, tab: &BrowserTab) -> bool {
        self.window_id.is_none_or(|id| tab.window_id == id)
            && self.active.is_none_or(|active| tab.active == active)
            && self.pinned.is_none_or(|pinned| tab.pinned == pinned)
            && self.group_id.is_none_or(|group_id| tab.group_id == group_id)
    }
}

/// Filter for [`Browser::query_tab_groups`]; unset fields match anything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabGroupQuery {
    pub window_id: Option<WindowId>,
    pub collapsed: Option<bool>,
    pub color: Option<TabGroupColor>,
}

impl TabGroupQuery {
    pub fn in_window(window_id: WindowId) -> Self {
        Self {
            window_id: Some(window_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, group: &BrowserTabGroup) -> bool {
        self.window_id.is_none_or(|id| group.window_id == id)
            && self.collapsed.is_none_or(|collapsed| group.collapsed == collapsed)
            && self.color.is_none_or(|color| group.color == color)
    }
}

/// Properties to change on a tab group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabGroupUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<TabGroupColor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapsed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl TabGroupUpdate {
    pub fn is_empty(&self) -> bool {
        self.color.is_none() && self.collapsed.is_none() && self.title.is_none()
    }
}

/// Properties to change on a tab
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
}

impl TabUpdate {
    pub fn activate() -> Self {
        Self {
            active: Some(true),
            ..Self::default()
        }
    }
}

/// Destination of a tab or tab group move
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveTarget {
    /// Window to move into; `None` keeps the current window
    #[serde(default)]
    pub window_id: Option<WindowId>,
    /// Index in the tab strip; `None` appends at the end
    #[serde(default)]
    pub index: Option<usize>,
}

/// Which group [`Browser::group_tabs`] adds tabs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GroupTarget {
    /// A new group in the given window (or the first tab's window)
    New { window_id: Option<WindowId> },
    Existing { tab_group_id: TabGroupId },
}

/// Fields of a tab that changed since the previous notification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    /// `Some(None)` means the tab left its group
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Option<TabGroupId>>,
}

/// Change notifications from the browser.
///
/// They arrive asynchronously and are not ordered relative to when the change
/// happened, so payloads are hints to be re-validated, never facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BrowserEvent {
    WindowCreated {
        window: BrowserWindow,
    },
    WindowRemoved {
        window_id: WindowId,
    },
    /// `None` when no browser window has focus
    WindowFocusChanged {
        window_id: Option<WindowId>,
    },
    TabGroupCreated {
        group: BrowserTabGroup,
    },
    TabGroupRemoved {
        group: BrowserTabGroup,
    },
    TabGroupUpdated {
        group: BrowserTabGroup,
    },
    TabCreated {
        tab: BrowserTab,
    },
    TabActivated {
        tab_id: TabId,
        window_id: WindowId,
    },
    TabUpdated {
        tab_id: TabId,
        change: TabChange,
    },
    TabAttached {
        tab_id: TabId,
        new_window_id: WindowId,
        new_position: usize,
    },
    TabDetached {
        tab_id: TabId,
        old_window_id: WindowId,
        old_position: usize,
    },
    TabRemoved {
        tab_id: TabId,
        window_id: WindowId,
        is_window_closing: bool,
    },
}

impl BrowserEvent {
    /// Event name used for queue entries and logs
    pub fn name(&self) -> &'static str {
        match self {
            BrowserEvent::WindowCreated { .. } => "windowCreated",
            BrowserEvent::WindowRemoved { .. } => "windowRemoved",
            BrowserEvent::WindowFocusChanged { .. } => "windowFocusChanged",
            BrowserEvent::TabGroupCreated { .. } => "tabGroupCreated",
            BrowserEvent::TabGroupRemoved { .. } => "tabGroupRemoved",
            BrowserEvent::TabGroupUpdated { .. } => "tabGroupUpdated",
            BrowserEvent::TabCreated { .. } => "tabCreated",
            BrowserEvent::TabActivated { .. } => "tabActivated",
            BrowserEvent::TabUpdated { .. } => "tabUpdated",
            BrowserEvent::TabAttached { .. } => "tabAttached",
            BrowserEvent::TabDetached { .. } => "tabDetached",
            BrowserEvent::TabRemoved { .. } => "tabRemoved",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tab(id: i64, group: Option<i64>, active: bool) -> BrowserTab {
        BrowserTab {
            id: TabId::new(id),
            window_id: WindowId::new(1),
            index: id as usize,
            active,
            pinned: false,
            group_id: group.map(TabGroupId::new),
            title: None,
            url: None,
        }
    }

    #[test]
    fn test_tab_query_ungrouped_filter() {
        let query = TabQuery {
            group_id: Some(None),
            ..TabQuery::default()
        };
        assert!(query.matches(&tab(1, None, false)));
        assert!(!query.matches(&tab(2, Some(5), false)));
        assert!(TabQuery::default().matches(&tab(2, Some(5), false)));
    }

    #[test]
    fn test_active_in_query() {
        let query = TabQuery::active_in(WindowId::new(1));
        assert!(query.matches(&tab(1, None, true)));
        assert!(!query.matches(&tab(2, None, false)));
    }

    #[test]
    fn test_event_wire_format() {
        let event = BrowserEvent::TabActivated {
            tab_id: TabId::new(3),
            window_id: WindowId::new(1),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tabActivated");
        assert_eq!(json["tabId"], 3);
        assert_eq!(event.name(), "tabActivated");
    }

    #[test]
    fn test_tab_change_distinguishes_ungrouped() {
        let change: TabChange = serde_json::from_str(r#"{ "groupId": null }"#).unwrap();
        assert_eq!(change.group_id, Some(None));

        let change: TabChange = serde_json::from_str(r#"{ "title": "Docs" }"#).unwrap();
        assert_eq!(change.group_id, None);
        assert_eq!(change.title.as_deref(), Some("Docs"));
    }
}
