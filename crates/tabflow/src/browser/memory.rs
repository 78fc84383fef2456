//! In-memory browser simulation
//!
//! Models windows, tabs and tab groups closely enough to drive the engine in
//! tests and in the `tabsim` binary:
//! - user actions (`open_tab`, `activate_tab`, `edit_group`, ...) mutate state
//!   directly and queue the notifications a real browser would send
//! - engine edits go through the [`Browser`] trait, can be refused while a
//!   drag is in progress, and are recorded as [`Mutation`]s
//!
//! Notifications are not delivered anywhere on their own; callers drain them
//! with [`InMemoryBrowser::take_events`] and decide when to dispatch them,
//! which is how tests reproduce out-of-order delivery.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{
    Browser, BrowserEvent, GroupTarget, MoveTarget, TabChange, TabGroupQuery, TabGroupUpdate,
    TabQuery, TabUpdate, WindowQuery,
};
use crate::error::BrowserError;
use crate::models::{
    BrowserTab, BrowserTabGroup, BrowserWindow, TabGroupColor, TabGroupId, TabId, WindowId,
    WindowKind,
};

/// An edit the engine made through the [`Browser`] trait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    UpdateTab { id: TabId, update: TabUpdate },
    UpdateTabGroup { id: TabGroupId, update: TabGroupUpdate },
    MoveTab { id: TabId, to: MoveTarget },
    MoveTabGroup { id: TabGroupId, to: MoveTarget },
    GroupTabs { tab_ids: Vec<TabId>, target: GroupTarget },
}

#[derive(Default)]
struct BrowserState {
    windows: BTreeMap<WindowId, BrowserWindow>,
    tabs: BTreeMap<TabId, BrowserTab>,
    groups: BTreeMap<TabGroupId, BrowserTabGroup>,
    next_id: i64,
    next_color: usize,
    dragging: bool,
    refusals: usize,
    events: Vec<BrowserEvent>,
    mutations: Vec<Mutation>,
}

impl BrowserState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Gate for engine edits: refused while dragging or while refusals are queued
    fn check_editable(&mut self) -> Result<(), BrowserError> {
        if self.dragging {
            return Err(BrowserError::Busy);
        }
        if self.refusals > 0 {
            self.refusals -= 1;
            return Err(BrowserError::Busy);
        }
        Ok(())
    }

    fn emit(&mut self, event: BrowserEvent) {
        self.events.push(event);
    }

    fn window_tabs(&self, window_id: WindowId) -> Vec<TabId> {
        let mut tabs: Vec<&BrowserTab> = self
            .tabs
            .values()
            .filter(|t| t.window_id == window_id)
            .collect();
        tabs.sort_by_key(|t| t.index);
        tabs.into_iter().map(|t| t.id).collect()
    }

    fn reindex(&mut self, window_id: WindowId, order: &[TabId]) {
        for (index, id) in order.iter().enumerate() {
            if let Some(tab) = self.tabs.get_mut(id) {
                tab.index = index;
            }
        }
        log::trace!("Reindexed {} tabs in window {}", order.len(), window_id);
    }

    fn tab(&self, id: TabId) -> Result<&BrowserTab, BrowserError> {
        self.tabs.get(&id).ok_or(BrowserError::NotFound {
            kind: "tab",
            id: id.get(),
        })
    }

    fn group(&self, id: TabGroupId) -> Result<&BrowserTabGroup, BrowserError> {
        self.groups.get(&id).ok_or(BrowserError::NotFound {
            kind: "tab group",
            id: id.get(),
        })
    }

    fn window(&self, id: WindowId) -> Result<&BrowserWindow, BrowserError> {
        self.windows.get(&id).ok_or(BrowserError::NotFound {
            kind: "window",
            id: id.get(),
        })
    }

    fn next_group_color(&mut self) -> TabGroupColor {
        let color = TabGroupColor::ALL[self.next_color % TabGroupColor::ALL.len()];
        self.next_color += 1;
        color
    }

    fn activate(&mut self, id: TabId) -> Result<BrowserTab, BrowserError> {
        let tab = self.tab(id)?.clone();
        if tab.active {
            return Ok(tab);
        }
        for other in self.tabs.values_mut() {
            if other.window_id == tab.window_id {
                other.active = other.id == id;
            }
        }
        // The browser expands a collapsed group when one of its tabs is activated
        if let Some(group_id) = tab.group_id {
            if let Some(group) = self.groups.get_mut(&group_id) {
                if group.collapsed {
                    group.collapsed = false;
                    let group = group.clone();
                    self.emit(BrowserEvent::TabGroupUpdated { group });
                }
            }
        }
        self.emit(BrowserEvent::TabActivated {
            tab_id: id,
            window_id: tab.window_id,
        });
        Ok(self.tab(id)?.clone())
    }

    fn update_group(
        &mut self,
        id: TabGroupId,
        update: &TabGroupUpdate,
    ) -> Result<BrowserTabGroup, BrowserError> {
        let group = self.groups.get_mut(&id).ok_or(BrowserError::NotFound {
            kind: "tab group",
            id: id.get(),
        })?;
        let before = group.clone();
        if let Some(color) = update.color {
            group.color = color;
        }
        if let Some(collapsed) = update.collapsed {
            group.collapsed = collapsed;
        }
        if let Some(title) = &update.title {
            group.title = Some(title.clone());
        }
        let after = group.clone();
        if after != before {
            self.emit(BrowserEvent::TabGroupUpdated {
                group: after.clone(),
            });
        }
        Ok(after)
    }

    /// Move `tab_id` to `index` within `window_id`, detaching/attaching across windows
    fn place_tab(&mut self, tab_id: TabId, window_id: WindowId, index: Option<usize>) {
        let Some(tab) = self.tabs.get(&tab_id).cloned() else {
            return;
        };
        if tab.window_id != window_id {
            let mut old_order = self.window_tabs(tab.window_id);
            old_order.retain(|id| *id != tab_id);
            self.reindex(tab.window_id, &old_order);
            self.emit(BrowserEvent::TabDetached {
                tab_id,
                old_window_id: tab.window_id,
                old_position: tab.index,
            });
            if tab.active {
                if let Some(next) = old_order.first().copied() {
                    let _ = self.activate(next);
                }
            }
            if let Some(moved) = self.tabs.get_mut(&tab_id) {
                moved.window_id = window_id;
                moved.active = false;
            }
        }
        let mut order = self.window_tabs(window_id);
        order.retain(|id| *id != tab_id);
        let position = index.unwrap_or(order.len()).min(order.len());
        order.insert(position, tab_id);
        self.reindex(window_id, &order);
        if tab.window_id != window_id {
            self.emit(BrowserEvent::TabAttached {
                tab_id,
                new_window_id: window_id,
                new_position: position,
            });
        }
    }

    fn set_tab_group(&mut self, tab_id: TabId, group_id: Option<TabGroupId>) {
        let Some(tab) = self.tabs.get_mut(&tab_id) else {
            return;
        };
        if tab.group_id == group_id {
            return;
        }
        let previous = tab.group_id;
        tab.group_id = group_id;
        self.emit(BrowserEvent::TabUpdated {
            tab_id,
            change: TabChange {
                group_id: Some(group_id),
                ..TabChange::default()
            },
        });
        if let Some(previous) = previous {
            self.remove_group_if_empty(previous);
        }
    }

    fn remove_group_if_empty(&mut self, group_id: TabGroupId) {
        let empty = !self.tabs.values().any(|t| t.group_id == Some(group_id));
        if empty {
            if let Some(group) = self.groups.remove(&group_id) {
                self.emit(BrowserEvent::TabGroupRemoved { group });
            }
        }
    }

    fn group_tabs(
        &mut self,
        tab_ids: &[TabId],
        target: &GroupTarget,
    ) -> Result<TabGroupId, BrowserError> {
        let first = *tab_ids
            .first()
            .ok_or_else(|| BrowserError::Rejected("no tabs to group".to_string()))?;
        for id in tab_ids {
            self.tab(*id)?;
        }
        let group_id = match *target {
            GroupTarget::Existing { tab_group_id } => {
                let group = self.group(tab_group_id)?.clone();
                for id in tab_ids {
                    let order = self.window_tabs(group.window_id);
                    let last_in_group = order
                        .iter()
                        .rposition(|t| self.tabs[t].group_id == Some(tab_group_id));
                    let index = last_in_group.map(|i| i + 1);
                    self.place_tab(*id, group.window_id, index);
                }
                tab_group_id
            }
            GroupTarget::New { window_id } => {
                let window_id = match window_id {
                    Some(id) => self.window(id)?.id,
                    None => self.tab(first)?.window_id,
                };
                let id = TabGroupId::new(self.allocate_id());
                let group = BrowserTabGroup {
                    id,
                    window_id,
                    color: self.next_group_color(),
                    collapsed: false,
                    title: None,
                };
                self.groups.insert(id, group.clone());
                self.emit(BrowserEvent::TabGroupCreated { group });
                for tab_id in tab_ids {
                    if self.tabs[tab_id].window_id != window_id {
                        self.place_tab(*tab_id, window_id, None);
                    }
                }
                id
            }
        };
        for id in tab_ids {
            self.set_tab_group(*id, Some(group_id));
        }
        Ok(group_id)
    }
}

/// Simulated browser keeping all state in memory
pub struct InMemoryBrowser {
    state: Mutex<BrowserState>,
}

impl InMemoryBrowser {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BrowserState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, BrowserState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // === User actions ===

    /// Open a window; the first window opened gets focus
    pub fn open_window(&self, kind: WindowKind) -> WindowId {
        let mut state = self.state();
        let id = WindowId::new(state.allocate_id());
        let window = BrowserWindow {
            id,
            focused: state.windows.is_empty(),
            kind,
        };
        state.windows.insert(id, window.clone());
        state.emit(BrowserEvent::WindowCreated { window });
        id
    }

    pub fn focus_window(&self, window_id: Option<WindowId>) {
        let mut state = self.state();
        for window in state.windows.values_mut() {
            window.focused = Some(window.id) == window_id;
        }
        state.emit(BrowserEvent::WindowFocusChanged { window_id });
    }

    /// Close a window and everything in it
    pub fn close_window(&self, window_id: WindowId) {
        let mut state = self.state();
        for tab_id in state.window_tabs(window_id) {
            state.tabs.remove(&tab_id);
            state.emit(BrowserEvent::TabRemoved {
                tab_id,
                window_id,
                is_window_closing: true,
            });
        }
        let groups: Vec<TabGroupId> = state
            .groups
            .values()
            .filter(|g| g.window_id == window_id)
            .map(|g| g.id)
            .collect();
        for id in groups {
            if let Some(group) = state.groups.remove(&id) {
                state.emit(BrowserEvent::TabGroupRemoved { group });
            }
        }
        if state.windows.remove(&window_id).is_some() {
            state.emit(BrowserEvent::WindowRemoved { window_id });
        }
    }

    /// Open a tab at the end of a window's tab strip
    pub fn open_tab(&self, window_id: WindowId, title: &str, active: bool) -> TabId {
        let mut state = self.state();
        let id = TabId::new(state.allocate_id());
        let index = state.window_tabs(window_id).len();
        let tab = BrowserTab {
            id,
            window_id,
            index,
            active: false,
            pinned: false,
            group_id: None,
            title: Some(title.to_string()),
            url: None,
        };
        state.tabs.insert(id, tab.clone());
        state.emit(BrowserEvent::TabCreated { tab });
        if active {
            let _ = state.activate(id);
        }
        id
    }

    pub fn activate_tab(&self, tab_id: TabId) {
        let _ = self.state().activate(tab_id);
    }

    pub fn set_tab_title(&self, tab_id: TabId, title: &str) {
        let mut state = self.state();
        if let Some(tab) = state.tabs.get_mut(&tab_id) {
            tab.title = Some(title.to_string());
            state.emit(BrowserEvent::TabUpdated {
                tab_id,
                change: TabChange {
                    title: Some(title.to_string()),
                    ..TabChange::default()
                },
            });
        }
    }

    pub fn set_tab_pinned(&self, tab_id: TabId, pinned: bool) {
        let mut state = self.state();
        if let Some(tab) = state.tabs.get_mut(&tab_id) {
            tab.pinned = pinned;
            state.emit(BrowserEvent::TabUpdated {
                tab_id,
                change: TabChange {
                    pinned: Some(pinned),
                    ..TabChange::default()
                },
            });
        }
    }

    /// Close a tab; an active tab hands activation to its neighbour
    pub fn close_tab(&self, tab_id: TabId) {
        let mut state = self.state();
        let Some(tab) = state.tabs.remove(&tab_id) else {
            return;
        };
        let order = state.window_tabs(tab.window_id);
        state.reindex(tab.window_id, &order);
        state.emit(BrowserEvent::TabRemoved {
            tab_id,
            window_id: tab.window_id,
            is_window_closing: false,
        });
        if tab.active {
            let neighbour = order.get(tab.index.min(order.len().saturating_sub(1))).copied();
            if let Some(next) = neighbour {
                let _ = state.activate(next);
            }
        }
        if let Some(group_id) = tab.group_id {
            state.remove_group_if_empty(group_id);
        }
    }

    /// Group tabs as the user would from the tab strip
    pub fn create_group(
        &self,
        tab_ids: &[TabId],
        color: TabGroupColor,
        title: Option<&str>,
    ) -> Result<TabGroupId, BrowserError> {
        let mut state = self.state();
        let first = *tab_ids
            .first()
            .ok_or_else(|| BrowserError::Rejected("no tabs to group".to_string()))?;
        let window_id = state.tab(first)?.window_id;
        let id = TabGroupId::new(state.allocate_id());
        let group = BrowserTabGroup {
            id,
            window_id,
            color,
            collapsed: false,
            title: title.map(str::to_string),
        };
        state.groups.insert(id, group.clone());
        state.emit(BrowserEvent::TabGroupCreated { group });
        for tab_id in tab_ids {
            state.set_tab_group(*tab_id, Some(id));
        }
        Ok(id)
    }

    /// Ungroup a tab as the user would
    pub fn ungroup_tab(&self, tab_id: TabId) {
        self.state().set_tab_group(tab_id, None);
    }

    /// Edit a group as the user would (recolor, rename, expand/collapse)
    pub fn edit_group(&self, id: TabGroupId, update: &TabGroupUpdate) {
        let _ = self.state().update_group(id, update);
    }

    /// Drag a tab to another position or window
    pub fn drag_tab(&self, tab_id: TabId, to: &MoveTarget) {
        let mut state = self.state();
        let Some(window_id) = to.window_id.or_else(|| state.tabs.get(&tab_id).map(|t| t.window_id)) else {
            return;
        };
        state.place_tab(tab_id, window_id, to.index);
    }

    // === Gesture simulation ===

    /// While dragging, every engine edit is refused with [`BrowserError::Busy`]
    pub fn set_dragging(&self, dragging: bool) {
        self.state().dragging = dragging;
    }

    /// Refuse the next `count` engine edits with [`BrowserError::Busy`]
    pub fn refuse_next_edits(&self, count: usize) {
        self.state().refusals = count;
    }

    // === Inspection ===

    /// Drain notifications queued since the last call
    pub fn take_events(&self) -> Vec<BrowserEvent> {
        std::mem::take(&mut self.state().events)
    }

    /// Edits made through the [`Browser`] trait so far
    pub fn mutations(&self) -> Vec<Mutation> {
        self.state().mutations.clone()
    }

    pub fn clear_mutations(&self) {
        self.state().mutations.clear();
    }

    pub fn tab(&self, id: TabId) -> Option<BrowserTab> {
        self.state().tabs.get(&id).cloned()
    }

    pub fn tab_group(&self, id: TabGroupId) -> Option<BrowserTabGroup> {
        self.state().groups.get(&id).cloned()
    }
}

impl Default for InMemoryBrowser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Browser for InMemoryBrowser {
    async fn query_windows(&self, query: &WindowQuery) -> Result<Vec<BrowserWindow>, BrowserError> {
        Ok(self
            .state()
            .windows
            .values()
            .filter(|w| query.matches(w))
            .cloned()
            .collect())
    }

    async fn query_tabs(&self, query: &TabQuery) -> Result<Vec<BrowserTab>, BrowserError> {
        let mut tabs: Vec<BrowserTab> = self
            .state()
            .tabs
            .values()
            .filter(|t| query.matches(t))
            .cloned()
            .collect();
        tabs.sort_by_key(|t| (t.window_id, t.index));
        Ok(tabs)
    }

    async fn query_tab_groups(
        &self,
        query: &TabGroupQuery,
    ) -> Result<Vec<BrowserTabGroup>, BrowserError> {
        Ok(self
            .state()
            .groups
            .values()
            .filter(|g| query.matches(g))
            .cloned()
            .collect())
    }

    async fn get_window(&self, id: WindowId) -> Result<Option<BrowserWindow>, BrowserError> {
        Ok(self.state().windows.get(&id).cloned())
    }

    async fn get_tab(&self, id: TabId) -> Result<Option<BrowserTab>, BrowserError> {
        Ok(self.state().tabs.get(&id).cloned())
    }

    async fn get_tab_group(&self, id: TabGroupId) -> Result<Option<BrowserTabGroup>, BrowserError> {
        Ok(self.state().groups.get(&id).cloned())
    }

    async fn update_tab(&self, id: TabId, update: &TabUpdate) -> Result<BrowserTab, BrowserError> {
        let mut state = self.state();
        state.check_editable()?;
        state.tab(id)?;
        if let Some(pinned) = update.pinned {
            if let Some(tab) = state.tabs.get_mut(&id) {
                tab.pinned = pinned;
            }
            state.emit(BrowserEvent::TabUpdated {
                tab_id: id,
                change: TabChange {
                    pinned: Some(pinned),
                    ..TabChange::default()
                },
            });
        }
        if update.active == Some(true) {
            state.activate(id)?;
        }
        state.mutations.push(Mutation::UpdateTab {
            id,
            update: update.clone(),
        });
        Ok(state.tab(id)?.clone())
    }

    async fn update_tab_group(
        &self,
        id: TabGroupId,
        update: &TabGroupUpdate,
    ) -> Result<BrowserTabGroup, BrowserError> {
        let mut state = self.state();
        state.check_editable()?;
        let group = state.update_group(id, update)?;
        state.mutations.push(Mutation::UpdateTabGroup {
            id,
            update: update.clone(),
        });
        Ok(group)
    }

    async fn move_tab(&self, id: TabId, to: &MoveTarget) -> Result<BrowserTab, BrowserError> {
        let mut state = self.state();
        state.check_editable()?;
        let tab = state.tab(id)?.clone();
        let window_id = match to.window_id {
            Some(window_id) => state.window(window_id)?.id,
            None => tab.window_id,
        };
        state.place_tab(id, window_id, to.index);
        state.mutations.push(Mutation::MoveTab { id, to: to.clone() });
        Ok(state.tab(id)?.clone())
    }

    async fn move_tab_group(
        &self,
        id: TabGroupId,
        to: &MoveTarget,
    ) -> Result<BrowserTabGroup, BrowserError> {
        let mut state = self.state();
        state.check_editable()?;
        let group = state.group(id)?.clone();
        let window_id = match to.window_id {
            Some(window_id) => state.window(window_id)?.id,
            None => group.window_id,
        };
        let members: Vec<TabId> = state
            .window_tabs(group.window_id)
            .into_iter()
            .filter(|t| state.tabs[t].group_id == Some(id))
            .collect();
        for (offset, tab_id) in members.iter().enumerate() {
            state.place_tab(*tab_id, window_id, to.index.map(|i| i + offset));
        }
        if window_id != group.window_id {
            // The browser reports a cross-window group move as remove + create
            let mut moved = group.clone();
            moved.window_id = window_id;
            state.groups.insert(id, moved.clone());
            state.emit(BrowserEvent::TabGroupRemoved { group });
            state.emit(BrowserEvent::TabGroupCreated { group: moved });
        }
        state.mutations.push(Mutation::MoveTabGroup { id, to: to.clone() });
        Ok(state.group(id)?.clone())
    }

    async fn group_tabs(
        &self,
        tab_ids: &[TabId],
        target: &GroupTarget,
    ) -> Result<TabGroupId, BrowserError> {
        let mut state = self.state();
        state.check_editable()?;
        let group_id = state.group_tabs(tab_ids, target)?;
        state.mutations.push(Mutation::GroupTabs {
            tab_ids: tab_ids.to_vec(),
            target: *target,
        });
        Ok(group_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_tab_emits_created_and_activated() {
        let browser = InMemoryBrowser::new();
        let window = browser.open_window(WindowKind::Normal);
        let tab = browser.open_tab(window, "Docs", true);

        let events = browser.take_events();
        let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["windowCreated", "tabCreated", "tabActivated"]);

        let active = browser.query_tabs(&TabQuery::active_in(window)).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, tab);
        assert!(browser.take_events().is_empty());
    }

    #[tokio::test]
    async fn test_dragging_refuses_edits_but_not_user_actions() {
        let browser = InMemoryBrowser::new();
        let window = browser.open_window(WindowKind::Normal);
        let tab = browser.open_tab(window, "One", true);
        let group = browser.create_group(&[tab], TabGroupColor::Red, None).unwrap();

        browser.set_dragging(true);
        let result = browser
            .update_tab_group(
                group,
                &TabGroupUpdate {
                    collapsed: Some(true),
                    ..TabGroupUpdate::default()
                },
            )
            .await;
        assert_eq!(result, Err(BrowserError::Busy));
        assert!(browser.mutations().is_empty());

        browser.edit_group(
            group,
            &TabGroupUpdate {
                color: Some(TabGroupColor::Blue),
                ..TabGroupUpdate::default()
            },
        );
        assert_eq!(browser.tab_group(group).unwrap().color, TabGroupColor::Blue);
    }

    #[tokio::test]
    async fn test_refusal_budget_is_consumed() {
        let browser = InMemoryBrowser::new();
        let window = browser.open_window(WindowKind::Normal);
        let tab = browser.open_tab(window, "One", true);
        browser.refuse_next_edits(2);

        let target = GroupTarget::New { window_id: None };
        assert!(browser.group_tabs(&[tab], &target).await.is_err());
        assert!(browser.group_tabs(&[tab], &target).await.is_err());
        let group = browser.group_tabs(&[tab], &target).await.unwrap();
        assert_eq!(browser.tab(tab).unwrap().group_id, Some(group));
        assert_eq!(browser.mutations().len(), 1);
    }

    #[tokio::test]
    async fn test_activating_tab_expands_its_group() {
        let browser = InMemoryBrowser::new();
        let window = browser.open_window(WindowKind::Normal);
        let first = browser.open_tab(window, "One", true);
        let second = browser.open_tab(window, "Two", false);
        let group = browser.create_group(&[second], TabGroupColor::Green, Some("Work")).unwrap();
        browser.edit_group(
            group,
            &TabGroupUpdate {
                collapsed: Some(true),
                ..TabGroupUpdate::default()
            },
        );
        browser.take_events();

        browser.activate_tab(second);
        assert!(!browser.tab_group(group).unwrap().collapsed);
        assert!(!browser.tab(first).unwrap().active);
        let names: Vec<&str> = browser.take_events().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["tabGroupUpdated", "tabActivated"]);
    }

    #[tokio::test]
    async fn test_closing_last_tab_removes_group() {
        let browser = InMemoryBrowser::new();
        let window = browser.open_window(WindowKind::Normal);
        let first = browser.open_tab(window, "One", true);
        let second = browser.open_tab(window, "Two", false);
        let group = browser.create_group(&[second], TabGroupColor::Green, None).unwrap();
        browser.take_events();

        browser.close_tab(second);
        assert!(browser.tab_group(group).is_none());
        assert!(browser.tab(first).unwrap().active);
        let names: Vec<&str> = browser.take_events().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["tabRemoved", "tabGroupRemoved"]);
    }
}
