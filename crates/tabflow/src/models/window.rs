//! Active window records: the managed-window model kept in the cache and store

use serde::{Deserialize, Serialize};

use super::browser::{BrowserTabGroup, TabGroupColor, TabGroupId, TabId, WindowId};
use super::present;

/// Pair of colors applied while focus mode is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusModeColors {
    pub focused: TabGroupColor,
    pub non_focused: TabGroupColor,
}

impl FocusModeColors {
    /// Color a group should carry given whether it holds the focus target
    pub fn color_for(&self, is_target: bool) -> TabGroupColor {
        if is_target { self.focused } else { self.non_focused }
    }
}

impl Default for FocusModeColors {
    fn default() -> Self {
        Self {
            focused: TabGroupColor::Yellow,
            non_focused: TabGroupColor::Grey,
        }
    }
}

/// Color a group carried before focus mode recolored it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedTabGroupColor {
    pub tab_group_id: TabGroupId,
    pub color: TabGroupColor,
}

/// Focus mode state of an active window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusMode {
    pub colors: FocusModeColors,
    #[serde(default)]
    pub saved_tab_group_colors: Vec<SavedTabGroupColor>,
}

impl FocusMode {
    pub fn new(colors: FocusModeColors, saved_tab_group_colors: Vec<SavedTabGroupColor>) -> Self {
        Self {
            colors,
            saved_tab_group_colors,
        }
    }

    /// Color saved for a group when focus mode was enabled, if any
    pub fn saved_color(&self, id: TabGroupId) -> Option<TabGroupColor> {
        self.saved_tab_group_colors
            .iter()
            .find(|saved| saved.tab_group_id == id)
            .map(|saved| saved.color)
    }
}

/// Tracked state of one tab group in an active window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveWindowTabGroup {
    pub id: TabGroupId,
    pub window_id: WindowId,
    pub color: TabGroupColor,
    pub collapsed: bool,
    #[serde(default)]
    pub title: Option<String>,
    /// The title is derived from a tab rather than set by the user
    #[serde(default)]
    pub use_tab_title: bool,
    #[serde(default)]
    pub last_active_tab_id: Option<TabId>,
    /// Exempt from auto-collapse
    #[serde(default)]
    pub keep_open: bool,
}

impl ActiveWindowTabGroup {
    /// Build a record mirroring a live group.
    ///
    /// A group without a title gets a synthetic one, so it starts with
    /// `use_tab_title` set.
    pub fn from_live(group: &BrowserTabGroup, last_active_tab_id: Option<TabId>) -> Self {
        Self {
            id: group.id,
            window_id: group.window_id,
            color: group.color,
            collapsed: group.collapsed,
            title: group.title.clone(),
            use_tab_title: group.title_text().is_none(),
            last_active_tab_id,
            keep_open: false,
        }
    }
}

/// A browser window under management
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveWindow {
    pub window_id: WindowId,
    #[serde(default)]
    pub focus_mode: Option<FocusMode>,
    #[serde(default)]
    pub tab_groups: Vec<ActiveWindowTabGroup>,
}

impl ActiveWindow {
    pub fn new(window_id: WindowId) -> Self {
        Self {
            window_id,
            focus_mode: None,
            tab_groups: Vec::new(),
        }
    }

    pub fn with_tab_groups(mut self, tab_groups: Vec<ActiveWindowTabGroup>) -> Self {
        self.tab_groups = tab_groups;
        self
    }

    pub fn with_focus_mode(mut self, focus_mode: FocusMode) -> Self {
        self.focus_mode = Some(focus_mode);
        self
    }

    pub fn tab_group(&self, id: TabGroupId) -> Option<&ActiveWindowTabGroup> {
        self.tab_groups.iter().find(|g| g.id == id)
    }

    pub fn tab_group_mut(&mut self, id: TabGroupId) -> Option<&mut ActiveWindowTabGroup> {
        self.tab_groups.iter_mut().find(|g| g.id == id)
    }

    pub fn has_tab_group(&self, id: TabGroupId) -> bool {
        self.tab_group(id).is_some()
    }

    /// Insert a group record, replacing any record with the same id
    pub fn upsert_tab_group(&mut self, group: ActiveWindowTabGroup) {
        match self.tab_group_mut(group.id) {
            Some(existing) => *existing = group,
            None => self.tab_groups.push(group),
        }
    }

    /// Remove a group record along with its saved focus color
    pub fn remove_tab_group(&mut self, id: TabGroupId) -> Option<ActiveWindowTabGroup> {
        if let Some(focus_mode) = self.focus_mode.as_mut() {
            focus_mode.saved_tab_group_colors.retain(|saved| saved.tab_group_id != id);
        }
        let index = self.tab_groups.iter().position(|g| g.id == id)?;
        Some(self.tab_groups.remove(index))
    }

    /// Apply a patch in place: removals, additions, per-group merges, then focus mode
    pub fn apply(&mut self, patch: ActiveWindowPatch) {
        for id in patch.remove_tab_groups {
            self.remove_tab_group(id);
        }
        for group in patch.add_tab_groups {
            self.upsert_tab_group(group);
        }
        for group_patch in patch.tab_groups {
            match self.tab_group_mut(group_patch.id) {
                Some(group) => group_patch.apply_to(group),
                None => log::debug!(
                    "Ignoring patch for untracked tab group {} in window {}",
                    group_patch.id,
                    self.window_id
                ),
            }
        }
        if let Some(focus_mode) = patch.focus_mode {
            self.focus_mode = focus_mode;
        }
    }
}

/// Field-level update of one tracked tab group; unset fields are left alone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabGroupPatch {
    pub id: TabGroupId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<TabGroupColor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapsed: Option<bool>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub title: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_tab_title: Option<bool>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub last_active_tab_id: Option<Option<TabId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_open: Option<bool>,
}

impl TabGroupPatch {
    pub fn new(id: TabGroupId) -> Self {
        Self {
            id,
            color: None,
            collapsed: None,
            title: None,
            use_tab_title: None,
            last_active_tab_id: None,
            keep_open: None,
        }
    }

    /// Patch mirroring the live color/collapsed/title of a group
    pub fn mirror(group: &BrowserTabGroup) -> Self {
        Self::new(group.id)
            .color(group.color)
            .collapsed(group.collapsed)
            .title(group.title.clone())
    }

    pub fn color(mut self, color: TabGroupColor) -> Self {
        self.color = Some(color);
        self
    }

    pub fn collapsed(mut self, collapsed: bool) -> Self {
        self.collapsed = Some(collapsed);
        self
    }

    pub fn title(mut self, title: Option<String>) -> Self {
        self.title = Some(title);
        self
    }

    pub fn use_tab_title(mut self, use_tab_title: bool) -> Self {
        self.use_tab_title = Some(use_tab_title);
        self
    }

    pub fn last_active_tab_id(mut self, tab_id: Option<TabId>) -> Self {
        self.last_active_tab_id = Some(tab_id);
        self
    }

    pub fn keep_open(mut self, keep_open: bool) -> Self {
        self.keep_open = Some(keep_open);
        self
    }

    fn apply_to(self, group: &mut ActiveWindowTabGroup) {
        if let Some(color) = self.color {
            group.color = color;
        }
        if let Some(collapsed) = self.collapsed {
            group.collapsed = collapsed;
        }
        if let Some(title) = self.title {
            group.title = title;
        }
        if let Some(use_tab_title) = self.use_tab_title {
            group.use_tab_title = use_tab_title;
        }
        if let Some(last_active_tab_id) = self.last_active_tab_id {
            group.last_active_tab_id = last_active_tab_id;
        }
        if let Some(keep_open) = self.keep_open {
            group.keep_open = keep_open;
        }
    }
}

/// Update to an active window record, merged by tab group id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveWindowPatch {
    /// `Some(None)` disables focus mode, `Some(Some(..))` replaces it
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub focus_mode: Option<Option<FocusMode>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_tab_groups: Vec<ActiveWindowTabGroup>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_tab_groups: Vec<TabGroupId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tab_groups: Vec<TabGroupPatch>,
}

impl ActiveWindowPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focus_mode(mut self, focus_mode: Option<FocusMode>) -> Self {
        self.focus_mode = Some(focus_mode);
        self
    }

    pub fn add_tab_group(mut self, group: ActiveWindowTabGroup) -> Self {
        self.add_tab_groups.push(group);
        self
    }

    pub fn remove_tab_group(mut self, id: TabGroupId) -> Self {
        self.remove_tab_groups.push(id);
        self
    }

    pub fn tab_group(mut self, patch: TabGroupPatch) -> Self {
        self.tab_groups.push(patch);
        self
    }

    pub fn tab_groups(mut self, patches: impl IntoIterator<Item = TabGroupPatch>) -> Self {
        self.tab_groups.extend(patches);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.focus_mode.is_none()
            && self.add_tab_groups.is_empty()
            && self.remove_tab_groups.is_empty()
            && self.tab_groups.is_empty()
    }

    /// First field only the engine may write: focus mode, new records, and
    /// the color/collapsed state that mirrors the live group
    pub fn engine_owned_field(&self) -> Option<&'static str> {
        if self.focus_mode.is_some() {
            return Some("focusMode");
        }
        if !self.add_tab_groups.is_empty() {
            return Some("addTabGroups");
        }
        self.tab_groups.iter().find_map(|group| {
            if group.color.is_some() {
                Some("color")
            } else if group.collapsed.is_some() {
                Some("collapsed")
            } else {
                None
            }
        })
    }
}
