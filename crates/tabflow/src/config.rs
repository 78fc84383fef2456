//! User preferences and engine settings
//!
//! Both are plain JSON files in the tabflow config directory:
//! - `preferences.json`: the toggles the options page edits
//! - `engine.json`: timing knobs for the queue, retries and animations
//!
//! Every field is defaulted, so a missing file or a partial file is fine.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::FocusModeColors;

/// Preferences filename in the tabflow config directory
pub const PREFERENCES_FILE: &str = "preferences.json";

/// Engine settings filename in the tabflow config directory
pub const ENGINE_SETTINGS_FILE: &str = "engine.json";

/// User-facing toggles read by handlers at execution time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    /// Collapse every tab group except the one holding the active tab
    pub collapse_unfocused_tab_groups: bool,
    /// Put ungrouped tabs into a group automatically
    pub always_group_tabs: bool,
    /// Activate normal windows as soon as they are created
    pub auto_activate_new_windows: bool,
    /// Colors used when focus mode gets enabled
    pub focus_mode_colors: FocusModeColors,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            collapse_unfocused_tab_groups: true,
            always_group_tabs: false,
            auto_activate_new_windows: true,
            focus_mode_colors: FocusModeColors::default(),
        }
    }
}

impl Preferences {
    /// Load preferences from the config directory, falling back to defaults
    pub fn load() -> Result<Self> {
        config::load_json_or_default(PREFERENCES_FILE)
    }

    /// Persist preferences to the config directory
    pub fn save(&self) -> Result<()> {
        config::save_json(PREFERENCES_FILE, self)
    }

    /// Boolean preferences that differ between `self` and `next`
    pub fn toggled(&self, next: &Preferences) -> Vec<PreferenceToggle> {
        let mut toggles = Vec::new();
        if self.collapse_unfocused_tab_groups != next.collapse_unfocused_tab_groups {
            toggles.push(PreferenceToggle::CollapseUnfocusedTabGroups(
                next.collapse_unfocused_tab_groups,
            ));
        }
        if self.always_group_tabs != next.always_group_tabs {
            toggles.push(PreferenceToggle::AlwaysGroupTabs(next.always_group_tabs));
        }
        if self.auto_activate_new_windows != next.auto_activate_new_windows {
            toggles.push(PreferenceToggle::AutoActivateNewWindows(
                next.auto_activate_new_windows,
            ));
        }
        toggles
    }
}

/// A boolean preference that changed, with its new value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferenceToggle {
    CollapseUnfocusedTabGroups(bool),
    AlwaysGroupTabs(bool),
    AutoActivateNewWindows(bool),
}

/// Timing settings for the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Wall-clock bound for a single queued operation
    pub operation_timeout_ms: u64,
    /// Delay between attempts when the browser refuses an edit
    pub retry_delay_ms: u64,
    /// Pause that lets group expand/collapse animations finish
    pub settle_delay_ms: u64,
    /// SQLite database filename in the config directory
    pub db_file: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            operation_timeout_ms: 7_500,
            retry_delay_ms: 100,
            settle_delay_ms: 300,
            db_file: "tabflow.sqlite".to_string(),
        }
    }
}

impl EngineSettings {
    /// Load settings from the config directory, falling back to defaults
    pub fn load() -> Result<Self> {
        config::load_json_or_default(ENGINE_SETTINGS_FILE)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}
