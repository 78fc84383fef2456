//! Scenario files: a JSON list of user actions replayed against the engine
//!
//! Windows, tabs and groups are referred to by names chosen in the scenario;
//! the simulator maps them to the ids the in-memory browser hands out.

use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tabflow::{
    Browser, Engine, InMemoryBrowser, MoveTarget, Preferences, Request, Response,
    TabGroupColor, TabGroupId, TabGroupUpdate, TabId, WindowId, WindowKind,
};

/// One step of a scenario
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Action {
    OpenWindow {
        name: String,
        #[serde(default = "normal_window")]
        kind: WindowKind,
    },
    FocusWindow {
        window: Option<String>,
    },
    CloseWindow {
        window: String,
    },
    OpenTab {
        name: String,
        window: String,
        title: String,
        #[serde(default)]
        active: bool,
    },
    ActivateTab {
        tab: String,
    },
    SetTabTitle {
        tab: String,
        title: String,
    },
    PinTab {
        tab: String,
        pinned: bool,
    },
    CloseTab {
        tab: String,
    },
    CreateGroup {
        name: String,
        tabs: Vec<String>,
        color: TabGroupColor,
        #[serde(default)]
        title: Option<String>,
    },
    UngroupTab {
        tab: String,
    },
    EditGroup {
        group: String,
        #[serde(flatten)]
        update: TabGroupUpdate,
    },
    /// User drag; engine edits are refused and notifications held until `Release`
    DragTab {
        tab: String,
        #[serde(default)]
        window: Option<String>,
        #[serde(default)]
        index: Option<usize>,
    },
    Release,
    /// Move through the browser API, as another extension would
    MoveTab {
        tab: String,
        #[serde(default)]
        window: Option<String>,
        #[serde(default)]
        index: Option<usize>,
    },
    MoveTabGroup {
        group: String,
        #[serde(default)]
        window: Option<String>,
        #[serde(default)]
        index: Option<usize>,
    },
    ChangeFocusMode {
        window: String,
        enabled: bool,
    },
    KeepTabGroupOpen {
        window: String,
        group: String,
        enabled: bool,
    },
    ActivateWindow {
        window: String,
        enabled: bool,
    },
    SetPreferences {
        preferences: Preferences,
    },
}

fn normal_window() -> WindowKind {
    WindowKind::Normal
}

/// Load a scenario file
pub fn load(path: &Path) -> Result<Vec<Action>> {
    config::load_json_file(path)
}

/// Replays actions against an engine driving an in-memory browser
pub struct Simulator {
    browser: Arc<InMemoryBrowser>,
    engine: Engine,
    windows: HashMap<String, WindowId>,
    tabs: HashMap<String, TabId>,
    groups: HashMap<String, TabGroupId>,
    dragging: bool,
}

impl Simulator {
    pub fn new(browser: Arc<InMemoryBrowser>, engine: Engine) -> Self {
        Self {
            browser,
            engine,
            windows: HashMap::new(),
            tabs: HashMap::new(),
            groups: HashMap::new(),
            dragging: false,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Apply every action, letting the engine catch up after each one
    pub async fn run(&mut self, actions: Vec<Action>) -> Result<()> {
        info!("Replaying {} actions", actions.len());
        for (step, action) in actions.into_iter().enumerate() {
            debug!("Step {}: {:?}", step + 1, action);
            self.apply(action)
                .await
                .with_context(|| format!("Step {} failed", step + 1))?;
            // Edits made mid-drag would only be refused until the operation timed out
            if !self.dragging {
                self.settle().await;
            }
        }
        Ok(())
    }

    /// Dispatch notifications until the browser stops producing them
    async fn settle(&self) {
        loop {
            let events = self.browser.take_events();
            if events.is_empty() || self.engine.is_suspended() {
                return;
            }
            for event in events {
                self.engine.dispatch(event);
            }
            self.engine.wait_idle().await;
        }
    }

    async fn apply(&mut self, action: Action) -> Result<()> {
        let browser = &self.browser;
        match action {
            Action::OpenWindow { name, kind } => {
                let id = browser.open_window(kind);
                self.windows.insert(name, id);
            }
            Action::FocusWindow { window } => {
                let id = window.map(|name| self.window(&name)).transpose()?;
                browser.focus_window(id);
            }
            Action::CloseWindow { window } => browser.close_window(self.window(&window)?),
            Action::OpenTab {
                name,
                window,
                title,
                active,
            } => {
                let id = browser.open_tab(self.window(&window)?, &title, active);
                self.tabs.insert(name, id);
            }
            Action::ActivateTab { tab } => browser.activate_tab(self.tab(&tab)?),
            Action::SetTabTitle { tab, title } => browser.set_tab_title(self.tab(&tab)?, &title),
            Action::PinTab { tab, pinned } => browser.set_tab_pinned(self.tab(&tab)?, pinned),
            Action::CloseTab { tab } => browser.close_tab(self.tab(&tab)?),
            Action::CreateGroup {
                name,
                tabs,
                color,
                title,
            } => {
                let tab_ids = tabs
                    .iter()
                    .map(|tab| self.tab(tab))
                    .collect::<Result<Vec<_>>>()?;
                let id = browser.create_group(&tab_ids, color, title.as_deref())?;
                self.groups.insert(name, id);
            }
            Action::UngroupTab { tab } => browser.ungroup_tab(self.tab(&tab)?),
            Action::EditGroup { group, update } => browser.edit_group(self.group(&group)?, &update),
            Action::DragTab { tab, window, index } => {
                let to = self.move_target(window, index)?;
                browser.set_dragging(true);
                browser.drag_tab(self.tab(&tab)?, &to);
                self.dragging = true;
            }
            Action::Release => {
                browser.set_dragging(false);
                self.dragging = false;
            }
            Action::MoveTab { tab, window, index } => {
                let to = self.move_target(window, index)?;
                browser.move_tab(self.tab(&tab)?, &to).await?;
            }
            Action::MoveTabGroup {
                group,
                window,
                index,
            } => {
                let to = self.move_target(window, index)?;
                browser.move_tab_group(self.group(&group)?, &to).await?;
            }
            Action::ChangeFocusMode { window, enabled } => {
                let window_id = self.window(&window)?;
                self.request(Request::ChangeFocusMode { window_id, enabled })
                    .await?;
            }
            Action::KeepTabGroupOpen {
                window,
                group,
                enabled,
            } => {
                let request = Request::ChangeKeepTabGroupOpen {
                    window_id: self.window(&window)?,
                    tab_group_id: self.group(&group)?,
                    enabled,
                };
                self.request(request).await?;
            }
            Action::ActivateWindow { window, enabled } => {
                let window_id = self.window(&window)?;
                self.request(Request::ChangeActivateCurrentWindow { window_id, enabled })
                    .await?;
            }
            Action::SetPreferences { preferences } => self.engine.set_preferences(preferences),
        }
        Ok(())
    }

    async fn request(&self, request: Request) -> Result<Response> {
        let name = request.name();
        let response = self
            .engine
            .request(request)
            .await
            .with_context(|| format!("{} was rejected", name))?;
        debug!("{} answered {:?}", name, response);
        Ok(response)
    }

    fn move_target(&self, window: Option<String>, index: Option<usize>) -> Result<MoveTarget> {
        Ok(MoveTarget {
            window_id: window.map(|name| self.window(&name)).transpose()?,
            index,
        })
    }

    fn window(&self, name: &str) -> Result<WindowId> {
        self.windows
            .get(name)
            .copied()
            .ok_or_else(|| anyhow!("Unknown window '{}'", name))
    }

    fn tab(&self, name: &str) -> Result<TabId> {
        self.tabs
            .get(name)
            .copied()
            .ok_or_else(|| anyhow!("Unknown tab '{}'", name))
    }

    fn group(&self, name: &str) -> Result<TabGroupId> {
        self.groups
            .get(name)
            .copied()
            .ok_or_else(|| anyhow!("Unknown tab group '{}'", name))
    }
}
