//! Requests from the options/popup UI

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::browser::TabGroupUpdate;
use crate::engine::EngineContext;
use crate::error::EngineError;
use crate::focus_mode;
use crate::models::{
    ActiveWindow, ActiveWindowPatch, ActiveWindowTabGroup, TabGroupId, TabGroupPatch, WindowId,
};
use crate::reconcile;

use super::windows;

/// A message sent by the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Request {
    GetActiveWindow {
        window_id: WindowId,
    },
    UpdateActiveWindow {
        window_id: WindowId,
        patch: ActiveWindowPatch,
    },
    ChangeKeepTabGroupOpen {
        window_id: WindowId,
        tab_group_id: TabGroupId,
        enabled: bool,
    },
    GetActiveWindowTabGroup {
        window_id: WindowId,
        tab_group_id: TabGroupId,
    },
    ChangeFocusMode {
        window_id: WindowId,
        enabled: bool,
    },
    ChangeActivateCurrentWindow {
        window_id: WindowId,
        enabled: bool,
    },
}

impl Request {
    /// Operation name used for queue entries and logs
    pub fn name(&self) -> &'static str {
        match self {
            Request::GetActiveWindow { .. } => "getActiveWindow",
            Request::UpdateActiveWindow { .. } => "updateActiveWindow",
            Request::ChangeKeepTabGroupOpen { .. } => "changeKeepTabGroupOpen",
            Request::GetActiveWindowTabGroup { .. } => "getActiveWindowTabGroup",
            Request::ChangeFocusMode { .. } => "changeFocusMode",
            Request::ChangeActivateCurrentWindow { .. } => "changeActivateCurrentWindow",
        }
    }
}

/// Reply to a [`Request`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Response {
    ActiveWindow(Option<ActiveWindow>),
    TabGroup(Option<ActiveWindowTabGroup>),
    Done,
}

/// Process one UI request inside its queue operation
pub async fn handle_request(ctx: &EngineContext, request: Request) -> Result<Response> {
    debug!("Handling {}", request.name());
    match request {
        Request::GetActiveWindow { window_id } => {
            Ok(Response::ActiveWindow(ctx.cache.get(window_id).await?))
        }
        Request::UpdateActiveWindow { window_id, patch } => {
            let window = ctx.cache.update(window_id, patch).await?;
            Ok(Response::ActiveWindow(Some(window)))
        }
        Request::ChangeKeepTabGroupOpen {
            window_id,
            tab_group_id,
            enabled,
        } => {
            change_keep_open(ctx, window_id, tab_group_id, enabled).await?;
            Ok(Response::Done)
        }
        Request::GetActiveWindowTabGroup {
            window_id,
            tab_group_id,
        } => {
            let group = ctx
                .cache
                .get(window_id)
                .await?
                .and_then(|window| window.tab_group(tab_group_id).cloned());
            Ok(Response::TabGroup(group))
        }
        Request::ChangeFocusMode { window_id, enabled } => {
            if enabled {
                let colors = ctx.preferences().focus_mode_colors;
                focus_mode::enable(ctx, window_id, colors).await?;
            } else {
                focus_mode::disable(ctx, window_id).await?;
            }
            Ok(Response::Done)
        }
        Request::ChangeActivateCurrentWindow { window_id, enabled } => {
            if enabled {
                let window = windows::activate_window(ctx, window_id).await?;
                Ok(Response::ActiveWindow(Some(window)))
            } else {
                windows::deactivate_window(ctx, window_id).await?;
                Ok(Response::ActiveWindow(None))
            }
        }
    }
}

async fn change_keep_open(
    ctx: &EngineContext,
    window_id: WindowId,
    tab_group_id: TabGroupId,
    enabled: bool,
) -> Result<()> {
    let window = ctx.cache.get_or_throw(window_id).await?;
    if !window.has_tab_group(tab_group_id) {
        return Err(EngineError::MissingTabGroup {
            window_id,
            tab_group_id,
        }
        .into());
    }
    ctx.cache
        .update(
            window_id,
            ActiveWindowPatch::new().tab_group(TabGroupPatch::new(tab_group_id).keep_open(enabled)),
        )
        .await?;
    info!(
        "Keep open {} for tab group {} in window {}",
        if enabled { "enabled" } else { "disabled" },
        tab_group_id,
        window_id
    );

    if !enabled {
        return reconcile::reconcile_active(ctx, window_id).await;
    }

    let Some(live) = ctx
        .browser
        .get_tab_group(tab_group_id)
        .await
        .with_context(|| format!("Failed to fetch tab group {}", tab_group_id))?
    else {
        return Ok(());
    };
    if !live.collapsed {
        return Ok(());
    }
    let update = TabGroupUpdate {
        collapsed: Some(false),
        ..TabGroupUpdate::default()
    };
    let expanded = ctx
        .retry
        .call(|| ctx.browser.update_tab_group(tab_group_id, &update))
        .await
        .with_context(|| format!("Failed to expand tab group {}", tab_group_id))?;
    ctx.cache
        .update(
            window_id,
            ActiveWindowPatch::new()
                .tab_group(TabGroupPatch::new(tab_group_id).collapsed(expanded.collapsed)),
        )
        .await?;
    Ok(())
}
