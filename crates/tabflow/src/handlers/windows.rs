//! Window lifecycle: activation, removal, focus and startup reconciliation

use anyhow::{Context, Result};
use log::{debug, info};

use crate::browser::{TabGroupQuery, TabQuery};
use crate::engine::EngineContext;
use crate::error::EngineError;
use crate::focus_mode;
use crate::models::{
    ActiveWindow, ActiveWindowPatch, ActiveWindowTabGroup, BrowserTabGroup, BrowserWindow,
    TabGroupId, TabGroupPatch, TabId, WindowId, WindowKind,
};
use crate::reconcile;
use crate::validate::{ExpectedWindow, validate};

/// The active tab of a window and the group it belongs to
type ActiveTab = Option<(TabId, Option<TabGroupId>)>;

/// Live groups of a window along with its active tab
async fn live_group_records(
    ctx: &EngineContext,
    window_id: WindowId,
) -> Result<(Vec<BrowserTabGroup>, ActiveTab)> {
    let groups = ctx
        .browser
        .query_tab_groups(&TabGroupQuery::in_window(window_id))
        .await
        .with_context(|| format!("Failed to query tab groups of window {}", window_id))?;
    let active = ctx
        .browser
        .query_tabs(&TabQuery::active_in(window_id))
        .await
        .with_context(|| format!("Failed to query active tab of window {}", window_id))?
        .first()
        .map(|tab| (tab.id, tab.group_id));
    Ok((groups, active))
}

fn record_for(group: &BrowserTabGroup, active: ActiveTab) -> ActiveWindowTabGroup {
    let last_active = active
        .filter(|(_, group_id)| *group_id == Some(group.id))
        .map(|(tab_id, _)| tab_id);
    ActiveWindowTabGroup::from_live(group, last_active)
}

/// Put a window under management, tracking its current groups
pub async fn activate_window(ctx: &EngineContext, window_id: WindowId) -> Result<ActiveWindow> {
    if ctx.cache.get(window_id).await?.is_some() {
        return Err(EngineError::WindowAlreadyActive(window_id).into());
    }
    let (groups, active) = live_group_records(ctx, window_id).await?;
    let records = groups.iter().map(|g| record_for(g, active)).collect();

    ctx.cache
        .add(ActiveWindow::new(window_id).with_tab_groups(records))
        .await?;
    info!("Activated window {} with {} tab groups", window_id, groups.len());

    reconcile::reconcile_window(ctx, window_id, active.and_then(|(_, group)| group)).await?;
    Ok(ctx.cache.get_or_throw(window_id).await?)
}

/// Release a window from management, restoring focus colors first
pub async fn deactivate_window(ctx: &EngineContext, window_id: WindowId) -> Result<()> {
    let window = ctx.cache.get_or_throw(window_id).await?;
    if window.focus_mode.is_some() {
        focus_mode::disable(ctx, window_id).await?;
    }
    ctx.cache.remove(window_id).await?;
    info!("Deactivated window {}", window_id);
    Ok(())
}

pub(super) async fn on_window_created(ctx: &EngineContext, window: BrowserWindow) -> Result<()> {
    let Some(live) = ctx
        .browser
        .get_window(window.id)
        .await
        .with_context(|| format!("Failed to fetch window {}", window.id))?
    else {
        debug!("Stale window {}: no longer exists", window.id);
        return Ok(());
    };

    if !ctx.preferences().auto_activate_new_windows {
        return Ok(());
    }
    if live.kind != WindowKind::Normal {
        debug!("Not activating {:?} window {}", live.kind, live.id);
        return Ok(());
    }
    if ctx.cache.get(live.id).await?.is_some() {
        return Ok(());
    }
    activate_window(ctx, live.id).await?;
    Ok(())
}

pub(super) async fn on_window_removed(ctx: &EngineContext, window_id: WindowId) -> Result<()> {
    if ctx.cache.remove(window_id).await?.is_some() {
        info!("Window {} closed; dropped its record", window_id);
    }
    Ok(())
}

pub(super) async fn on_window_focus_changed(
    ctx: &EngineContext,
    window_id: Option<WindowId>,
) -> Result<()> {
    let Some(window_id) = window_id else {
        return Ok(());
    };
    let expected = ExpectedWindow::focused();
    if validate::<BrowserWindow>(ctx.browser.as_ref(), &ctx.cache, window_id, &expected)
        .await?
        .is_none()
    {
        return Ok(());
    }
    reconcile::reconcile_active(ctx, window_id).await
}

/// Bring every stored record back in line with the live browser.
///
/// Records of windows that are gone are dropped; the rest get their group
/// records synced (missing added, vanished removed, mirrors refreshed) and
/// are reconciled.
pub async fn startup_reconcile(ctx: &EngineContext) -> Result<()> {
    let windows = ctx.cache.get_all().await?;
    info!("Reconciling {} stored windows", windows.len());

    for window in windows {
        let window_id = window.window_id;
        let live = ctx
            .browser
            .get_window(window_id)
            .await
            .with_context(|| format!("Failed to fetch window {}", window_id))?;
        if live.is_none() {
            ctx.cache.remove(window_id).await?;
            info!("Dropped record of closed window {}", window_id);
            continue;
        }

        let (groups, active) = live_group_records(ctx, window_id).await?;
        let mut patch = ActiveWindowPatch::new();
        for record in &window.tab_groups {
            if !groups.iter().any(|g| g.id == record.id) {
                patch = patch.remove_tab_group(record.id);
            }
        }
        for group in &groups {
            if window.has_tab_group(group.id) {
                patch = patch.tab_group(TabGroupPatch::mirror(group));
            } else {
                patch = patch.add_tab_group(record_for(group, active));
            }
        }
        debug!(
            "Window {}: {} groups added, {} removed",
            window_id,
            patch.add_tab_groups.len(),
            patch.remove_tab_groups.len()
        );
        ctx.cache.update(window_id, patch).await?;

        reconcile::reconcile_window(ctx, window_id, active.and_then(|(_, group)| group)).await?;
    }
    Ok(())
}
