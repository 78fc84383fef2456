//! Tab group notifications

use anyhow::{Context, Result};
use log::{debug, info};

use crate::browser::{TabGroupUpdate, TabQuery, TabUpdate};
use crate::engine::EngineContext;
use crate::models::{
    ActiveWindowPatch, ActiveWindowTabGroup, BrowserTabGroup, TabGroupPatch, TabId,
};
use crate::reconcile;
use crate::validate::{ExpectedTabGroup, validate};

use super::tabs;

pub(super) async fn on_tab_group_created(ctx: &EngineContext, group: BrowserTabGroup) -> Result<()> {
    let expected = ExpectedTabGroup {
        window_id: Some(group.window_id),
        ..ExpectedTabGroup::default()
    };
    let Some(validated) =
        validate::<BrowserTabGroup>(ctx.browser.as_ref(), &ctx.cache, group.id, &expected).await?
    else {
        return Ok(());
    };
    let window = validated.active_window;
    if window.has_tab_group(group.id) {
        debug!("Tab group {} is already tracked", group.id);
        return Ok(());
    }

    let live = reconcile::reconcile_new_group(ctx, &window, validated.live).await?;
    let active_tab = ctx
        .browser
        .query_tabs(&TabQuery::active_in(live.window_id))
        .await
        .context("Failed to query active tab")?
        .into_iter()
        .find(|tab| tab.group_id == Some(live.id));

    let record = ActiveWindowTabGroup::from_live(&live, active_tab.as_ref().map(|tab| tab.id));
    let window = ctx
        .cache
        .update(window.window_id, ActiveWindowPatch::new().add_tab_group(record))
        .await?;
    info!("Tracking tab group {} in window {}", live.id, live.window_id);

    if let Some(tab) = active_tab {
        tabs::sync_group_title(ctx, &window, live.id, &tab).await?;
    }
    Ok(())
}

pub(super) async fn on_tab_group_removed(ctx: &EngineContext, group: BrowserTabGroup) -> Result<()> {
    let Some(window) = ctx.cache.get(group.window_id).await? else {
        return Ok(());
    };
    if !window.has_tab_group(group.id) {
        return Ok(());
    }
    ctx.cache
        .update(
            group.window_id,
            ActiveWindowPatch::new().remove_tab_group(group.id),
        )
        .await?;
    info!("Stopped tracking tab group {} in window {}", group.id, group.window_id);
    Ok(())
}

pub(super) async fn on_tab_group_updated(ctx: &EngineContext, group: BrowserTabGroup) -> Result<()> {
    let expected = ExpectedTabGroup::matching(&group);
    let Some(validated) =
        validate::<BrowserTabGroup>(ctx.browser.as_ref(), &ctx.cache, group.id, &expected).await?
    else {
        return Ok(());
    };
    let live = validated.live;
    let window = validated.active_window;
    let Some(record) = window.tab_group(live.id).cloned() else {
        debug!("Ignoring update of untracked tab group {}", live.id);
        return Ok(());
    };

    let mut patch = TabGroupPatch::mirror(&live);
    if live.title_text().is_none() {
        patch = patch.use_tab_title(true);
    } else if live.title != record.title {
        // The user named the group; stop deriving its title from tabs
        patch = patch.use_tab_title(false);
    }

    let browser = ctx.browser.as_ref();
    let target = reconcile::active_group(browser, live.window_id).await?;
    let is_target = target == Some(live.id);

    if let Some(focus_mode) = &window.focus_mode {
        let color = focus_mode.colors.color_for(is_target);
        if live.color != color {
            debug!(
                "Tab group {} drifted to {} in focus mode; restoring {}",
                live.id, live.color, color
            );
            let update = TabGroupUpdate {
                color: Some(color),
                ..TabGroupUpdate::default()
            };
            let window_id = live.window_id;
            let corrected = ctx
                .retry
                .call_while(
                    || browser.update_tab_group(live.id, &update),
                    || async move {
                        reconcile::active_group(browser, window_id)
                            .await
                            .is_ok_and(|current| current == target)
                    },
                )
                .await
                .with_context(|| format!("Failed to recolor tab group {}", live.id))?;
            if let Some(corrected) = corrected {
                patch = patch.color(corrected.color);
            }
        }
    }

    let expanded_by_user = record.collapsed && !live.collapsed && !is_target;
    ctx.cache
        .update(live.window_id, ActiveWindowPatch::new().tab_group(patch))
        .await?;

    if expanded_by_user && ctx.preferences().collapse_unfocused_tab_groups {
        tokio::time::sleep(ctx.settings.settle_delay()).await;
        focus_expanded_group(ctx, &live, record.last_active_tab_id).await?;
    }
    Ok(())
}

/// Activate a tab inside a group the user just expanded, so it takes focus
async fn focus_expanded_group(
    ctx: &EngineContext,
    group: &BrowserTabGroup,
    last_active: Option<TabId>,
) -> Result<()> {
    let tabs = ctx
        .browser
        .query_tabs(&TabQuery::in_group(group.id))
        .await
        .with_context(|| format!("Failed to query tabs of group {}", group.id))?;
    let tab = last_active
        .and_then(|id| tabs.iter().find(|tab| tab.id == id))
        .or_else(|| tabs.first());
    let Some(tab) = tab else {
        return Ok(());
    };
    if tab.active {
        return Ok(());
    }

    let browser = ctx.browser.as_ref();
    let update = TabUpdate::activate();
    let activated = ctx
        .retry
        .call_while(
            || browser.update_tab(tab.id, &update),
            || async move {
                matches!(
                    browser.get_tab_group(group.id).await,
                    Ok(Some(current)) if !current.collapsed
                )
            },
        )
        .await
        .with_context(|| format!("Failed to activate tab {}", tab.id))?;
    if activated.is_some() {
        debug!("Activated tab {} in expanded group {}", tab.id, group.id);
    }
    Ok(())
}
