//! Tab notifications, auto-grouping and group title sync

use anyhow::{Context, Result};
use log::debug;

use crate::browser::{Browser, GroupTarget, TabChange, TabGroupUpdate, TabQuery};
use crate::engine::EngineContext;
use crate::models::{
    ActiveWindow, ActiveWindowPatch, BrowserTab, BrowserWindow, TabGroupId, TabGroupPatch, TabId,
    WindowId,
};
use crate::reconcile;
use crate::validate::{ExpectedTab, ExpectedWindow, validate};

/// Longest title copied from a tab onto its group
const MAX_GROUP_TITLE_CHARS: usize = 30;

/// Shorten a tab title to fit a group label
pub fn truncate_title(title: &str) -> String {
    title.chars().take(MAX_GROUP_TITLE_CHARS).collect()
}

/// Put an ungrouped, unpinned tab into a group.
///
/// The tab joins the group of the window's active tab when that is another,
/// grouped tab; otherwise a new group is created for it. The call is retried
/// only while the tab is still ungrouped (and still active, when
/// `require_active` is set). Returns the group the tab ended up in.
pub async fn auto_group(
    ctx: &EngineContext,
    tab: &BrowserTab,
    require_active: bool,
) -> Result<Option<TabGroupId>> {
    if tab.pinned || tab.group_id.is_some() {
        return Ok(tab.group_id);
    }
    let browser = ctx.browser.as_ref();
    let active = browser
        .query_tabs(&TabQuery::active_in(tab.window_id))
        .await
        .with_context(|| format!("Failed to query active tab of window {}", tab.window_id))?;

    let target = match active.first() {
        Some(active) if active.id != tab.id => match active.group_id {
            Some(tab_group_id) => GroupTarget::Existing { tab_group_id },
            None => GroupTarget::New {
                window_id: Some(tab.window_id),
            },
        },
        _ => GroupTarget::New {
            window_id: Some(tab.window_id),
        },
    };

    let tab_ids = [tab.id];
    let tab_id = tab.id;
    let grouped = ctx
        .retry
        .call_while(
            || browser.group_tabs(&tab_ids, &target),
            || still_groupable(browser, tab_id, require_active),
        )
        .await
        .with_context(|| format!("Failed to group tab {}", tab.id))?;
    match grouped {
        Some(group_id) => debug!("Grouped tab {} into {}", tab.id, group_id),
        None => debug!("Tab {} changed while grouping; left alone", tab.id),
    }
    Ok(grouped)
}

async fn still_groupable(browser: &dyn Browser, tab_id: TabId, require_active: bool) -> bool {
    match browser.get_tab(tab_id).await {
        Ok(Some(tab)) => tab.group_id.is_none() && (!require_active || tab.active),
        _ => false,
    }
}

/// Copy a tab's title onto its group when the group uses a synthetic title
pub async fn sync_group_title(
    ctx: &EngineContext,
    window: &ActiveWindow,
    group_id: TabGroupId,
    tab: &BrowserTab,
) -> Result<()> {
    let Some(record) = window.tab_group(group_id) else {
        return Ok(());
    };
    if !record.use_tab_title {
        return Ok(());
    }
    let Some(tab_title) = tab.title.clone() else {
        return Ok(());
    };
    let title = truncate_title(&tab_title);
    if record.title.as_deref() == Some(title.as_str()) {
        return Ok(());
    }

    let browser = ctx.browser.as_ref();
    let update = TabGroupUpdate {
        title: Some(title.clone()),
        ..TabGroupUpdate::default()
    };
    let window_id = window.window_id;
    let tab_id = tab.id;
    let cache = &ctx.cache;
    let tab_title = &tab_title;
    let updated = ctx
        .retry
        .call_while(
            || browser.update_tab_group(group_id, &update),
            || async move {
                let synthetic = matches!(
                    cache.get(window_id).await,
                    Ok(Some(window)) if window.tab_group(group_id).is_some_and(|g| g.use_tab_title)
                );
                let unchanged = matches!(
                    browser.get_tab(tab_id).await,
                    Ok(Some(tab)) if tab.title.as_ref() == Some(tab_title)
                );
                synthetic && unchanged
            },
        )
        .await
        .with_context(|| format!("Failed to retitle tab group {}", group_id))?;

    if let Some(group) = updated {
        debug!("Tab group {} now titled {:?}", group_id, title);
        ctx.cache
            .update(
                window_id,
                ActiveWindowPatch::new().tab_group(TabGroupPatch::new(group.id).title(group.title)),
            )
            .await?;
    }
    Ok(())
}

pub(super) async fn on_tab_created(ctx: &EngineContext, tab: BrowserTab) -> Result<()> {
    let expected = ExpectedTab::in_window(tab.window_id);
    let Some(validated) =
        validate::<BrowserTab>(ctx.browser.as_ref(), &ctx.cache, tab.id, &expected).await?
    else {
        return Ok(());
    };
    if ctx.preferences().always_group_tabs {
        auto_group(ctx, &validated.live, false).await?;
    }
    Ok(())
}

pub(super) async fn on_tab_activated(
    ctx: &EngineContext,
    tab_id: TabId,
    window_id: WindowId,
) -> Result<()> {
    let expected = ExpectedTab::active_in(window_id);
    let Some(validated) =
        validate::<BrowserTab>(ctx.browser.as_ref(), &ctx.cache, tab_id, &expected).await?
    else {
        return Ok(());
    };
    let mut tab = validated.live;
    let mut window = validated.active_window;

    if ctx.preferences().always_group_tabs && tab.group_id.is_none() && !tab.pinned {
        if let Some(group_id) = auto_group(ctx, &tab, true).await? {
            tab.group_id = Some(group_id);
        }
    }

    if let Some(group_id) = tab.group_id {
        if window
            .tab_group(group_id)
            .is_some_and(|g| g.last_active_tab_id != Some(tab.id))
        {
            window = ctx
                .cache
                .update(
                    window_id,
                    ActiveWindowPatch::new()
                        .tab_group(TabGroupPatch::new(group_id).last_active_tab_id(Some(tab.id))),
                )
                .await?;
        }
        sync_group_title(ctx, &window, group_id, &tab).await?;
    }

    reconcile::reconcile_window(ctx, window_id, tab.group_id).await
}

pub(super) async fn on_tab_updated(
    ctx: &EngineContext,
    tab_id: TabId,
    change: TabChange,
) -> Result<()> {
    let expected = ExpectedTab {
        title: change.title.clone(),
        pinned: change.pinned,
        group_id: change.group_id,
        ..ExpectedTab::default()
    };
    let Some(validated) =
        validate::<BrowserTab>(ctx.browser.as_ref(), &ctx.cache, tab_id, &expected).await?
    else {
        return Ok(());
    };
    let tab = validated.live;
    let mut window = validated.active_window;

    if change.group_id.is_some() && tab.active {
        if let Some(group_id) = tab.group_id {
            if window.has_tab_group(group_id) {
                window = ctx
                    .cache
                    .update(
                        tab.window_id,
                        ActiveWindowPatch::new()
                            .tab_group(TabGroupPatch::new(group_id).last_active_tab_id(Some(tab.id))),
                    )
                    .await?;
            }
        }
        reconcile::reconcile_window(ctx, tab.window_id, tab.group_id).await?;
    }

    if change.title.is_some() {
        if let Some(group_id) = tab.group_id {
            let is_title_source = tab.active
                || window
                    .tab_group(group_id)
                    .is_some_and(|g| g.last_active_tab_id == Some(tab.id));
            if is_title_source {
                sync_group_title(ctx, &window, group_id, &tab).await?;
            }
        }
    }
    Ok(())
}

pub(super) async fn on_tab_attached(
    ctx: &EngineContext,
    tab_id: TabId,
    new_window_id: WindowId,
) -> Result<()> {
    let expected = ExpectedTab::in_window(new_window_id);
    let Some(validated) =
        validate::<BrowserTab>(ctx.browser.as_ref(), &ctx.cache, tab_id, &expected).await?
    else {
        return Ok(());
    };
    if !validated.live.active {
        return Ok(());
    }
    reconcile::reconcile_window(ctx, new_window_id, validated.live.group_id).await
}

pub(super) async fn on_tab_detached(
    ctx: &EngineContext,
    tab_id: TabId,
    old_window_id: WindowId,
) -> Result<()> {
    let Some(_) = validate::<BrowserWindow>(
        ctx.browser.as_ref(),
        &ctx.cache,
        old_window_id,
        &ExpectedWindow::default(),
    )
    .await?
    else {
        return Ok(());
    };
    debug!("Tab {} left window {}; reconciling it", tab_id, old_window_id);
    reconcile::reconcile_active(ctx, old_window_id).await
}

pub(super) async fn on_tab_removed(
    ctx: &EngineContext,
    tab_id: TabId,
    window_id: WindowId,
    is_window_closing: bool,
) -> Result<()> {
    if is_window_closing {
        return Ok(());
    }
    let Some(window) = ctx.cache.get(window_id).await? else {
        return Ok(());
    };
    let patches: Vec<TabGroupPatch> = window
        .tab_groups
        .iter()
        .filter(|g| g.last_active_tab_id == Some(tab_id))
        .map(|g| TabGroupPatch::new(g.id).last_active_tab_id(None))
        .collect();
    if patches.is_empty() {
        return Ok(());
    }
    ctx.cache
        .update(window_id, ActiveWindowPatch::new().tab_groups(patches))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_title_counts_chars() {
        assert_eq!(truncate_title("Short"), "Short");
        let long = "é".repeat(40);
        assert_eq!(truncate_title(&long).chars().count(), 30);
    }
}
