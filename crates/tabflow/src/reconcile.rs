//! Focus/collapse reconciliation
//!
//! Given a window and the group holding its focus target (`None` when the
//! active tab is ungrouped or there is none), every group of the window is
//! brought to its desired state:
//! - the target group is expanded
//! - with `collapse_unfocused_tab_groups` on, every other group that is not
//!   `keep_open` is collapsed
//! - with focus mode on, the target takes the focused color and every other
//!   group the non-focused color (`keep_open` does not exempt from this)
//!
//! Edits go through the retry handler and are abandoned once the window's
//! active tab leaves the target group. Only groups that were actually edited
//! are folded back into the active window record.

use anyhow::{Context, Result};
use log::debug;

use crate::browser::{Browser, TabGroupQuery, TabGroupUpdate, TabQuery};
use crate::engine::EngineContext;
use crate::models::{
    ActiveWindow, ActiveWindowPatch, BrowserTabGroup, TabGroupId, TabGroupPatch, WindowId,
};

/// One group edit the reconciler wants to make
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEdit {
    pub tab_group_id: TabGroupId,
    pub update: TabGroupUpdate,
    pub is_target: bool,
}

/// Compute the edits that bring `groups` to their desired state.
///
/// Groups already in their desired state produce no edit. The target's edit,
/// if any, comes first; the rest keep the order of `groups`.
pub fn plan(
    groups: &[BrowserTabGroup],
    window: &ActiveWindow,
    target: Option<TabGroupId>,
    collapse_unfocused: bool,
) -> Vec<PlannedEdit> {
    let mut edits: Vec<PlannedEdit> = groups
        .iter()
        .filter_map(|group| {
            let is_target = target == Some(group.id);
            let keep_open = window
                .tab_group(group.id)
                .is_some_and(|record| record.keep_open);

            let collapsed = if is_target {
                Some(false)
            } else if collapse_unfocused && !keep_open {
                Some(true)
            } else {
                None
            };
            let color = window
                .focus_mode
                .as_ref()
                .map(|focus_mode| focus_mode.colors.color_for(is_target));

            let update = TabGroupUpdate {
                collapsed: collapsed.filter(|c| *c != group.collapsed),
                color: color.filter(|c| *c != group.color),
                title: None,
            };
            (!update.is_empty()).then_some(PlannedEdit {
                tab_group_id: group.id,
                update,
                is_target,
            })
        })
        .collect();
    // Stable: non-target edits keep their relative order
    edits.sort_by_key(|edit| !edit.is_target);
    edits
}

/// Group of the window's active tab, `None` if ungrouped or no tab is active
pub async fn active_group(browser: &dyn Browser, window_id: WindowId) -> Result<Option<TabGroupId>> {
    let tabs = browser
        .query_tabs(&TabQuery::active_in(window_id))
        .await
        .with_context(|| format!("Failed to query active tab of window {}", window_id))?;
    Ok(tabs.first().and_then(|tab| tab.group_id))
}

/// Abandon predicate: the window's focus target has not moved
async fn target_unchanged(
    browser: &dyn Browser,
    window_id: WindowId,
    target: Option<TabGroupId>,
) -> bool {
    match active_group(browser, window_id).await {
        Ok(current) => current == target,
        Err(e) => {
            debug!("Could not re-check focus target of window {}: {:#}", window_id, e);
            false
        }
    }
}

/// Apply planned edits, returning patches for the groups that changed
async fn apply(
    ctx: &EngineContext,
    window_id: WindowId,
    target: Option<TabGroupId>,
    edits: Vec<PlannedEdit>,
) -> Result<Vec<TabGroupPatch>> {
    let browser = ctx.browser.as_ref();
    let (first, rest): (Vec<_>, Vec<_>) = edits.into_iter().partition(|edit| edit.is_target);
    let settle = rest.iter().any(|edit| edit.update.collapsed == Some(true))
        && !first.is_empty();

    let mut patches = Vec::new();
    for (index, edit) in first.into_iter().chain(rest).enumerate() {
        // Let the target's expand animation finish before collapsing others
        if index == 1 && settle {
            tokio::time::sleep(ctx.settings.settle_delay()).await;
        }
        let updated = ctx
            .retry
            .call_while(
                || browser.update_tab_group(edit.tab_group_id, &edit.update),
                || target_unchanged(browser, window_id, target),
            )
            .await
            .with_context(|| format!("Failed to update tab group {}", edit.tab_group_id))?;
        match updated {
            Some(group) => patches.push(
                TabGroupPatch::new(group.id)
                    .color(group.color)
                    .collapsed(group.collapsed),
            ),
            None => debug!(
                "Focus target of window {} moved; skipped tab group {}",
                window_id, edit.tab_group_id
            ),
        }
    }
    Ok(patches)
}

/// Reconcile every group of a managed window against `target`
pub async fn reconcile_window(
    ctx: &EngineContext,
    window_id: WindowId,
    target: Option<TabGroupId>,
) -> Result<()> {
    let Some(window) = ctx.cache.get(window_id).await? else {
        debug!("Window {} is not active; nothing to reconcile", window_id);
        return Ok(());
    };
    let groups = ctx
        .browser
        .query_tab_groups(&TabGroupQuery::in_window(window_id))
        .await
        .with_context(|| format!("Failed to query tab groups of window {}", window_id))?;

    let preferences = ctx.preferences();
    let edits = plan(
        &groups,
        &window,
        target,
        preferences.collapse_unfocused_tab_groups,
    );
    if edits.is_empty() {
        return Ok(());
    }
    debug!(
        "Reconciling window {} around {:?}: {} edits",
        window_id,
        target,
        edits.len()
    );

    let patches = apply(ctx, window_id, target, edits).await?;
    if !patches.is_empty() {
        ctx.cache
            .update(window_id, ActiveWindowPatch::new().tab_groups(patches))
            .await?;
    }
    Ok(())
}

/// Reconcile a window around whatever its active tab currently is
pub async fn reconcile_active(ctx: &EngineContext, window_id: WindowId) -> Result<()> {
    let target = active_group(ctx.browser.as_ref(), window_id).await?;
    reconcile_window(ctx, window_id, target).await
}

/// Bring a newly created group to its desired state before it is tracked.
///
/// Returns the group as it stands afterwards.
pub async fn reconcile_new_group(
    ctx: &EngineContext,
    window: &ActiveWindow,
    group: BrowserTabGroup,
) -> Result<BrowserTabGroup> {
    let browser = ctx.browser.as_ref();
    let target = active_group(browser, group.window_id).await?;
    let preferences = ctx.preferences();
    let edits = plan(
        std::slice::from_ref(&group),
        window,
        target,
        preferences.collapse_unfocused_tab_groups,
    );
    let Some(edit) = edits.into_iter().next() else {
        return Ok(group);
    };

    let updated = ctx
        .retry
        .call_while(
            || browser.update_tab_group(edit.tab_group_id, &edit.update),
            || target_unchanged(browser, group.window_id, target),
        )
        .await
        .with_context(|| format!("Failed to update new tab group {}", group.id))?;
    Ok(updated.unwrap_or(group))
}
