//! Window-wide passes triggered by preference changes

use anyhow::{Context, Result};
use log::{debug, info};

use crate::browser::TabQuery;
use crate::config::PreferenceToggle;
use crate::engine::EngineContext;
use crate::reconcile;

use super::tabs;

/// Apply one toggled preference to every active window.
///
/// The preference is re-read when the operation runs; a toggle that was
/// flipped back in the meantime does nothing.
pub async fn apply_toggle(ctx: &EngineContext, toggle: PreferenceToggle) -> Result<()> {
    let preferences = ctx.preferences();
    match toggle {
        PreferenceToggle::CollapseUnfocusedTabGroups(true) => {
            if !preferences.collapse_unfocused_tab_groups {
                debug!("Collapse preference turned off again; skipping");
                return Ok(());
            }
            let windows = ctx.cache.get_all().await?;
            info!("Collapsing unfocused tab groups in {} windows", windows.len());
            for window in windows {
                reconcile::reconcile_active(ctx, window.window_id).await?;
            }
        }
        PreferenceToggle::AlwaysGroupTabs(true) => {
            if !preferences.always_group_tabs {
                debug!("Always-group preference turned off again; skipping");
                return Ok(());
            }
            let windows = ctx.cache.get_all().await?;
            info!("Grouping active tabs in {} windows", windows.len());
            for window in windows {
                let active = ctx
                    .browser
                    .query_tabs(&TabQuery::active_in(window.window_id))
                    .await
                    .with_context(|| {
                        format!("Failed to query active tab of window {}", window.window_id)
                    })?;
                let Some(tab) = active.into_iter().next() else {
                    continue;
                };
                if let Some(group_id) = tabs::auto_group(ctx, &tab, true).await? {
                    reconcile::reconcile_window(ctx, window.window_id, Some(group_id)).await?;
                }
            }
        }
        // Turning a preference off needs no window-wide pass
        other => debug!("No pass needed for {:?}", other),
    }
    Ok(())
}
