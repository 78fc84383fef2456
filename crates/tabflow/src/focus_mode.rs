//! Per-window focus mode
//!
//! Enabling snapshots every live group's color, stores the focus colors and
//! reconciles the window so the focused group stands out. Disabling puts the
//! snapshot back; groups created while focus mode was on have no snapshot and
//! take the next color of a rotating palette instead.

use anyhow::{Context, Result};
use log::{debug, info};

use crate::browser::{TabGroupQuery, TabGroupUpdate};
use crate::engine::EngineContext;
use crate::error::EngineError;
use crate::models::{
    ActiveWindowPatch, FocusMode, FocusModeColors, SavedTabGroupColor, TabGroupColor,
    TabGroupPatch, WindowId,
};
use crate::reconcile;

/// Fallback colors for groups without a saved color; grey reads as disabled
pub fn restore_palette() -> impl Iterator<Item = TabGroupColor> {
    TabGroupColor::ALL
        .into_iter()
        .filter(|color| *color != TabGroupColor::Grey)
        .cycle()
}

/// Turn focus mode on for a managed window
pub async fn enable(ctx: &EngineContext, window_id: WindowId, colors: FocusModeColors) -> Result<()> {
    let window = ctx.cache.get_or_throw(window_id).await?;
    if window.focus_mode.is_some() {
        return Err(EngineError::FocusModeAlreadyEnabled(window_id).into());
    }

    let groups = ctx
        .browser
        .query_tab_groups(&TabGroupQuery::in_window(window_id))
        .await
        .with_context(|| format!("Failed to query tab groups of window {}", window_id))?;
    let saved = groups
        .iter()
        .map(|group| SavedTabGroupColor {
            tab_group_id: group.id,
            color: group.color,
        })
        .collect::<Vec<_>>();
    debug!("Saved {} tab group colors for window {}", saved.len(), window_id);

    ctx.cache
        .update(
            window_id,
            ActiveWindowPatch::new().focus_mode(Some(FocusMode::new(colors, saved))),
        )
        .await?;
    info!("Focus mode enabled for window {}", window_id);

    reconcile::reconcile_active(ctx, window_id).await
}

/// Turn focus mode off for a managed window, restoring group colors
pub async fn disable(ctx: &EngineContext, window_id: WindowId) -> Result<()> {
    let window = ctx.cache.get_or_throw(window_id).await?;
    let Some(focus_mode) = window.focus_mode else {
        return Err(EngineError::FocusModeAlreadyDisabled(window_id).into());
    };

    let groups = ctx
        .browser
        .query_tab_groups(&TabGroupQuery::in_window(window_id))
        .await
        .with_context(|| format!("Failed to query tab groups of window {}", window_id))?;

    let mut palette = restore_palette();
    let mut patches = Vec::new();
    for group in groups {
        let color = match focus_mode.saved_color(group.id) {
            Some(color) => color,
            None => palette.next().unwrap_or(TabGroupColor::Blue),
        };
        if color == group.color {
            continue;
        }
        let update = TabGroupUpdate {
            color: Some(color),
            ..TabGroupUpdate::default()
        };
        let restored = ctx
            .retry
            .call(|| ctx.browser.update_tab_group(group.id, &update))
            .await
            .with_context(|| format!("Failed to restore color of tab group {}", group.id))?;
        patches.push(TabGroupPatch::new(restored.id).color(restored.color));
    }

    ctx.cache
        .update(
            window_id,
            ActiveWindowPatch::new().focus_mode(None).tab_groups(patches),
        )
        .await?;
    info!("Focus mode disabled for window {}", window_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_skips_grey_and_wraps() {
        let colors: Vec<TabGroupColor> = restore_palette().take(10).collect();
        assert!(!colors.contains(&TabGroupColor::Grey));
        assert_eq!(colors[0], TabGroupColor::Blue);
        assert_eq!(colors[8], TabGroupColor::Blue);
    }
}
