//! Queue operation bodies
//!
//! Every browser notification, UI request and preference change becomes one
//! queued operation whose body lives here. Handlers take the shared
//! [`EngineContext`], re-validate whatever the notification claimed, read
//! preferences at execution time, and leave the cache describing live state.

mod groups;
mod messages;
mod preferences;
mod tabs;
mod windows;

use anyhow::Result;

use crate::browser::BrowserEvent;
use crate::engine::EngineContext;
use crate::queue::Priority;

pub use messages::{Request, Response, handle_request};
pub use preferences::apply_toggle;
pub use tabs::{auto_group, sync_group_title, truncate_title};
pub use windows::{activate_window, deactivate_window, startup_reconcile};

/// Queue priority of a notification: structural changes run first
pub fn priority(event: &BrowserEvent) -> Priority {
    match event {
        BrowserEvent::WindowCreated { .. }
        | BrowserEvent::WindowRemoved { .. }
        | BrowserEvent::TabGroupCreated { .. }
        | BrowserEvent::TabGroupRemoved { .. } => Priority::Next,
        _ => Priority::End,
    }
}

/// Run the handler for one browser notification
pub async fn handle_event(ctx: &EngineContext, event: BrowserEvent) -> Result<()> {
    match event {
        BrowserEvent::WindowCreated { window } => windows::on_window_created(ctx, window).await,
        BrowserEvent::WindowRemoved { window_id } => {
            windows::on_window_removed(ctx, window_id).await
        }
        BrowserEvent::WindowFocusChanged { window_id } => {
            windows::on_window_focus_changed(ctx, window_id).await
        }
        BrowserEvent::TabGroupCreated { group } => groups::on_tab_group_created(ctx, group).await,
        BrowserEvent::TabGroupRemoved { group } => groups::on_tab_group_removed(ctx, group).await,
        BrowserEvent::TabGroupUpdated { group } => groups::on_tab_group_updated(ctx, group).await,
        BrowserEvent::TabCreated { tab } => tabs::on_tab_created(ctx, tab).await,
        BrowserEvent::TabActivated { tab_id, window_id } => {
            tabs::on_tab_activated(ctx, tab_id, window_id).await
        }
        BrowserEvent::TabUpdated { tab_id, change } => {
            tabs::on_tab_updated(ctx, tab_id, change).await
        }
        BrowserEvent::TabAttached {
            tab_id,
            new_window_id,
            ..
        } => tabs::on_tab_attached(ctx, tab_id, new_window_id).await,
        BrowserEvent::TabDetached {
            tab_id,
            old_window_id,
            ..
        } => tabs::on_tab_detached(ctx, tab_id, old_window_id).await,
        BrowserEvent::TabRemoved {
            tab_id,
            window_id,
            is_window_closing,
        } => tabs::on_tab_removed(ctx, tab_id, window_id, is_window_closing).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TabId, WindowId};

    #[test]
    fn test_structural_events_run_next() {
        let created = BrowserEvent::WindowRemoved {
            window_id: WindowId::new(1),
        };
        let activated = BrowserEvent::TabActivated {
            tab_id: TabId::new(2),
            window_id: WindowId::new(1),
        };
        assert_eq!(priority(&created), Priority::Next);
        assert_eq!(priority(&activated), Priority::End);
    }
}
