//! Integration tests for the tabflow crate
//!
//! These drive a full engine against the in-memory browser: user actions
//! queue notifications, the harness dispatches them, and the tests inspect
//! live browser state, the engine's edits and the active window records.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tabflow::{
    ActiveWindowPatch, Browser, BrowserEvent, Engine, EngineError, EngineSettings, InMemoryBrowser,
    InMemoryWindowStore, Mutation, Preferences, Request, Response, SqliteWindowStore,
    TabGroupColor, TabGroupId, TabGroupPatch, TabGroupUpdate, TabId, WindowId, WindowKind, WindowStore,
};
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

/// Engine wired to an in-memory browser, collecting queue errors
struct Harness {
    browser: Arc<InMemoryBrowser>,
    engine: Engine,
    errors: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    fn new(preferences: Preferences) -> Self {
        Self::with_store(preferences, Arc::new(InMemoryWindowStore::new()))
    }

    fn with_store(preferences: Preferences, store: Arc<dyn WindowStore>) -> Self {
        Self::with_browser(Arc::new(InMemoryBrowser::new()), preferences, store)
    }

    fn with_browser(
        browser: Arc<InMemoryBrowser>,
        preferences: Preferences,
        store: Arc<dyn WindowStore>,
    ) -> Self {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        let engine = Engine::new(
            Arc::clone(&browser) as Arc<dyn Browser>,
            store,
            preferences,
            EngineSettings::default(),
            Arc::new(move |e: &anyhow::Error| sink.lock().unwrap().push(format!("{:#}", e))),
        );
        engine.start(async { Ok(()) });
        Self {
            browser,
            engine,
            errors,
        }
    }

    /// Dispatch notifications until the browser stops producing them
    async fn settle(&self) {
        for _ in 0..20 {
            let events = self.browser.take_events();
            if events.is_empty() {
                return;
            }
            self.dispatch(events).await;
        }
        panic!("notifications never settled");
    }

    async fn dispatch(&self, events: Vec<BrowserEvent>) {
        for event in events {
            self.engine.dispatch(event);
        }
        self.engine.wait_idle().await;
    }

    async fn active_window(&self, window_id: WindowId) -> Option<tabflow::ActiveWindow> {
        match self.engine.request(Request::GetActiveWindow { window_id }).await {
            Ok(Response::ActiveWindow(window)) => window,
            other => panic!("unexpected response: {:?}", other),
        }
    }

    fn collapsed(&self, group_id: TabGroupId) -> bool {
        self.browser.tab_group(group_id).unwrap().collapsed
    }

    fn color(&self, group_id: TabGroupId) -> TabGroupColor {
        self.browser.tab_group(group_id).unwrap().color
    }

    fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

/// A window with one titled group per tab; the last tab is active
fn window_with_groups(
    browser: &InMemoryBrowser,
    groups: &[(&str, TabGroupColor)],
) -> (WindowId, Vec<TabId>, Vec<TabGroupId>) {
    let window_id = browser.open_window(WindowKind::Normal);
    let mut tabs = Vec::new();
    let mut group_ids = Vec::new();
    for (index, (title, color)) in groups.iter().enumerate() {
        let tab = browser.open_tab(window_id, title, index + 1 == groups.len());
        group_ids.push(browser.create_group(&[tab], *color, Some(title)).unwrap());
        tabs.push(tab);
    }
    (window_id, tabs, group_ids)
}

fn group_edits(mutations: &[Mutation], group_id: TabGroupId) -> Vec<TabGroupUpdate> {
    mutations
        .iter()
        .filter_map(|m| match m {
            Mutation::UpdateTabGroup { id, update } if *id == group_id => Some(update.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_active_window_serialization() {
    let json = r#"{
        "windowId": 3,
        "focusMode": {
            "colors": { "focused": "yellow", "nonFocused": "grey" },
            "savedTabGroupColors": [{ "tabGroupId": 8, "color": "red" }]
        },
        "tabGroups": [{
            "id": 8, "windowId": 3, "color": "grey", "collapsed": true,
            "title": "Work", "useTabTitle": false, "keepOpen": true
        }]
    }"#;
    let window: tabflow::ActiveWindow = serde_json::from_str(json).unwrap();
    assert_eq!(window.window_id, WindowId::new(3));
    let group = window.tab_group(TabGroupId::new(8)).unwrap();
    assert!(group.keep_open);
    assert_eq!(group.last_active_tab_id, None);
    assert_eq!(
        window.focus_mode.as_ref().unwrap().saved_color(TabGroupId::new(8)),
        Some(TabGroupColor::Red)
    );

    let back = serde_json::to_value(&window).unwrap();
    assert_eq!(back["tabGroups"][0]["keepOpen"], true);
    assert_eq!(back["focusMode"]["colors"]["nonFocused"], "grey");
}

#[tokio::test]
async fn test_collapse_unfocused_groups() {
    let harness = Harness::new(Preferences::default());
    let (window_id, tabs, groups) = window_with_groups(
        &harness.browser,
        &[
            ("Mail", TabGroupColor::Red),
            ("Docs", TabGroupColor::Blue),
            ("News", TabGroupColor::Green),
        ],
    );
    harness.browser.activate_tab(tabs[1]);
    harness.settle().await;

    assert!(harness.collapsed(groups[0]));
    assert!(!harness.collapsed(groups[1]));
    assert!(harness.collapsed(groups[2]));

    let window = harness.active_window(window_id).await.unwrap();
    let docs = window.tab_group(groups[1]).unwrap();
    assert_eq!(docs.last_active_tab_id, Some(tabs[1]));
    assert!(window.tab_group(groups[0]).unwrap().collapsed);

    harness.browser.activate_tab(tabs[0]);
    harness.settle().await;

    assert!(!harness.collapsed(groups[0]));
    assert!(harness.collapsed(groups[1]));
    assert!(harness.collapsed(groups[2]));
    assert!(harness.errors().is_empty());
}

#[tokio::test]
async fn test_stale_color_notification_is_ignored() {
    let harness = Harness::new(Preferences::default());
    let (window_id, _, groups) =
        window_with_groups(&harness.browser, &[("Work", TabGroupColor::Blue)]);
    harness.settle().await;
    assert_ok!(
        harness
            .engine
            .request(Request::ChangeFocusMode {
                window_id,
                enabled: true,
            })
            .await
    );
    harness.settle().await;
    assert_eq!(harness.color(groups[0]), TabGroupColor::Yellow);

    harness.browser.clear_mutations();
    let recolor = |color| TabGroupUpdate {
        color: Some(color),
        ..TabGroupUpdate::default()
    };
    harness.browser.edit_group(groups[0], &recolor(TabGroupColor::Red));
    harness.browser.edit_group(groups[0], &recolor(TabGroupColor::Blue));
    let mut events = harness.browser.take_events();
    assert_eq!(events.len(), 2);
    let newest = events.pop().unwrap();

    // The red notification describes a state that no longer exists
    harness.dispatch(events).await;
    assert!(harness.browser.mutations().is_empty());
    let window = harness.active_window(window_id).await.unwrap();
    assert_eq!(window.tab_group(groups[0]).unwrap().color, TabGroupColor::Yellow);

    // The blue one is current, and focus mode pulls the group back
    harness.dispatch(vec![newest]).await;
    let edits = group_edits(&harness.browser.mutations(), groups[0]);
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].color, Some(TabGroupColor::Yellow));
    assert_eq!(harness.color(groups[0]), TabGroupColor::Yellow);
    harness.settle().await;
    assert!(harness.errors().is_empty());
}

#[tokio::test]
async fn test_double_enable_is_rejected_and_suspends() {
    let harness = Harness::new(Preferences::default());
    let (window_id, _, _) = window_with_groups(&harness.browser, &[("Work", TabGroupColor::Red)]);
    harness.settle().await;

    let enable = Request::ChangeFocusMode {
        window_id,
        enabled: true,
    };
    assert_eq!(harness.engine.request(enable.clone()).await, Ok(Response::Done));
    harness.settle().await;
    let before = harness.active_window(window_id).await.unwrap().focus_mode;
    assert!(before.is_some());
    assert_eq!(
        harness.engine.request(enable).await,
        Err(EngineError::FocusModeAlreadyEnabled(window_id))
    );

    harness.engine.wait_idle().await;
    assert!(harness.engine.is_suspended());
    assert_eq!(harness.errors().len(), 1);
    assert!(harness.errors()[0].contains("already enabled"));

    // The rejected enable left the saved colors alone
    let after = harness.engine.cache().get(window_id).await.unwrap().unwrap();
    assert_eq!(after.focus_mode, before);
}

#[tokio::test]
async fn test_focus_mode_restores_colors() {
    let harness = Harness::new(Preferences::default());
    let browser = &harness.browser;
    let window_id = browser.open_window(WindowKind::Normal);
    let mail = browser.open_tab(window_id, "Mail", true);
    let docs = browser.open_tab(window_id, "Docs", false);
    let news = browser.open_tab(window_id, "News", false);
    let first = browser.create_group(&[mail], TabGroupColor::Red, Some("One")).unwrap();
    let second = browser.create_group(&[docs], TabGroupColor::Green, Some("Two")).unwrap();
    harness.settle().await;

    let request = |enabled| Request::ChangeFocusMode { window_id, enabled };
    assert_ok!(harness.engine.request(request(true)).await);
    harness.settle().await;
    assert_eq!(harness.color(first), TabGroupColor::Yellow);
    assert_eq!(harness.color(second), TabGroupColor::Grey);

    // Created while focus mode is on, so it has no saved color
    let third = browser.create_group(&[news], TabGroupColor::Pink, Some("Three")).unwrap();
    harness.settle().await;
    assert_eq!(harness.color(third), TabGroupColor::Grey);
    assert!(harness.collapsed(third));

    assert_ok!(harness.engine.request(request(false)).await);
    harness.settle().await;
    assert_eq!(harness.color(first), TabGroupColor::Red);
    assert_eq!(harness.color(second), TabGroupColor::Green);
    assert_eq!(harness.color(third), TabGroupColor::Blue);

    let window = harness.active_window(window_id).await.unwrap();
    assert!(window.focus_mode.is_none());
    assert_eq!(window.tab_group(second).unwrap().color, TabGroupColor::Green);
    assert!(harness.errors().is_empty());
}

#[tokio::test]
async fn test_focus_mode_restores_colors_after_user_recolor() {
    let harness = Harness::new(Preferences::default());
    let (window_id, _, groups) = window_with_groups(
        &harness.browser,
        &[
            ("Mail", TabGroupColor::Red),
            ("Docs", TabGroupColor::Green),
            ("News", TabGroupColor::Cyan),
        ],
    );
    harness.settle().await;

    let request = |enabled| Request::ChangeFocusMode { window_id, enabled };
    assert_ok!(harness.engine.request(request(true)).await);
    harness.settle().await;

    harness.browser.edit_group(
        groups[0],
        &TabGroupUpdate {
            color: Some(TabGroupColor::Pink),
            ..TabGroupUpdate::default()
        },
    );
    harness.settle().await;
    let colors: Vec<_> = groups.iter().map(|id| harness.color(*id)).collect();
    assert_eq!(
        colors,
        vec![TabGroupColor::Grey, TabGroupColor::Grey, TabGroupColor::Yellow]
    );

    assert_ok!(harness.engine.request(request(false)).await);
    harness.settle().await;
    let colors: Vec<_> = groups.iter().map(|id| harness.color(*id)).collect();
    assert_eq!(
        colors,
        vec![TabGroupColor::Red, TabGroupColor::Green, TabGroupColor::Cyan]
    );
    assert!(harness.errors().is_empty());
}

#[tokio::test]
async fn test_ui_patch_cannot_touch_engine_owned_fields() {
    let harness = Harness::new(Preferences::default());
    let (window_id, _, groups) =
        window_with_groups(&harness.browser, &[("Work", TabGroupColor::Blue)]);
    harness.settle().await;

    let recolor = Request::UpdateActiveWindow {
        window_id,
        patch: ActiveWindowPatch::new()
            .tab_group(TabGroupPatch::new(groups[0]).color(TabGroupColor::Pink)),
    };
    assert_eq!(
        harness.engine.request(recolor).await,
        Err(EngineError::EngineOwnedField { field: "color" })
    );
    let focus = Request::UpdateActiveWindow {
        window_id,
        patch: ActiveWindowPatch::new().focus_mode(None),
    };
    assert_err!(harness.engine.request(focus).await);
    assert!(!harness.engine.is_suspended());

    let keep_open = Request::UpdateActiveWindow {
        window_id,
        patch: ActiveWindowPatch::new().tab_group(TabGroupPatch::new(groups[0]).keep_open(true)),
    };
    let Ok(Response::ActiveWindow(Some(window))) = harness.engine.request(keep_open).await else {
        panic!("keepOpen patch was rejected");
    };
    let group = window.tab_group(groups[0]).unwrap();
    assert!(group.keep_open);
    assert_eq!(group.color, TabGroupColor::Blue);
    assert!(harness.errors().is_empty());
}

#[tokio::test]
async fn test_records_survive_restart() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("tabflow.test.sqlite");
    let browser = Arc::new(InMemoryBrowser::new());

    let first = Harness::with_browser(
        Arc::clone(&browser),
        Preferences::default(),
        Arc::new(SqliteWindowStore::new(&db_path).unwrap()),
    );
    let (window_id, _, groups) = window_with_groups(&browser, &[("Work", TabGroupColor::Cyan)]);
    first.settle().await;
    assert_ok!(
        first
            .engine
            .request(Request::ChangeFocusMode {
                window_id,
                enabled: true,
            })
            .await
    );
    first.settle().await;
    drop(first);

    let second = Harness::with_browser(
        Arc::clone(&browser),
        Preferences::default(),
        Arc::new(SqliteWindowStore::new(&db_path).unwrap()),
    );
    // A cold read is answered from the store before the full load
    let window = second.engine.cache().get(window_id).await.unwrap().unwrap();
    let focus_mode = window.focus_mode.as_ref().unwrap();
    assert_eq!(focus_mode.saved_color(groups[0]), Some(TabGroupColor::Cyan));

    second.engine.wait_idle().await;
    assert!(second.engine.cache().is_loaded());
    assert_eq!(second.engine.cache().get_all().await.unwrap().len(), 1);
    assert!(second.errors().is_empty());
}

#[tokio::test]
async fn test_startup_drops_closed_windows() {
    let store = InMemoryWindowStore::with_windows([tabflow::ActiveWindow::new(WindowId::new(500))]);
    let harness = Harness::with_store(Preferences::default(), Arc::new(store));
    harness.engine.wait_idle().await;

    assert!(harness.active_window(WindowId::new(500)).await.is_none());
    assert!(harness.errors().is_empty());
}

#[tokio::test]
async fn test_refused_edits_retry_within_one_operation() {
    let harness = Harness::new(Preferences::default());
    let (window_id, tabs, groups) = window_with_groups(
        &harness.browser,
        &[("Mail", TabGroupColor::Red), ("Docs", TabGroupColor::Blue)],
    );
    harness.settle().await;
    assert!(harness.collapsed(groups[0]));

    tokio::time::pause();
    harness.browser.clear_mutations();
    harness.browser.refuse_next_edits(3);
    let started = tokio::time::Instant::now();
    harness.browser.activate_tab(tabs[0]);
    for event in harness.browser.take_events() {
        harness.engine.dispatch(event);
    }

    // Queued behind the retrying operation, so it sees the finished edit
    let window = harness.active_window(window_id).await.unwrap();
    assert!(window.tab_group(groups[1]).unwrap().collapsed);
    assert!(started.elapsed() >= Duration::from_millis(300));

    let edits = group_edits(&harness.browser.mutations(), groups[1]);
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].collapsed, Some(true));
    assert!(harness.collapsed(groups[1]));
    assert!(harness.errors().is_empty());
}

#[tokio::test]
async fn test_timeout_suspends_queue() {
    let harness = Harness::new(Preferences::default());
    let (window_id, tabs, _) = window_with_groups(
        &harness.browser,
        &[("Mail", TabGroupColor::Red), ("Docs", TabGroupColor::Blue)],
    );
    harness.settle().await;

    tokio::time::pause();
    harness.browser.set_dragging(true);
    harness.browser.activate_tab(tabs[0]);
    harness.settle().await;

    assert!(harness.engine.is_suspended());
    let errors = harness.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("timed out"));

    let result = harness
        .engine
        .request(Request::GetActiveWindow { window_id })
        .await;
    assert_eq!(assert_err!(result), EngineError::QueueSuspended);
}

#[tokio::test]
async fn test_keep_open_group_stays_expanded() {
    let harness = Harness::new(Preferences::default());
    let (window_id, tabs, groups) = window_with_groups(
        &harness.browser,
        &[("Mail", TabGroupColor::Red), ("Docs", TabGroupColor::Blue)],
    );
    harness.settle().await;
    assert!(harness.collapsed(groups[0]));

    let keep_open = |enabled| Request::ChangeKeepTabGroupOpen {
        window_id,
        tab_group_id: groups[0],
        enabled,
    };
    assert_ok!(harness.engine.request(keep_open(true)).await);
    harness.settle().await;
    assert!(!harness.collapsed(groups[0]));

    harness.browser.activate_tab(tabs[0]);
    harness.settle().await;
    harness.browser.activate_tab(tabs[1]);
    harness.settle().await;
    assert!(!harness.collapsed(groups[0]));

    assert_ok!(harness.engine.request(keep_open(false)).await);
    harness.settle().await;
    assert!(harness.collapsed(groups[0]));

    let missing = harness
        .engine
        .request(Request::GetActiveWindowTabGroup {
            window_id,
            tab_group_id: TabGroupId::new(999),
        })
        .await;
    assert_eq!(missing, Ok(Response::TabGroup(None)));
    assert!(harness.errors().is_empty());
}

#[tokio::test]
async fn test_always_group_tabs_and_title_sync() {
    let harness = Harness::new(Preferences {
        always_group_tabs: true,
        ..Preferences::default()
    });
    let browser = &harness.browser;
    let window_id = browser.open_window(WindowKind::Normal);
    let alpha = browser.open_tab(window_id, "Alpha", true);
    harness.settle().await;

    let group_id = browser.tab(alpha).unwrap().group_id.unwrap();
    assert_eq!(browser.tab_group(group_id).unwrap().title.as_deref(), Some("Alpha"));
    let window = harness.active_window(window_id).await.unwrap();
    let record = window.tab_group(group_id).unwrap();
    assert!(record.use_tab_title);
    assert_eq!(record.last_active_tab_id, Some(alpha));

    // A background tab joins the active tab's group
    let beta = browser.open_tab(window_id, "Beta", false);
    harness.settle().await;
    assert_eq!(browser.tab(beta).unwrap().group_id, Some(group_id));

    browser.set_tab_title(alpha, "An extremely long tab title that keeps going");
    harness.settle().await;
    assert_eq!(
        browser.tab_group(group_id).unwrap().title.as_deref(),
        Some("An extremely long tab title th")
    );
    assert!(harness.errors().is_empty());
}

#[tokio::test]
async fn test_closed_window_record_is_dropped() {
    let harness = Harness::new(Preferences::default());
    let (window_id, _, _) = window_with_groups(&harness.browser, &[("Work", TabGroupColor::Red)]);
    harness.settle().await;
    assert!(harness.active_window(window_id).await.is_some());

    harness.browser.close_window(window_id);
    harness.settle().await;
    assert!(harness.active_window(window_id).await.is_none());
    assert!(harness.errors().is_empty());
}

#[tokio::test]
async fn test_deactivate_restores_colors_and_forgets_window() {
    let harness = Harness::new(Preferences::default());
    let (window_id, _, groups) =
        window_with_groups(&harness.browser, &[("Work", TabGroupColor::Purple)]);
    harness.settle().await;

    assert_ok!(
        harness
            .engine
            .request(Request::ChangeFocusMode {
                window_id,
                enabled: true,
            })
            .await
    );
    harness.settle().await;
    assert_eq!(harness.color(groups[0]), TabGroupColor::Yellow);

    let response = harness
        .engine
        .request(Request::ChangeActivateCurrentWindow {
            window_id,
            enabled: false,
        })
        .await;
    assert_eq!(response, Ok(Response::ActiveWindow(None)));
    harness.settle().await;
    assert_eq!(harness.color(groups[0]), TabGroupColor::Purple);
    assert!(harness.active_window(window_id).await.is_none());

    let response = harness
        .engine
        .request(Request::ChangeActivateCurrentWindow {
            window_id,
            enabled: true,
        })
        .await;
    let Ok(Response::ActiveWindow(Some(window))) = response else {
        panic!("unexpected response: {:?}", response);
    };
    assert!(window.has_tab_group(groups[0]));
    assert!(harness.errors().is_empty());
}
