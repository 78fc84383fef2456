//! SQLite-based active window storage

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use rusqlite_migration::{M, Migrations};

use super::WindowStore;
use crate::models::{
    ActiveWindow, ActiveWindowTabGroup, FocusMode, TabGroupColor, TabGroupId, TabId, WindowId,
};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- One row per managed window; focus mode is stored as JSON
            CREATE TABLE active_windows (
                window_id INTEGER PRIMARY KEY,
                focus_mode TEXT
            );

            -- Tracked tab groups, in insertion order per window
            CREATE TABLE active_window_tab_groups (
                id INTEGER NOT NULL,
                window_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                color TEXT NOT NULL,
                collapsed INTEGER NOT NULL DEFAULT 0,
                title TEXT,
                use_tab_title INTEGER NOT NULL DEFAULT 0,
                last_active_tab_id INTEGER,
                keep_open INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (window_id, id),
                FOREIGN KEY (window_id) REFERENCES active_windows(window_id) ON DELETE CASCADE
            );

            CREATE INDEX idx_active_window_tab_groups_position
                ON active_window_tab_groups(window_id, position);
            "#,
        ),
    ])
}

/// Raw tab group row before color parsing
type TabGroupRow = (i64, i64, String, bool, Option<String>, bool, Option<i64>, bool);

/// SQLite implementation of [`WindowStore`]
pub struct SqliteWindowStore {
    conn: Mutex<Connection>,
}

impl SqliteWindowStore {
    /// Open (or create) the store at `db_path` and run migrations
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;
        Self::from_connection(conn, true)
    }

    /// Open a private in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn, false)
    }

    fn from_connection(mut conn: Connection, wal: bool) -> Result<Self> {
        // WAL keeps readers unblocked while the write-through task commits.
        // foreign_keys is required for ON DELETE CASCADE on the group table.
        if wal {
            conn.execute_batch(
                r#"
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                "#,
            )?;
        }
        conn.execute_batch(
            r#"
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load_tab_groups(conn: &Connection, window_id: WindowId) -> Result<Vec<ActiveWindowTabGroup>> {
        let mut stmt = conn.prepare(
            "SELECT id, window_id, color, collapsed, title, use_tab_title, last_active_tab_id, keep_open
             FROM active_window_tab_groups
             WHERE window_id = ?
             ORDER BY position ASC",
        )?;
        let rows = stmt
            .query_map([window_id.get()], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<TabGroupRow>>>()?;

        rows.into_iter()
            .map(
                |(id, window_id, color, collapsed, title, use_tab_title, last_active, keep_open)|
                 -> Result<ActiveWindowTabGroup> {
                    let color = color
                        .parse::<TabGroupColor>()
                        .map_err(anyhow::Error::msg)?;
                    Ok(ActiveWindowTabGroup {
                        id: TabGroupId::new(id),
                        window_id: WindowId::new(window_id),
                        color,
                        collapsed,
                        title,
                        use_tab_title,
                        last_active_tab_id: last_active.map(TabId::new),
                        keep_open,
                    })
                },
            )
            .collect()
    }

    fn load_window(
        conn: &Connection,
        window_id: WindowId,
        focus_mode_json: Option<String>,
    ) -> Result<ActiveWindow> {
        let focus_mode = focus_mode_json
            .map(|json| serde_json::from_str::<FocusMode>(&json))
            .transpose()
            .with_context(|| format!("Corrupt focus mode for window {}", window_id))?;
        Ok(ActiveWindow {
            window_id,
            focus_mode,
            tab_groups: Self::load_tab_groups(conn, window_id)?,
        })
    }

    fn save_tab_groups(tx: &Transaction<'_>, window: &ActiveWindow) -> Result<()> {
        tx.execute(
            "DELETE FROM active_window_tab_groups WHERE window_id = ?",
            [window.window_id.get()],
        )?;
        let mut stmt = tx.prepare(
            "INSERT INTO active_window_tab_groups
             (id, window_id, position, color, collapsed, title, use_tab_title, last_active_tab_id, keep_open)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for (position, group) in window.tab_groups.iter().enumerate() {
            stmt.execute(params![
                group.id.get(),
                window.window_id.get(),
                position as i64,
                group.color.as_str(),
                group.collapsed,
                group.title,
                group.use_tab_title,
                group.last_active_tab_id.map(TabId::get),
                group.keep_open,
            ])?;
        }
        Ok(())
    }

    fn focus_mode_json(window: &ActiveWindow) -> Result<Option<String>> {
        Ok(window
            .focus_mode
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?)
    }
}

impl WindowStore for SqliteWindowStore {
    fn get(&self, window_id: WindowId) -> Result<Option<ActiveWindow>> {
        let conn = self.conn();

        let row: Option<Option<String>> = conn
            .query_row(
                "SELECT focus_mode FROM active_windows WHERE window_id = ?",
                [window_id.get()],
                |row| row.get(0),
            )
            .optional()?;

        match row {
            Some(focus_mode) => Ok(Some(Self::load_window(&conn, window_id, focus_mode)?)),
            None => Ok(None),
        }
    }

    fn get_all(&self) -> Result<Vec<ActiveWindow>> {
        let conn = self.conn();

        let mut stmt =
            conn.prepare("SELECT window_id, focus_mode FROM active_windows ORDER BY window_id ASC")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<(i64, Option<String>)>>>()?;

        rows.into_iter()
            .map(|(id, focus_mode)| Self::load_window(&conn, WindowId::new(id), focus_mode))
            .collect()
    }

    fn add(&self, window: &ActiveWindow) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM active_windows WHERE window_id = ?)",
            [window.window_id.get()],
            |row| row.get(0),
        )?;
        if exists {
            bail!("Window {} is already stored", window.window_id);
        }

        tx.execute(
            "INSERT INTO active_windows (window_id, focus_mode) VALUES (?, ?)",
            params![window.window_id.get(), Self::focus_mode_json(window)?],
        )?;
        Self::save_tab_groups(&tx, window)?;
        tx.commit()?;

        Ok(())
    }

    fn update(&self, window: &ActiveWindow) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        // ON CONFLICT DO UPDATE rather than INSERT OR REPLACE: a replace
        // deletes the row first and would cascade to the group rows
        tx.execute(
            "INSERT INTO active_windows (window_id, focus_mode) VALUES (?, ?)
             ON CONFLICT(window_id) DO UPDATE SET focus_mode = excluded.focus_mode",
            params![window.window_id.get(), Self::focus_mode_json(window)?],
        )?;
        Self::save_tab_groups(&tx, window)?;
        tx.commit()?;

        Ok(())
    }

    fn remove(&self, window_id: WindowId) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM active_windows WHERE window_id = ?",
            [window_id.get()],
        )?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(
            "DELETE FROM active_window_tab_groups;
             DELETE FROM active_windows;",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FocusModeColors, SavedTabGroupColor};
    use tempfile::tempdir;

    fn create_test_store() -> (SqliteWindowStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        // Use .test.sqlite extension to clearly distinguish from production databases
        let db_path = dir.path().join("tabflow.test.sqlite");
        let store = SqliteWindowStore::new(&db_path).unwrap();
        (store, dir)
    }

    fn make_group(id: i64, window: i64, color: TabGroupColor) -> ActiveWindowTabGroup {
        ActiveWindowTabGroup {
            id: TabGroupId::new(id),
            window_id: WindowId::new(window),
            color,
            collapsed: id % 2 == 0,
            title: Some(format!("Group {}", id)),
            use_tab_title: false,
            last_active_tab_id: Some(TabId::new(id * 10)),
            keep_open: false,
        }
    }

    #[test]
    fn test_window_crud() {
        let (store, _dir) = create_test_store();

        let window = ActiveWindow::new(WindowId::new(1)).with_tab_groups(vec![
            make_group(12, 1, TabGroupColor::Red),
            make_group(11, 1, TabGroupColor::Blue),
        ]);
        store.add(&window).unwrap();

        let loaded = store.get(WindowId::new(1)).unwrap().unwrap();
        assert_eq!(loaded, window);
        assert!(store.get(WindowId::new(2)).unwrap().is_none());
    }

    #[test]
    fn test_add_rejects_duplicate() {
        let (store, _dir) = create_test_store();
        store.add(&ActiveWindow::new(WindowId::new(1))).unwrap();
        assert!(store.add(&ActiveWindow::new(WindowId::new(1))).is_err());
    }

    #[test]
    fn test_update_replaces_groups_and_focus_mode() {
        let (store, _dir) = create_test_store();
        let window = ActiveWindow::new(WindowId::new(1))
            .with_tab_groups(vec![make_group(1, 1, TabGroupColor::Red)]);
        store.add(&window).unwrap();

        let focus_mode = FocusMode::new(
            FocusModeColors::default(),
            vec![SavedTabGroupColor {
                tab_group_id: TabGroupId::new(2),
                color: TabGroupColor::Pink,
            }],
        );
        let updated = ActiveWindow::new(WindowId::new(1))
            .with_tab_groups(vec![make_group(2, 1, TabGroupColor::Grey)])
            .with_focus_mode(focus_mode);
        store.update(&updated).unwrap();

        let loaded = store.get(WindowId::new(1)).unwrap().unwrap();
        assert_eq!(loaded, updated);
        assert_eq!(
            loaded.focus_mode.unwrap().saved_color(TabGroupId::new(2)),
            Some(TabGroupColor::Pink)
        );
    }

    #[test]
    fn test_update_inserts_missing_window() {
        let (store, _dir) = create_test_store();
        store.update(&ActiveWindow::new(WindowId::new(5))).unwrap();
        assert!(store.get(WindowId::new(5)).unwrap().is_some());
    }

    #[test]
    fn test_remove_cascades_groups() {
        let (store, _dir) = create_test_store();
        let window = ActiveWindow::new(WindowId::new(1))
            .with_tab_groups(vec![make_group(1, 1, TabGroupColor::Red)]);
        store.add(&window).unwrap();
        store.remove(WindowId::new(1)).unwrap();

        // Re-adding without groups must not resurrect the old rows
        store.add(&ActiveWindow::new(WindowId::new(1))).unwrap();
        let loaded = store.get(WindowId::new(1)).unwrap().unwrap();
        assert!(loaded.tab_groups.is_empty());
    }

    #[test]
    fn test_get_all_and_clear() {
        let (store, _dir) = create_test_store();
        store.add(&ActiveWindow::new(WindowId::new(3))).unwrap();
        store
            .add(
                &ActiveWindow::new(WindowId::new(1))
                    .with_tab_groups(vec![make_group(4, 1, TabGroupColor::Cyan)]),
            )
            .unwrap();

        let all = store.get_all().unwrap();
        let ids: Vec<i64> = all.iter().map(|w| w.window_id.get()).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(all[0].tab_groups.len(), 1);

        store.clear().unwrap();
        assert!(store.get_all().unwrap().is_empty());
    }

    #[test]
    fn test_reopen_keeps_records() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("tabflow.test.sqlite");
        {
            let store = SqliteWindowStore::new(&db_path).unwrap();
            store.add(&ActiveWindow::new(WindowId::new(7))).unwrap();
        }
        let store = SqliteWindowStore::new(&db_path).unwrap();
        assert!(store.get(WindowId::new(7)).unwrap().is_some());
    }
}
