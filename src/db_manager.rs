//! SQLite-backed playlist document collection.

use std::path::Path;

use log::{debug, info};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::{
    protocol::PlaylistItem,
    remote::{FetchError, PersistError, RemoteStore},
};

pub struct DbManager {
    conn: Connection,
}

impl DbManager {
    /// Opens (or creates) the collection file. The parent directory must exist.
    pub fn new(db_path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    pub fn new_in_memory() -> Result<Self, rusqlite::Error> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, rusqlite::Error> {
        let db_manager = Self { conn };
        db_manager.initialize_schema()?;
        db_manager.migrate()?;
        Ok(db_manager)
    }

    fn initialize_schema(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS playlist (
                doc_id TEXT PRIMARY KEY,
                position INTEGER NOT NULL,
                title TEXT NOT NULL,
                subtitle TEXT,
                description TEXT,
                thumb TEXT,
                sources TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        // Collections created before skip support lack the column
        let mut stmt = self.conn.prepare("PRAGMA table_info(playlist)")?;
        let columns = stmt.query_map([], |row| row.get::<_, String>(1))?;
        let mut has_skip = false;
        for col in columns {
            if col? == "skip" {
                has_skip = true;
                break;
            }
        }

        if !has_skip {
            debug!("Adding skip column to playlist collection");
            self.conn.execute(
                "ALTER TABLE playlist ADD COLUMN skip INTEGER NOT NULL DEFAULT 0",
                [],
            )?;
        }
        Ok(())
    }

    pub fn count(&self) -> Result<usize, rusqlite::Error> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM playlist", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    /// Appends documents after the current last position. Missing keys get a
    /// fresh UUID.
    pub fn import_items(&mut self, items: Vec<PlaylistItem>) -> Result<usize, PersistError> {
        let offset = self.count()?;
        let imported = items.len();
        for (index, mut item) in items.into_iter().enumerate() {
            if item.doc_id.is_empty() {
                item.doc_id = Uuid::new_v4().to_string();
            }
            item.position = offset + index;
            let doc_id = item.doc_id.clone();
            self.persist_one(&doc_id, &item)?;
        }
        info!("Imported {} playlist documents", imported);
        Ok(imported)
    }
}

impl RemoteStore for DbManager {
    fn fetch_all(&mut self) -> Result<Vec<PlaylistItem>, FetchError> {
        let mut stmt = self.conn.prepare(
            "SELECT doc_id, position, title, subtitle, description, thumb, sources, skip
             FROM playlist ORDER BY position ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, bool>(7)?,
            ))
        })?;

        let mut items = Vec::new();
        for row in rows {
            let (doc_id, position, title, subtitle, description, thumb, sources, skip) = row?;
            let sources: Vec<String> =
                serde_json::from_str(&sources).map_err(|err| FetchError::Malformed {
                    doc_id: doc_id.clone(),
                    reason: err.to_string(),
                })?;
            let position = usize::try_from(position).map_err(|_| FetchError::Malformed {
                doc_id: doc_id.clone(),
                reason: format!("negative position {}", position),
            })?;
            items.push(PlaylistItem {
                doc_id,
                position,
                title,
                subtitle: subtitle.unwrap_or_default(),
                description: description.unwrap_or_default(),
                thumb: thumb.unwrap_or_default(),
                sources,
                skip,
            });
        }
        Ok(items)
    }

    fn persist_one(&mut self, doc_id: &str, item: &PlaylistItem) -> Result<(), PersistError> {
        let sources = serde_json::to_string(&item.sources)?;
        self.conn.execute(
            "INSERT INTO playlist (doc_id, position, title, subtitle, description, thumb, sources, skip)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(doc_id) DO UPDATE SET
                position = excluded.position,
                title = excluded.title,
                subtitle = excluded.subtitle,
                description = excluded.description,
                thumb = excluded.thumb,
                sources = excluded.sources,
                skip = excluded.skip",
            params![
                doc_id,
                item.position as i64,
                item.title,
                item.subtitle,
                item.description,
                item.thumb,
                sources,
                item.skip
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::DbManager;
    use crate::{playlist::test_items, remote::RemoteStore};

    #[test]
    fn test_fetch_all_orders_by_position() {
        let mut db = DbManager::new_in_memory().expect("failed to create in-memory db");
        let mut items = test_items(&["a", "b", "c"]);
        items[0].position = 2;
        items[2].position = 0;
        for item in &items {
            db.persist_one(&item.doc_id, item).expect("persist");
        }

        let fetched = db.fetch_all().expect("fetch");
        let keys: Vec<&str> = fetched.iter().map(|i| i.doc_id.as_str()).collect();
        assert_eq!(keys, vec!["c", "b", "a"]);
        assert_eq!(fetched[0].sources, vec!["https://cdn.example/c.mp4".to_string()]);
    }

    #[test]
    fn test_persist_one_overwrites_whole_document() {
        let mut db = DbManager::new_in_memory().expect("failed to create in-memory db");
        let mut item = test_items(&["a"]).remove(0);
        db.persist_one("a", &item).expect("persist");

        item.skip = true;
        item.position = 4;
        item.title = "Renamed".to_string();
        db.persist_one("a", &item).expect("persist");

        let fetched = db.fetch_all().expect("fetch");
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0], item);
    }

    #[test]
    fn test_import_items_appends_and_assigns_keys() {
        let mut db = DbManager::new_in_memory().expect("failed to create in-memory db");
        db.import_items(test_items(&["a"])).expect("import");
        let mut unnamed = test_items(&["x", "y"]);
        for item in &mut unnamed {
            item.doc_id.clear();
        }
        assert_eq!(db.import_items(unnamed).expect("import"), 2);

        let fetched = db.fetch_all().expect("fetch");
        assert_eq!(fetched.len(), 3);
        assert_eq!(
            fetched.iter().map(|i| i.position).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(fetched[1..].iter().all(|i| !i.doc_id.is_empty()));
    }

    #[test]
    fn test_malformed_sources_fail_fetch() {
        let mut db = DbManager::new_in_memory().expect("failed to create in-memory db");
        db.conn
            .execute(
                "INSERT INTO playlist (doc_id, position, title, sources) VALUES ('bad', 0, 't', 'nope')",
                [],
            )
            .expect("insert");
        assert!(db.fetch_all().is_err());
    }
}
