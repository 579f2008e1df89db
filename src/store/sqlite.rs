//! SQLite-backed dataset.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::{info, warn};

use super::memory::MemoryStore;
use super::records::{Item, Review, User};
use super::{DataTool, StoreError};

#[derive(Clone)]
pub struct SqliteStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ImportStats {
    pub users: usize,
    pub items: usize,
    pub reviews: usize,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA synchronous=NORMAL;\
             CREATE TABLE IF NOT EXISTS users (\
               id TEXT PRIMARY KEY,\
               name TEXT NOT NULL\
             );\
             CREATE TABLE IF NOT EXISTS items (\
               id TEXT PRIMARY KEY,\
               name TEXT NOT NULL,\
               categories TEXT,\
               stars REAL NOT NULL,\
               city TEXT NOT NULL\
             );\
             CREATE TABLE IF NOT EXISTS reviews (\
               seq INTEGER PRIMARY KEY AUTOINCREMENT,\
               item_id TEXT NOT NULL,\
               user_id TEXT NOT NULL,\
               stars INTEGER NOT NULL,\
               text TEXT NOT NULL,\
               useful INTEGER NOT NULL,\
               date TEXT\
             );\
             CREATE INDEX IF NOT EXISTS reviews_by_user ON reviews(user_id, seq);\
             CREATE INDEX IF NOT EXISTS reviews_by_item ON reviews(item_id, seq);",
        )?;

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("FUNNEL_DB_PATH") {
            return PathBuf::from(path);
        }
        PathBuf::from(".venue_funnel.sqlite")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy every row of `source` into this database in one transaction.
    /// Users and items are upserted. Reviews of every venue that appears in
    /// `source` replace the stored ones, in source order.
    pub fn import(&self, source: &MemoryStore) -> Result<ImportStats, StoreError> {
        let mut guard = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let tx = guard.transaction()?;
        let mut stats = ImportStats {
            users: 0,
            items: 0,
            reviews: 0,
        };
        {
            let mut insert_user = tx.prepare(
                "INSERT INTO users (id, name) VALUES (?1, ?2) \
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            )?;
            for user in source.users() {
                insert_user.execute(params![user.id, user.name])?;
                stats.users += 1;
            }

            let mut insert_item = tx.prepare(
                "INSERT INTO items (id, name, categories, stars, city) VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(id) DO UPDATE SET \
                    name = excluded.name, \
                    categories = excluded.categories, \
                    stars = excluded.stars, \
                    city = excluded.city",
            )?;
            for item in source.items() {
                insert_item.execute(params![
                    item.id,
                    item.name,
                    item.categories,
                    item.stars,
                    item.city
                ])?;
                stats.items += 1;
            }

            // Reviews carry no id of their own, so a venue's reviews are
            // replaced wholesale rather than appended twice.
            let mut clear_reviews = tx.prepare("DELETE FROM reviews WHERE item_id = ?1")?;
            let mut cleared = HashSet::new();
            for review in source.reviews() {
                if cleared.insert(review.item_id.as_str()) {
                    clear_reviews.execute(params![review.item_id])?;
                }
            }

            let mut insert_review = tx.prepare(
                "INSERT INTO reviews (item_id, user_id, stars, text, useful, date) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for review in source.reviews() {
                insert_review.execute(params![
                    review.item_id,
                    review.user_id,
                    review.stars,
                    review.text,
                    review.useful,
                    review.date
                ])?;
                stats.reviews += 1;
            }
        }
        tx.commit()?;

        info!(
            path = %self.path.display(),
            users = stats.users,
            items = stats.items,
            reviews = stats.reviews,
            "imported dataset"
        );
        Ok(stats)
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Connection) -> Result<R, StoreError>,
    {
        let guard = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&guard)
    }

    fn reviews_where(&self, column: &'static str, key: &str) -> Vec<Review> {
        let result = self.with_conn(|conn| {
            let sql = format!(
                "SELECT item_id, user_id, stars, text, useful, date \
                 FROM reviews WHERE {column} = ?1 ORDER BY seq"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![key], review_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        });
        result.unwrap_or_else(|err| {
            warn!(error = %err, column, key, "review lookup failed; treating as empty");
            Vec::new()
        })
    }
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<Review> {
    Ok(Review {
        item_id: row.get(0)?,
        user_id: row.get(1)?,
        stars: row.get(2)?,
        text: row.get(3)?,
        useful: row.get(4)?,
        date: row.get(5)?,
    })
}

impl DataTool for SqliteStore {
    fn get_item(&self, item_id: &str) -> Option<Item> {
        let result = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, name, categories, stars, city FROM items WHERE id = ?1",
                    params![item_id],
                    |row| {
                        Ok(Item {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            categories: row.get(2)?,
                            stars: row.get(3)?,
                            city: row.get(4)?,
                        })
                    },
                )
                .optional()?)
        });
        result.unwrap_or_else(|err| {
            warn!(error = %err, item_id, "item lookup failed; treating as absent");
            None
        })
    }

    fn get_user(&self, user_id: &str) -> Option<User> {
        let result = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, name FROM users WHERE id = ?1",
                    params![user_id],
                    |row| {
                        Ok(User {
                            id: row.get(0)?,
                            name: row.get(1)?,
                        })
                    },
                )
                .optional()?)
        });
        result.unwrap_or_else(|err| {
            warn!(error = %err, user_id, "user lookup failed; treating as absent");
            None
        })
    }

    fn reviews_by_user(&self, user_id: &str) -> Vec<Review> {
        self.reviews_where("user_id", user_id)
    }

    fn reviews_by_item(&self, item_id: &str) -> Vec<Review> {
        self.reviews_where("item_id", item_id)
    }
}
