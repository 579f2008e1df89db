//! Read-only access to users, venues and reviews.
//!
//! [`DataTool`] is the only view the funnel has of the dataset. Lookups never
//! fail from the caller's point of view: an id that cannot be resolved is
//! simply absent, and a backend that errors logs and reports nothing.

pub mod memory;
pub mod records;
pub mod sqlite;

use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::warn;

pub use memory::MemoryStore;
pub use records::{main_category, Item, Review, User, UNKNOWN};
pub use sqlite::{ImportStats, SqliteStore};

/// File names inside a dataset directory.
pub const USER_FILE: &str = "user.json";
pub const ITEM_FILE: &str = "item.json";
pub const REVIEW_FILE: &str = "review.json";

/// Synchronous, read-only dataset lookups. Safe for concurrent readers.
pub trait DataTool: Send + Sync {
    fn get_item(&self, item_id: &str) -> Option<Item>;
    fn get_user(&self, user_id: &str) -> Option<User>;
    /// All reviews written by a user, in source order.
    fn reviews_by_user(&self, user_id: &str) -> Vec<Review>;
    /// All reviews of a venue, in source order.
    fn reviews_by_item(&self, item_id: &str) -> Vec<Review>;
}

impl<T: DataTool + ?Sized> DataTool for std::sync::Arc<T> {
    fn get_item(&self, item_id: &str) -> Option<Item> {
        (**self).get_item(item_id)
    }

    fn get_user(&self, user_id: &str) -> Option<User> {
        (**self).get_user(user_id)
    }

    fn reviews_by_user(&self, user_id: &str) -> Vec<Review> {
        (**self).reviews_by_user(user_id)
    }

    fn reviews_by_item(&self, item_id: &str) -> Vec<Review> {
        (**self).reviews_by_item(item_id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

/// Read one JSON object per line. Blank and malformed lines are skipped with
/// a warning; a dataset with a few bad rows is still a usable dataset.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let file = std::fs::File::open(path)?;
    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(&line) {
            Ok(row) => rows.push(row),
            Err(err) => {
                skipped += 1;
                if skipped <= 5 {
                    warn!(
                        path = %path.display(),
                        line = line_no + 1,
                        error = %err,
                        "skipping malformed row"
                    );
                }
            }
        }
    }

    if skipped > 5 {
        warn!(path = %path.display(), skipped, "skipped malformed rows");
    }
    Ok(rows)
}

/// Read an optional dataset file; a missing file is an empty table.
pub(crate) fn read_jsonl_if_present<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    if path.exists() {
        read_jsonl(path)
    } else {
        warn!(path = %path.display(), "dataset file missing; treating as empty");
        Ok(Vec::new())
    }
}
