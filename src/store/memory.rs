//! In-memory dataset, loaded from JSONL files or built up in tests.

use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use super::records::{Item, Review, User};
use super::{read_jsonl_if_present, DataTool, StoreError, ITEM_FILE, REVIEW_FILE, USER_FILE};

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    users: HashMap<String, User>,
    items: HashMap<String, Item>,
    reviews: Vec<Review>,
    by_user: HashMap<String, Vec<usize>>,
    by_item: HashMap<String, Vec<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `user.json`, `item.json` and `review.json` from `dir`.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        let mut store = Self::new();
        for user in read_jsonl_if_present::<User>(&dir.join(USER_FILE))? {
            store.insert_user(user);
        }
        for item in read_jsonl_if_present::<Item>(&dir.join(ITEM_FILE))? {
            store.insert_item(item);
        }
        for review in read_jsonl_if_present::<Review>(&dir.join(REVIEW_FILE))? {
            store.insert_review(review);
        }
        info!(
            users = store.users.len(),
            items = store.items.len(),
            reviews = store.reviews.len(),
            "loaded dataset"
        );
        Ok(store)
    }

    pub fn insert_user(&mut self, user: User) {
        self.users.insert(user.id.clone(), user);
    }

    pub fn insert_item(&mut self, item: Item) {
        self.items.insert(item.id.clone(), item);
    }

    pub fn insert_review(&mut self, review: Review) {
        let idx = self.reviews.len();
        self.by_user
            .entry(review.user_id.clone())
            .or_default()
            .push(idx);
        self.by_item
            .entry(review.item_id.clone())
            .or_default()
            .push(idx);
        self.reviews.push(review);
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.insert_user(user);
        self
    }

    pub fn with_item(mut self, item: Item) -> Self {
        self.insert_item(item);
        self
    }

    pub fn with_review(mut self, review: Review) -> Self {
        self.insert_review(review);
        self
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn reviews(&self) -> &[Review] {
        &self.reviews
    }

    fn collect(&self, index: &HashMap<String, Vec<usize>>, key: &str) -> Vec<Review> {
        index
            .get(key)
            .map(|idxs| idxs.iter().map(|&i| self.reviews[i].clone()).collect())
            .unwrap_or_default()
    }
}

impl DataTool for MemoryStore {
    fn get_item(&self, item_id: &str) -> Option<Item> {
        self.items.get(item_id).cloned()
    }

    fn get_user(&self, user_id: &str) -> Option<User> {
        self.users.get(user_id).cloned()
    }

    fn reviews_by_user(&self, user_id: &str) -> Vec<Review> {
        self.collect(&self.by_user, user_id)
    }

    fn reviews_by_item(&self, item_id: &str) -> Vec<Review> {
        self.collect(&self.by_item, item_id)
    }
}
