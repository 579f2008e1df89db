#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use venue_funnel::oracle::{Oracle, OracleError, OracleReply, OracleRequest};
use venue_funnel::store::{Item, MemoryStore, Review, User};

/// Answers with queued replies in order, then with `fallback`.
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<String>>,
    fallback: String,
    calls: AtomicUsize,
    requests: Mutex<Vec<OracleRequest>>,
}

impl ScriptedOracle {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
            fallback: "{}".to_string(),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replies `{}` to everything.
    pub fn silent() -> Self {
        Self::new(&[])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<OracleRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Concatenated user messages of every request.
    pub fn prompt_text(&self) -> String {
        self.requests()
            .iter()
            .flat_map(|r| r.messages.iter().map(|m| m.content.clone()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait::async_trait]
impl Oracle for ScriptedOracle {
    async fn ask(&self, req: OracleRequest) -> Result<OracleReply, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(req);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        Ok(OracleReply::text(reply))
    }
}

/// Fails every call with a non-retryable provider error.
pub struct FailingOracle {
    pub calls: AtomicUsize,
}

impl FailingOracle {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl Oracle for FailingOracle {
    async fn ask(&self, _req: OracleRequest) -> Result<OracleReply, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(OracleError::provider("test", "upstream exploded", false))
    }
}

pub fn item(id: &str, categories: &str, stars: f64) -> Item {
    Item {
        id: id.to_string(),
        name: format!("Venue {id}"),
        categories: Some(categories.to_string()),
        stars,
        city: "Philadelphia".to_string(),
    }
}

pub fn review(user_id: &str, item_id: &str, stars: u8, text: &str) -> Review {
    Review {
        item_id: item_id.to_string(),
        user_id: user_id.to_string(),
        stars,
        text: text.to_string(),
        useful: 0,
        date: Some("2020-01-01 12:00:00".to_string()),
    }
}

pub fn user(id: &str, name: &str) -> User {
    User {
        id: id.to_string(),
        name: name.to_string(),
    }
}

pub fn ids(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

/// Ten venues `v0..v9`; `v{i}` is rated `3.0 + 0.2 * i`, so `v9` is best.
/// User `u1` ("Dana") has reviewed two other venues.
pub fn ten_venue_store() -> MemoryStore {
    let mut store = MemoryStore::new()
        .with_user(user("u1", "Dana"))
        .with_item(item("home1", "Nail Salons, Beauty & Spas", 4.0))
        .with_item(item("home2", "Hair Salons", 4.5))
        .with_review(review("u1", "home1", 5, "Best pedicure in town, very clean."))
        .with_review(review("u1", "home2", 4, "Good cut, a bit pricey."));
    for i in 0..10 {
        let id = format!("v{i}");
        let category = if i % 2 == 0 { "Nail Salons" } else { "Hair Salons" };
        store.insert_item(item(&id, category, 3.0 + 0.2 * i as f64));
        store.insert_review(review("someone", &id, 4, "Friendly staff and fair prices."));
    }
    store
}

pub fn ten_ids() -> Vec<String> {
    (0..10).map(|i| format!("v{i}")).collect()
}
