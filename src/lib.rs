#![forbid(unsafe_code)]

//! # venue-funnel
//!
//! Venue recommendation and review synthesis with an LLM as a fallible
//! ranking oracle.
//!
//! A recommendation request runs candidates through a deterministic
//! pre-filter, then four sequential oracle stages (intent analysis, primary
//! screening, final selection, secondary selection), and interleaves the
//! picks into a short ordered list. Every stage validates the oracle's answer
//! against the ids it was shown and pads deterministically when the answer is
//! short, malformed or missing, so a bad oracle can degrade the result but
//! never break the call.
//!
//! Review synthesis asks the oracle for a `{stars, review}` pair in the
//! user's voice and falls back to values derived from the user's history.
//!
//! ```no_run
//! use std::sync::Arc;
//! use venue_funnel::{Agent, FunnelConfig, MemoryStore, OpenRouterOracle};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let oracle = Arc::new(OpenRouterOracle::from_env()?);
//! let store = Arc::new(MemoryStore::load_dir("data")?);
//! let agent = Agent::new(oracle, store, FunnelConfig::from_env()?);
//! let out = agent
//!     .forward_value(serde_json::json!({
//!         "target": "review_writing",
//!         "user_id": "u1",
//!         "item_id": "i1"
//!     }))
//!     .await?;
//! println!("{}", serde_json::to_string(&out)?);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod features;
pub mod funnel;
pub mod lenient_json;
pub mod mention;
pub mod oracle;
pub mod prefilter;
pub mod prompts;
pub mod review;
pub mod store;

pub use agent::{Agent, AgentError, Task, TaskOutput};
pub use config::FunnelConfig;
pub use funnel::{
    FunnelError, JsonlTraceSink, RecommendationResponse, RecommendationTask, Recommender,
    StageTrace, TraceError, TraceSink, TraceWorker,
};
pub use oracle::{OpenRouterOracle, Oracle, OracleError, RetryingOracle, UsageSink};
pub use review::{GeneratedReview, ReviewTask, ReviewWriter};
pub use store::{DataTool, MemoryStore, SqliteStore, StoreError};
