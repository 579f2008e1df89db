//! The staged recommendation funnel.
//!
//! ```text
//! candidates -> prefilter -> intent -> screening (10) -> final (5)
//!                                                    \-> secondary (3)
//!            -> combine -> item_list
//! ```
//!
//! Stages run strictly in sequence. Each repairs its oracle output before the
//! next one sees it, so no id outside the pre-filtered pool can reach the
//! result.

pub mod combine;
pub mod recommend;
pub mod stages;
pub mod trace;
pub mod types;
pub mod validate;

pub use combine::{combine, interleave, MIN_RESULTS};
pub use recommend::Recommender;
pub use stages::{parse_final, parse_intent, parse_screening, parse_secondary};
pub use trace::{JsonlTraceSink, StageTrace, TraceError, TraceSink, TraceWorker};
pub use types::*;
pub use validate::{validate_and_pad, PadOrder, Validated};
