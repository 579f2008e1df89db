//! Review synthesis: one oracle call for a `{stars, review}` pair in the
//! user's voice, with a locally computed fallback.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::FunnelConfig;
use crate::features::{relevant_review_digest, ReviewStyleProfile, UserHistory};
use crate::lenient_json::{parse_object, str_field};
use crate::oracle::{Attribution, Oracle, OracleRequest};
use crate::prompts::REVIEW_WRITING;
use crate::store::DataTool;

pub const MAX_REVIEW_CHARS: usize = 120;
/// User's own reviews shown as style examples.
pub const STYLE_DIGEST_LIMIT: usize = 5;
/// Fallback sentences must be at least this long.
pub const MIN_FALLBACK_SENTENCE: usize = 20;

const GENERIC_REVIEW: &str = "This place has good quality.";
const MISSING_VENUE_REVIEW: &str = "This place seems decent.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewTask {
    pub user_id: String,
    pub item_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedReview {
    /// Always 1-5.
    pub stars: u8,
    /// At most [`MAX_REVIEW_CHARS`] characters.
    pub review: String,
}

pub struct ReviewWriter {
    oracle: Arc<dyn Oracle>,
    tool: Arc<dyn DataTool>,
    config: FunnelConfig,
}

impl ReviewWriter {
    pub fn new(oracle: Arc<dyn Oracle>, tool: Arc<dyn DataTool>, config: FunnelConfig) -> Self {
        Self {
            oracle,
            tool,
            config,
        }
    }

    pub async fn write(&self, task: &ReviewTask) -> GeneratedReview {
        let tool = self.tool.as_ref();
        let Some(item) = tool.get_item(&task.item_id) else {
            info!(item_id = %task.item_id, "venue not found; returning neutral review");
            return GeneratedReview {
                stars: 3,
                review: MISSING_VENUE_REVIEW.to_string(),
            };
        };

        let history = UserHistory::load(&task.user_id, tool);
        let style = ReviewStyleProfile::from_history(&history);
        let category = item.main_category();
        let venue_reviews = tool.reviews_by_item(&task.item_id);
        let venue_avg = item.declared_stars().unwrap_or_else(|| {
            if venue_reviews.is_empty() {
                3.0
            } else {
                venue_reviews.iter().map(|r| f64::from(r.stars)).sum::<f64>() / venue_reviews.len() as f64
            }
        });

        let summary = preference_summary(&style, &category);
        let digest = relevant_review_digest(&history, &[category.clone()], STYLE_DIGEST_LIMIT);
        let venue_avg = format!("{venue_avg:.1}");
        let prompt = REVIEW_WRITING.render(&[
            ("preference_summary", summary.as_str()),
            ("review_digest", digest.as_str()),
            ("venue_name", item.name.as_str()),
            ("venue_category", category.as_str()),
            ("venue_avg", venue_avg.as_str()),
        ]);
        if self.config.log_prompts {
            debug!(system = %prompt.system, user = %prompt.user, "rendered review prompt");
        }

        let req = OracleRequest::new(
            self.config.model.clone(),
            prompt.to_messages(),
            Attribution::new("review::write"),
        )
        .temperature(self.config.temperature)
        .max_tokens(self.config.max_tokens);

        let raw = match self.oracle.ask(req).await {
            Ok(reply) => reply.content,
            Err(err) => {
                warn!(error = %err, user_id = %task.user_id, item_id = %task.item_id, "review oracle call failed; using fallback");
                String::new()
            }
        };
        if self.config.log_prompts {
            debug!(response = %raw, "review oracle response");
        }
        parse_review_response(&raw, &style)
    }
}

fn preference_summary(style: &ReviewStyleProfile, category: &str) -> String {
    let mut parts = vec![
        format!(
            "Rating habits: {} stars on average over {} reviews",
            style.avg_rating, style.review_count
        ),
        format!("Positive reviews: {:.0}%", style.positive_ratio * 100.0),
    ];
    if let Some(stats) = style.category_preferences.get(category) {
        parts.push(format!(
            "In {category}: {} reviews, {} stars on average",
            stats.count, stats.avg_rating
        ));
    }
    parts.join("\n")
}

/// Accept the oracle's pair when `stars` is an integer in 1-5 and `review`
/// is non-blank; otherwise derive both from the style profile and the raw text.
pub fn parse_review_response(raw: &str, style: &ReviewStyleProfile) -> GeneratedReview {
    let obj = parse_object(raw);
    let stars = obj.get("stars").and_then(integer_stars);
    if let (Some(stars), Some(review)) = (stars, str_field(&obj, "review")) {
        return GeneratedReview {
            stars,
            review: truncate_review(review),
        };
    }

    debug!("review reply unusable; deriving fallback");
    GeneratedReview {
        stars: fallback_stars(style.avg_rating),
        review: truncate_review(&fallback_sentence(raw)),
    }
}

fn integer_stars(value: &Value) -> Option<u8> {
    let n = value.as_i64()?;
    (1..=5).contains(&n).then_some(n as u8)
}

fn fallback_stars(avg_rating: f64) -> u8 {
    avg_rating.round_ties_even().clamp(1.0, 5.0) as u8
}

fn fallback_sentence(raw: &str) -> String {
    raw.replace('\n', ". ")
        .split('.')
        .map(str::trim)
        .find(|s| s.chars().count() >= MIN_FALLBACK_SENTENCE)
        .unwrap_or(GENERIC_REVIEW)
        .to_string()
}

/// Cut to [`MAX_REVIEW_CHARS`]: 117 characters plus "...".
pub fn truncate_review(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= MAX_REVIEW_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(MAX_REVIEW_CHARS - 3).collect();
    cut.push_str("...");
    cut
}
