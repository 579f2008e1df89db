use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::FunnelConfig;
use crate::features::{category_analysis, relevant_review_digest, UserHistory, UserPreferenceProfile};
use crate::mention::detect_mentions;
use crate::oracle::Oracle;
use crate::prefilter::{prefilter, CandidateDetail, MIN_CANDIDATES};
use crate::store::{DataTool, UNKNOWN};

use super::combine::{combine, MIN_RESULTS};
use super::stages::{IntentEvidence, StageRunner, UserContext};
use super::trace::TraceSink;
use super::types::{FunnelError, RecommendationResponse, RecommendationTask};

/// Review digest size for primary screening.
pub const SCREENING_DIGEST_LIMIT: usize = 6;

/// Runs the recommendation funnel. Holds no per-request state, so one
/// instance can serve concurrent requests.
pub struct Recommender {
    oracle: Arc<dyn Oracle>,
    tool: Arc<dyn DataTool>,
    config: FunnelConfig,
    trace: Option<Arc<dyn TraceSink>>,
}

impl Recommender {
    pub fn new(oracle: Arc<dyn Oracle>, tool: Arc<dyn DataTool>, config: FunnelConfig) -> Self {
        Self {
            oracle,
            tool,
            config,
            trace: None,
        }
    }

    pub fn with_trace(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace = Some(sink);
        self
    }

    /// Never fails: any stage error degrades to the first five raw candidates.
    pub async fn recommend(&self, task: &RecommendationTask) -> RecommendationResponse {
        let request_id = Uuid::new_v4().to_string();
        info!(
            request_id = %request_id,
            user_id = %task.user_id,
            candidates = task.candidate_list.len(),
            "recommendation started"
        );

        match self.run(task, &request_id).await {
            Ok(response) => {
                info!(request_id = %request_id, item_list = ?response.item_list, "recommendation complete");
                response
            }
            Err(err) => {
                warn!(
                    request_id = %request_id,
                    error = %err,
                    stage = %err.stage(),
                    "funnel failed; returning leading raw candidates"
                );
                RecommendationResponse::new(
                    task.candidate_list.iter().take(MIN_RESULTS).cloned().collect(),
                )
            }
        }
    }

    async fn run(
        &self,
        task: &RecommendationTask,
        request_id: &str,
    ) -> Result<RecommendationResponse, FunnelError> {
        let tool = self.tool.as_ref();

        let filtered = prefilter(&task.candidate_list, tool);
        if filtered.is_short() {
            info!(
                request_id,
                survivors = filtered.candidates.len(),
                min = MIN_CANDIDATES,
                "too few candidates after pre-filter; skipping funnel"
            );
            return Ok(RecommendationResponse::new(filtered.ids()));
        }
        let candidates = filtered.candidates;

        let history = UserHistory::load(&task.user_id, tool);
        let profile = UserPreferenceProfile::from_history(&history);

        let user_name = tool.get_user(&task.user_id).map(|u| u.name).unwrap_or_default();
        let display_name = if user_name.trim().is_empty() {
            task.user_id.clone()
        } else {
            user_name.clone()
        };
        let candidate_ids: Vec<String> = candidates.iter().map(|c| c.item_id.clone()).collect();
        let mentions = detect_mentions(&user_name, &candidate_ids, tool);
        if mentions.venue_count() > 0 {
            info!(
                request_id,
                venues = mentions.venue_count(),
                forwarded = mentions.is_signal(),
                "user name mentioned in candidate reviews"
            );
        }

        let categories = offered_categories(&candidates);
        let evidence = IntentEvidence {
            candidate_category: task.candidate_category.clone(),
            category_analysis: category_analysis(&profile, &categories),
            review_digest: relevant_review_digest(&history, &categories, history.len()),
            mention_context: mentions.context(),
        };

        let runner = StageRunner {
            oracle: self.oracle.as_ref(),
            config: &self.config,
            trace: self.trace.as_deref(),
            request_id,
            user_id: &task.user_id,
        };
        let user = UserContext {
            display_name: &display_name,
            profile: &profile,
        };

        let intent = runner.intent_analysis(user, &evidence).await?;

        let all_categories: Vec<String> = unique(candidates.iter().map(|c| c.category.clone()));
        let screening_digest = relevant_review_digest(&history, &all_categories, SCREENING_DIGEST_LIMIT);
        let shortlist = runner
            .primary_screening(user, &intent, &candidates, &screening_digest)
            .await?;

        let primary = runner
            .final_selection(user, &intent, &shortlist, &candidates)
            .await?;

        let secondary = runner
            .secondary_selection(user, &intent, &candidates, &primary.ids)
            .await?;
        let secondary_ids: Vec<String> = secondary.iter().map(|p| p.venue_id.clone()).collect();

        Ok(RecommendationResponse::new(combine(
            &primary.ids,
            &secondary_ids,
            &candidates,
        )))
    }
}

/// Distinct known categories among the candidates, first-seen order.
fn offered_categories(candidates: &[CandidateDetail]) -> Vec<String> {
    unique(
        candidates
            .iter()
            .filter(|c| c.category != UNKNOWN)
            .map(|c| c.category.clone()),
    )
}

fn unique(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}
