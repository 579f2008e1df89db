//! The four oracle stages.
//!
//! Each stage renders its prompt, makes one oracle call, parses the reply
//! leniently and repairs the selection with [`validate_and_pad`]. Parsing
//! never fails; only the oracle call itself can.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::FunnelConfig;
use crate::features::UserPreferenceProfile;
use crate::lenient_json::{array_field, id_value, parse_object, str_field};
use crate::oracle::{Attribution, Oracle, OracleRequest};
use crate::prefilter::CandidateDetail;
use crate::prompts::{
    format_shortlist, format_venue_listing, PromptInstance, FINAL_SELECTION, INTENT_ANALYSIS,
    PRIMARY_SCREENING, SECONDARY_SELECTION,
};
use crate::store::UNKNOWN;

use super::trace::{now_epoch_ms, StageTrace, TraceSink};
use super::types::{
    FinalSelection, FunnelError, IntentAnalysis, NeedType, ScreenedVenue, SecondaryPick, Stage,
};
use super::validate::{validate_and_pad, PadOrder, Validated};

pub const SCREENING_TARGET: usize = 10;
pub const FINAL_TARGET: usize = 5;
pub const SECONDARY_TARGET: usize = 3;

/// Who the funnel is recommending for, as the prompts describe them.
#[derive(Debug, Clone, Copy)]
pub struct UserContext<'a> {
    pub display_name: &'a str,
    pub profile: &'a UserPreferenceProfile,
}

impl UserContext<'_> {
    fn stats(&self) -> [(&'static str, String); 3] {
        [
            ("avg_rating", self.profile.avg_rating.to_string()),
            ("review_count", self.profile.review_count.to_string()),
            ("visited_avg", self.profile.visited_venues_avg_rating.to_string()),
        ]
    }
}

/// Inputs to intent analysis that are already rendered as prompt text.
#[derive(Debug, Clone, Default)]
pub struct IntentEvidence {
    pub candidate_category: String,
    pub category_analysis: String,
    pub review_digest: String,
    pub mention_context: String,
}

/// Runs stages for one request: one oracle, one config, one trace id.
pub struct StageRunner<'a> {
    pub oracle: &'a dyn Oracle,
    pub config: &'a FunnelConfig,
    pub trace: Option<&'a dyn TraceSink>,
    pub request_id: &'a str,
    pub user_id: &'a str,
}

impl StageRunner<'_> {
    async fn ask(&self, stage: Stage, prompt: &PromptInstance) -> Result<String, FunnelError> {
        if self.config.log_prompts {
            debug!(stage = %stage, system = %prompt.system, user = %prompt.user, "rendered prompt");
        }

        let req = OracleRequest::new(
            self.config.model.clone(),
            prompt.to_messages(),
            Attribution::new(stage.caller()),
        )
        .temperature(self.config.temperature)
        .max_tokens(self.config.max_tokens);

        match self.oracle.ask(req).await {
            Ok(reply) => {
                if self.config.log_prompts {
                    debug!(stage = %stage, response = %reply.content, "oracle response");
                }
                Ok(reply.content)
            }
            Err(source) => {
                let mut event = self.event(stage, prompt, "");
                event.error = Some(source.to_string());
                self.emit(event);
                Err(FunnelError::Oracle { stage, source })
            }
        }
    }

    fn event(&self, stage: Stage, prompt: &PromptInstance, response: &str) -> StageTrace {
        StageTrace {
            timestamp_ms: now_epoch_ms(),
            request_id: self.request_id.to_string(),
            user_id: self.user_id.to_string(),
            stage,
            prompt_template_slug: prompt.template_slug.to_string(),
            prompt_hash: prompt.fingerprint(),
            model: self.config.model.clone(),
            response_chars: response.chars().count(),
            accepted: 0,
            rejected: 0,
            padded: 0,
            output_ids: Vec::new(),
            error: None,
        }
    }

    fn emit(&self, event: StageTrace) {
        if let Some(sink) = self.trace {
            if let Err(err) = sink.record(event) {
                warn!(error = %err, "failed to record stage trace");
            }
        }
    }

    fn finish<T>(
        &self,
        stage: Stage,
        prompt: &PromptInstance,
        response: &str,
        validated: &Validated<T>,
        output_ids: Vec<String>,
    ) {
        if validated.padded > 0 {
            warn!(
                stage = %stage,
                accepted = validated.accepted(),
                rejected = validated.rejected,
                padded = validated.padded,
                "oracle selection short; padded from pool"
            );
        }
        info!(stage = %stage, selected = output_ids.len(), "stage complete");

        let mut event = self.event(stage, prompt, response);
        event.accepted = validated.accepted();
        event.rejected = validated.rejected;
        event.padded = validated.padded;
        event.output_ids = output_ids;
        self.emit(event);
    }

    /// Stage 1: describe the user and name three needs.
    pub async fn intent_analysis(
        &self,
        user: UserContext<'_>,
        evidence: &IntentEvidence,
    ) -> Result<IntentAnalysis, FunnelError> {
        let stats = user.stats();
        let mut vars: Vec<(&str, &str)> = stats.iter().map(|(k, v)| (*k, v.as_str())).collect();
        vars.extend([
            ("user_name", user.display_name),
            ("candidate_category", evidence.candidate_category.as_str()),
            ("category_analysis", evidence.category_analysis.as_str()),
            ("review_digest", evidence.review_digest.as_str()),
            ("mention_context", evidence.mention_context.as_str()),
        ]);
        let prompt = INTENT_ANALYSIS.render(&vars);

        let raw = self.ask(Stage::IntentAnalysis, &prompt).await?;
        let intent = parse_intent(&raw);
        info!(
            primary_need = %intent.primary_need,
            secondary_need = %intent.secondary_need,
            potential_need = %intent.potential_need,
            "intent analysis complete"
        );
        self.emit(self.event(Stage::IntentAnalysis, &prompt, &raw));
        Ok(intent)
    }

    /// Stage 2: shortlist up to ten venues for the primary need.
    pub async fn primary_screening(
        &self,
        user: UserContext<'_>,
        intent: &IntentAnalysis,
        candidates: &[CandidateDetail],
        review_digest: &str,
    ) -> Result<Vec<ScreenedVenue>, FunnelError> {
        let pool: Vec<&CandidateDetail> = candidates.iter().collect();
        let venues = format_venue_listing(&pool);
        let stats = user.stats();
        let mut vars: Vec<(&str, &str)> = stats.iter().map(|(k, v)| (*k, v.as_str())).collect();
        vars.extend([
            ("user_name", user.display_name),
            ("user_profile", intent.user_profile.as_str()),
            ("primary_need", intent.primary_need.as_str()),
            ("secondary_need", intent.secondary_need.as_str()),
            ("potential_need", intent.potential_need.as_str()),
            ("review_digest", review_digest),
            ("venues", venues.as_str()),
        ]);
        let prompt = PRIMARY_SCREENING.render(&vars);

        let raw = self.ask(Stage::PrimaryScreening, &prompt).await?;
        let validated = validate_and_pad(
            parse_screening(&raw),
            &pool,
            SCREENING_TARGET,
            PadOrder::RatingDesc,
            |v| v.venue_id.as_str(),
            |c| ScreenedVenue {
                venue_id: c.item_id.clone(),
                venue_name: c.name.clone(),
                selection_reason: format!("high-quality candidate (rating {})", c.avg_rating),
            },
        );
        let ids = validated.items.iter().map(|v| v.venue_id.clone()).collect();
        self.finish(Stage::PrimaryScreening, &prompt, &raw, &validated, ids);
        Ok(validated.items)
    }

    /// Stage 3: rank five of the shortlist, best first.
    pub async fn final_selection(
        &self,
        user: UserContext<'_>,
        intent: &IntentAnalysis,
        shortlist: &[ScreenedVenue],
        candidates: &[CandidateDetail],
    ) -> Result<FinalSelection, FunnelError> {
        let by_id: HashMap<&str, &CandidateDetail> =
            candidates.iter().map(|c| (c.item_id.as_str(), c)).collect();
        let entries: Vec<(&CandidateDetail, &str)> = shortlist
            .iter()
            .filter_map(|s| {
                by_id
                    .get(s.venue_id.as_str())
                    .map(|c| (*c, s.selection_reason.as_str()))
            })
            .collect();
        let pool: Vec<&CandidateDetail> = entries.iter().map(|(c, _)| *c).collect();

        let venues = format_shortlist(&entries);
        let stats = user.stats();
        let mut vars: Vec<(&str, &str)> = stats.iter().map(|(k, v)| (*k, v.as_str())).collect();
        vars.extend([
            ("user_profile", intent.user_profile.as_str()),
            ("primary_need", intent.primary_need.as_str()),
            ("venues", venues.as_str()),
        ]);
        let prompt = FINAL_SELECTION.render(&vars);

        let raw = self.ask(Stage::FinalSelection, &prompt).await?;
        let parsed = parse_final(&raw);
        let validated = validate_and_pad(
            parsed.ids,
            &pool,
            FINAL_TARGET,
            PadOrder::AsGiven,
            |id| id.as_str(),
            |c| c.item_id.clone(),
        );
        self.finish(Stage::FinalSelection, &prompt, &raw, &validated, validated.items.clone());
        Ok(FinalSelection {
            ids: validated.items,
            rationale: parsed.rationale,
        })
    }

    /// Stage 4: up to three venues for the secondary or potential need,
    /// never repeating a Stage 3 pick.
    pub async fn secondary_selection(
        &self,
        user: UserContext<'_>,
        intent: &IntentAnalysis,
        candidates: &[CandidateDetail],
        exclude: &[String],
    ) -> Result<Vec<SecondaryPick>, FunnelError> {
        let pool: Vec<&CandidateDetail> = candidates
            .iter()
            .filter(|c| !exclude.contains(&c.item_id))
            .collect();
        if pool.is_empty() {
            info!(stage = %Stage::SecondarySelection, "no venues left after primary picks; skipping");
            return Ok(Vec::new());
        }

        let venues = format_venue_listing(&pool);
        let stats = user.stats();
        let mut vars: Vec<(&str, &str)> = stats.iter().map(|(k, v)| (*k, v.as_str())).collect();
        vars.extend([
            ("user_name", user.display_name),
            ("user_profile", intent.user_profile.as_str()),
            ("secondary_need", intent.secondary_need.as_str()),
            ("potential_need", intent.potential_need.as_str()),
            ("venues", venues.as_str()),
        ]);
        let prompt = SECONDARY_SELECTION.render(&vars);

        let raw = self.ask(Stage::SecondarySelection, &prompt).await?;
        let validated = validate_and_pad(
            parse_secondary(&raw),
            &pool,
            SECONDARY_TARGET,
            PadOrder::RatingDesc,
            |p| p.venue_id.as_str(),
            |c| SecondaryPick {
                venue_id: c.item_id.clone(),
                venue_name: c.name.clone(),
                need_type: NeedType::Secondary,
                selection_reason: format!("high-quality fallback pick (rating {})", c.avg_rating),
            },
        );
        let ids = validated.items.iter().map(|p| p.venue_id.clone()).collect();
        self.finish(Stage::SecondarySelection, &prompt, &raw, &validated, ids);
        Ok(validated.items)
    }
}

/// Missing or blank fields fall back to fixed placeholders.
pub fn parse_intent(raw: &str) -> IntentAnalysis {
    let obj = parse_object(raw);
    let mut intent = IntentAnalysis::default();
    let fields = [
        ("user_profile", &mut intent.user_profile),
        ("primary_need", &mut intent.primary_need),
        ("secondary_need", &mut intent.secondary_need),
        ("potential_need", &mut intent.potential_need),
    ];
    for (key, slot) in fields {
        if let Some(value) = str_field(&obj, key) {
            *slot = value.to_string();
        }
    }
    intent
}

fn venue_entry(value: &Value) -> Option<(String, String, &serde_json::Map<String, Value>)> {
    let entry = value.as_object()?;
    let id = entry.get("venue_id").and_then(id_value)?;
    let name = str_field(entry, "venue_name").unwrap_or(UNKNOWN).to_string();
    Some((id, name, entry))
}

/// Stage 2 proposals, unvalidated.
pub fn parse_screening(raw: &str) -> Vec<ScreenedVenue> {
    let obj = parse_object(raw);
    array_field(&obj, "selected_venues")
        .iter()
        .filter_map(venue_entry)
        .map(|(venue_id, venue_name, entry)| ScreenedVenue {
            venue_id,
            venue_name,
            selection_reason: str_field(entry, "selection_reason")
                .unwrap_or("matches the primary need")
                .to_string(),
        })
        .collect()
}

/// Stage 3 proposals, unvalidated.
pub fn parse_final(raw: &str) -> FinalSelection {
    let obj = parse_object(raw);
    FinalSelection {
        ids: array_field(&obj, "final_recommendations")
            .iter()
            .filter_map(id_value)
            .collect(),
        rationale: str_field(&obj, "selection_rationale").map(str::to_string),
    }
}

/// Stage 4 proposals, unvalidated.
pub fn parse_secondary(raw: &str) -> Vec<SecondaryPick> {
    let obj = parse_object(raw);
    array_field(&obj, "recommended_venues")
        .iter()
        .filter_map(venue_entry)
        .map(|(venue_id, venue_name, entry)| SecondaryPick {
            venue_id,
            venue_name,
            need_type: NeedType::parse(str_field(entry, "need_type")),
            selection_reason: str_field(entry, "selection_reason")
                .unwrap_or("matches a secondary or potential need")
                .to_string(),
        })
        .collect()
}
