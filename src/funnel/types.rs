use std::fmt;

use serde::{Deserialize, Serialize};

use crate::oracle::OracleError;

/// Input of a recommendation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationTask {
    pub user_id: String,
    pub candidate_list: Vec<String>,
    #[serde(default)]
    pub candidate_category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub item_list: Vec<String>,
}

impl RecommendationResponse {
    pub fn new(item_list: Vec<String>) -> Self {
        Self { item_list }
    }
}

pub const PROFILE_UNAVAILABLE: &str = "user profile unavailable";
pub const PRIMARY_UNIDENTIFIED: &str = "primary need unidentified";
pub const SECONDARY_UNIDENTIFIED: &str = "secondary need unidentified";
pub const POTENTIAL_UNIDENTIFIED: &str = "potential need unidentified";

/// Stage 1 output. Every field is always populated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentAnalysis {
    pub user_profile: String,
    pub primary_need: String,
    pub secondary_need: String,
    pub potential_need: String,
}

impl Default for IntentAnalysis {
    fn default() -> Self {
        Self {
            user_profile: PROFILE_UNAVAILABLE.to_string(),
            primary_need: PRIMARY_UNIDENTIFIED.to_string(),
            secondary_need: SECONDARY_UNIDENTIFIED.to_string(),
            potential_need: POTENTIAL_UNIDENTIFIED.to_string(),
        }
    }
}

/// One Stage 2 shortlist entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenedVenue {
    pub venue_id: String,
    pub venue_name: String,
    pub selection_reason: String,
}

/// Stage 3 output: ordered ids, best first.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FinalSelection {
    pub ids: Vec<String>,
    pub rationale: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NeedType {
    Secondary,
    Potential,
}

impl NeedType {
    /// Anything but "potential" reads as secondary.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()) {
            Some(s) if s == "potential" => NeedType::Potential,
            _ => NeedType::Secondary,
        }
    }
}

/// One Stage 4 pick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecondaryPick {
    pub venue_id: String,
    pub venue_name: String,
    pub need_type: NeedType,
    pub selection_reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    IntentAnalysis,
    PrimaryScreening,
    FinalSelection,
    SecondarySelection,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::IntentAnalysis => "intent_analysis",
            Stage::PrimaryScreening => "primary_screening",
            Stage::FinalSelection => "final_selection",
            Stage::SecondarySelection => "secondary_selection",
        }
    }

    /// Caller label attached to oracle usage records.
    pub fn caller(&self) -> &'static str {
        match self {
            Stage::IntentAnalysis => "funnel::intent",
            Stage::PrimaryScreening => "funnel::primary_screening",
            Stage::FinalSelection => "funnel::final_selection",
            Stage::SecondarySelection => "funnel::secondary_selection",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FunnelError {
    #[error("{stage} oracle call failed: {source}")]
    Oracle {
        stage: Stage,
        #[source]
        source: OracleError,
    },
}

impl FunnelError {
    pub fn stage(&self) -> Stage {
        match self {
            FunnelError::Oracle { stage, .. } => *stage,
        }
    }
}
