//! Task dispatch on the `target` discriminant.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::config::FunnelConfig;
use crate::funnel::{RecommendationResponse, RecommendationTask, Recommender, TraceSink};
use crate::oracle::Oracle;
use crate::review::{GeneratedReview, ReviewTask, ReviewWriter};
use crate::store::DataTool;

pub const TARGET_RECOMMENDATION: &str = "recommendation";
pub const TARGET_REVIEW_WRITING: &str = "review_writing";

/// The only failures a caller ever sees.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Unknown target: {0}")]
    UnknownTarget(String),
    #[error("malformed {target} task: {message}")]
    MalformedTask { target: String, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    Recommendation(RecommendationTask),
    ReviewWriting(ReviewTask),
}

impl Task {
    /// Read a task object, choosing the mode from its `target` field.
    pub fn from_value(value: Value) -> Result<Self, AgentError> {
        let target = value
            .get("target")
            .and_then(Value::as_str)
            .ok_or_else(|| AgentError::MalformedTask {
                target: "unknown".to_string(),
                message: "missing string field `target`".to_string(),
            })?
            .to_string();

        let malformed = |err: serde_json::Error| AgentError::MalformedTask {
            target: target.clone(),
            message: err.to_string(),
        };
        match target.as_str() {
            TARGET_RECOMMENDATION => Ok(Task::Recommendation(
                serde_json::from_value(value).map_err(malformed)?,
            )),
            TARGET_REVIEW_WRITING => Ok(Task::ReviewWriting(
                serde_json::from_value(value).map_err(malformed)?,
            )),
            _ => Err(AgentError::UnknownTarget(target.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TaskOutput {
    Recommendation(RecommendationResponse),
    Review(GeneratedReview),
}

/// Entry point for both modes. Cheap to share behind an `Arc`.
pub struct Agent {
    recommender: Recommender,
    writer: ReviewWriter,
}

impl Agent {
    pub fn new(oracle: Arc<dyn Oracle>, tool: Arc<dyn DataTool>, config: FunnelConfig) -> Self {
        Self {
            recommender: Recommender::new(oracle.clone(), tool.clone(), config.clone()),
            writer: ReviewWriter::new(oracle, tool, config),
        }
    }

    pub fn with_trace(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.recommender = self.recommender.with_trace(sink);
        self
    }

    pub fn recommender(&self) -> &Recommender {
        &self.recommender
    }

    pub fn writer(&self) -> &ReviewWriter {
        &self.writer
    }

    pub async fn forward(&self, task: &Task) -> TaskOutput {
        match task {
            Task::Recommendation(t) => TaskOutput::Recommendation(self.recommender.recommend(t).await),
            Task::ReviewWriting(t) => TaskOutput::Review(self.writer.write(t).await),
        }
    }

    /// Parse and run a raw task object.
    pub async fn forward_value(&self, value: Value) -> Result<TaskOutput, AgentError> {
        let task = Task::from_value(value)?;
        Ok(self.forward(&task).await)
    }
}
