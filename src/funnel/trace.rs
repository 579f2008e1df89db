//! Per-stage trace capture for recommendation runs.

use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::types::Stage;

#[derive(Debug, Clone, Serialize)]
pub struct StageTrace {
    pub timestamp_ms: i64,
    pub request_id: String,
    pub user_id: String,
    pub stage: Stage,
    pub prompt_template_slug: String,
    pub prompt_hash: String,
    pub model: String,
    pub response_chars: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub padded: usize,
    pub output_ids: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("trace channel closed")]
    Closed,
    #[error("trace worker failed: {0}")]
    Join(String),
}

pub trait TraceSink: Send + Sync {
    fn record(&self, event: StageTrace) -> Result<(), TraceError>;
}

/// Appends one JSON line per stage from a background thread. The file is
/// flushed whenever a request finishes, so completed requests are readable
/// while the sink is still open.
#[derive(Clone)]
pub struct JsonlTraceSink {
    sender: mpsc::Sender<StageTrace>,
}

pub struct TraceWorker {
    handle: Option<std::thread::JoinHandle<Result<(), TraceError>>>,
}

impl TraceWorker {
    /// Wait for the writer to drain. Every sink clone must be dropped first.
    pub fn join(mut self) -> Result<(), TraceError> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| TraceError::Join("trace worker panicked".to_string()))?,
            None => Ok(()),
        }
    }
}

impl JsonlTraceSink {
    pub fn new(path: impl AsRef<Path>) -> Result<(Self, TraceWorker), TraceError> {
        let file = std::fs::File::create(path)?;
        let (sender, receiver) = mpsc::channel::<StageTrace>();
        let handle = std::thread::spawn(move || write_trace_loop(file, receiver));
        Ok((
            Self { sender },
            TraceWorker {
                handle: Some(handle),
            },
        ))
    }
}

impl TraceSink for JsonlTraceSink {
    fn record(&self, event: StageTrace) -> Result<(), TraceError> {
        self.sender.send(event).map_err(|_| TraceError::Closed)
    }
}

fn write_trace_loop(file: std::fs::File, receiver: mpsc::Receiver<StageTrace>) -> Result<(), TraceError> {
    let mut writer = BufWriter::new(file);
    for event in receiver {
        let line = serde_json::to_string(&event).map_err(|e| TraceError::Serde(e.to_string()))?;
        writeln!(writer, "{line}")?;
        if closes_request(&event) {
            writer.flush()?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// No further stage of the same request follows this event.
fn closes_request(event: &StageTrace) -> bool {
    event.error.is_some() || event.stage == Stage::SecondarySelection
}

pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
