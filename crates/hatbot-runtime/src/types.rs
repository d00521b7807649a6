//! Runtime types.

use std::time::{Duration, Instant};

use serde::Serialize;

/// A provider/model pair eligible for selection, with its selection weight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    /// Opaque identifier, e.g. `"OpenAI: gpt-4o-mini"`.
    pub id: String,
    /// Number of consecutive selections per cycle. Must be at least 1.
    pub weight: i64,
}

impl Candidate {
    pub fn new(id: impl Into<String>, weight: i64) -> Self {
        Self {
            id: id.into(),
            weight,
        }
    }
}

impl<S: Into<String>> From<(S, i64)> for Candidate {
    fn from((id, weight): (S, i64)) -> Self {
        Self::new(id, weight)
    }
}

/// One item travelling through a job's channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// An incremental piece of generated text.
    Text(String),
    /// Terminal marker. Sent exactly once per job.
    End,
}

/// Lifecycle of a streamed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Spawned, waiting for admission.
    Created,
    /// Admitted; work is executing but nothing has been emitted yet.
    Running,
    /// Work has emitted at least one fragment.
    Streaming,
    /// Terminal marker enqueued.
    Done,
}

/// Snapshot of a job's progress and timing.
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub id: u64,
    pub state: JobState,
    /// When the work was admitted past the serialization lock.
    pub started_at: Option<Instant>,
    /// When the work returned (or failed).
    pub finished_at: Option<Instant>,
    /// Whether the job ended through the failure path.
    pub failed: bool,
    pub cancelled: bool,
}

impl JobInfo {
    /// Duration of the timed work region, once it has completed.
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end.saturating_duration_since(start)),
            _ => None,
        }
    }
}
