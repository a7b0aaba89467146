// Job: the queued unit of work as seen by the execution core, plus the
// single-use attempt guard that records how one execution attempt ended.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;
use worker_sdk::TraceWriter;

use crate::context::CancelScope;

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// The build configuration delivered with a job. Sent verbatim (as JSON) to
/// the script rendering service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    /// Message type, e.g. `job:test`.
    #[serde(default, rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub job: JobInfo,

    #[serde(default)]
    pub source: SourceInfo,

    #[serde(default)]
    pub repository: RepositoryInfo,

    /// The build configuration, kept as an opaque JSON object.
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,

    #[serde(default)]
    pub timeouts: Timeouts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub number: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub slug: String,
}

/// Per-job timeout overrides, in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_silence: Option<u64>,
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Terminal state reported for an attempt that is not requeued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishState {
    /// The script ran and exited 0.
    Passed,
    /// The script ran and exited non-zero.
    Failed,
    /// The script ran but the run could not be reported as passed or failed.
    Errored,
}

impl std::fmt::Display for FinishState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FinishState::Passed => write!(f, "passed"),
            FinishState::Failed => write!(f, "failed"),
            FinishState::Errored => write!(f, "errored"),
        }
    }
}

/// Sink for the build's output stream.
#[async_trait]
pub trait LogWriter: Send {
    async fn write(&mut self, chunk: &[u8]) -> anyhow::Result<()>;

    /// Flush and close the sink. Writes after close are an error.
    async fn close(&mut self) -> anyhow::Result<()>;
}

/// A queued job. The queue owns it; a pipeline only borrows it for one
/// attempt.
#[async_trait]
pub trait Job: Send + Sync {
    fn payload(&self) -> &JobPayload;

    fn id(&self) -> u64 {
        self.payload().job.id
    }

    /// Acquire a sink for the build output.
    async fn log_writer(&self, scope: &CancelScope) -> anyhow::Result<Box<dyn LogWriter>>;

    /// Put the job back on the queue for another attempt.
    async fn requeue(&self) -> anyhow::Result<()>;

    /// Report that a worker has picked the job up.
    async fn received(&self) -> anyhow::Result<()>;

    /// Report that the build script is about to run.
    async fn started(&self) -> anyhow::Result<()>;

    /// Report the attempt's terminal state.
    async fn finish(&self, state: FinishState) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// JobAttempt
// ---------------------------------------------------------------------------

/// How an attempt ended, from the queue's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Requeued,
    Finished(FinishState),
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptOutcome::Requeued => write!(f, "requeued"),
            AttemptOutcome::Finished(state) => write!(f, "finished ({state})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    #[error("attempt already {existing}; refusing to mark it {attempted}")]
    AlreadyDecided {
        existing: AttemptOutcome,
        attempted: AttemptOutcome,
    },
}

/// One execution attempt of a job, with a single-use outcome.
///
/// The first call to [`requeue`](Self::requeue) or [`finish`](Self::finish)
/// decides the attempt; every later call is rejected before it reaches the
/// job. A failure reported by the job itself is logged and the decision
/// stands: the queue's own redelivery is the fallback.
pub struct JobAttempt {
    id: Uuid,
    job: Arc<dyn Job>,
    started_at: DateTime<Utc>,
    outcome: Mutex<Option<AttemptOutcome>>,
    trace: Arc<dyn TraceWriter>,
}

impl JobAttempt {
    pub fn new(job: Arc<dyn Job>, trace: Arc<dyn TraceWriter>) -> Self {
        Self::with_id(Uuid::new_v4(), job, trace)
    }

    pub fn with_id(id: Uuid, job: Arc<dyn Job>, trace: Arc<dyn TraceWriter>) -> Self {
        Self {
            id,
            job,
            started_at: Utc::now(),
            outcome: Mutex::new(None),
            trace,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn job(&self) -> &Arc<dyn Job> {
        &self.job
    }

    pub fn job_id(&self) -> u64 {
        self.job.id()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn outcome(&self) -> Option<AttemptOutcome> {
        *self.outcome.lock()
    }

    pub fn is_decided(&self) -> bool {
        self.outcome.lock().is_some()
    }

    /// Return the job to the queue. Terminal for this attempt.
    pub async fn requeue(&self) -> Result<(), AttemptError> {
        self.decide(AttemptOutcome::Requeued)?;
        self.trace.info(&format!("Requeueing job {}", self.job_id()));
        if let Err(e) = self.job.requeue().await {
            self.trace
                .error(&format!("Failed to requeue job {}: {:#}", self.job_id(), e));
        }
        Ok(())
    }

    /// Record the terminal state of this attempt.
    pub async fn finish(&self, state: FinishState) -> Result<(), AttemptError> {
        self.decide(AttemptOutcome::Finished(state))?;
        self.trace
            .info(&format!("Finishing job {} as {}", self.job_id(), state));
        if let Err(e) = self.job.finish(state).await {
            self.trace.error(&format!(
                "Failed to report job {} as {}: {:#}",
                self.job_id(),
                state,
                e
            ));
        }
        Ok(())
    }

    fn decide(&self, attempted: AttemptOutcome) -> Result<(), AttemptError> {
        let mut outcome = self.outcome.lock();
        if let Some(existing) = *outcome {
            let err = AttemptError::AlreadyDecided {
                existing,
                attempted,
            };
            self.trace.error(&format!("Job {}: {}", self.job.id(), err));
            return Err(err);
        }
        *outcome = Some(attempted);
        Ok(())
    }
}

impl std::fmt::Debug for JobAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobAttempt")
            .field("id", &self.id)
            .field("job_id", &self.job.id())
            .field("started_at", &self.started_at)
            .field("outcome", &self.outcome())
            .finish()
    }
}
