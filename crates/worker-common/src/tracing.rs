// Named trace sources carrying worker and job identity as structured fields.

use worker_sdk::TraceWriter;

/// A trace source for one component, optionally bound to one job attempt.
///
/// Every event carries `component` and `worker` fields; once bound with
/// [`Tracing::for_job`] it also carries `job_id` and `attempt_id`.
#[derive(Debug, Clone)]
pub struct Tracing {
    name: String,
    worker: String,
    job_id: Option<u64>,
    attempt_id: Option<String>,
}

impl Tracing {
    pub fn new(name: impl Into<String>, worker: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            worker: worker.into(),
            job_id: None,
            attempt_id: None,
        }
    }

    /// Derive a source bound to one job attempt.
    pub fn for_job(&self, job_id: u64, attempt_id: impl Into<String>) -> Self {
        Self {
            job_id: Some(job_id),
            attempt_id: Some(attempt_id.into()),
            ..self.clone()
        }
    }

    /// Get the name of this trace source.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn job_id(&self) -> Option<u64> {
        self.job_id
    }

    /// Log an error together with its full cause chain.
    pub fn error_chain(&self, context: &str, err: &anyhow::Error) {
        self.error(&format!("{context}: {err:#}"));
    }
}

// The job fields are empty strings when unbound so every event has the same
// field set.
macro_rules! emit {
    ($level:ident, $self:expr, $message:expr) => {
        tracing::$level!(
            component = %$self.name,
            worker = %$self.worker,
            job_id = $self.job_id,
            attempt_id = $self.attempt_id.as_deref().unwrap_or(""),
            "{}",
            $message
        )
    };
}

impl TraceWriter for Tracing {
    fn info(&self, message: &str) {
        emit!(info, self, message);
    }

    fn verbose(&self, message: &str) {
        emit!(debug, self, message);
    }

    fn warning(&self, message: &str) {
        emit!(warn, self, message);
    }

    fn error(&self, message: &str) {
        emit!(error, self, message);
    }
}

/// Hands out named trace sources that share the worker identity.
#[derive(Debug, Clone)]
pub struct TraceManager {
    worker: String,
}

impl TraceManager {
    pub fn new(worker: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
        }
    }

    /// Get (create) a named trace source.
    pub fn get(&self, name: &str) -> Tracing {
        Tracing::new(name, self.worker.clone())
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }
}
