// ExecutionContext: the state shared by the steps of one job execution.
// Known collaborators and products are named fields; anything else goes in
// the `extensions` bag.

use bytes::Bytes;
use std::sync::Arc;
use worker_sdk::TraceWriter;

use crate::backend::{Instance, RunResult};
use crate::context::CancelScope;
use crate::job::{Job, JobAttempt};
use crate::state_bag::{StateBag, StateError};

/// State for one execution attempt. Created by the job runner, handed to each
/// step in turn, dropped when the attempt ends.
pub struct ExecutionContext {
    /// Cancellation and deadline for every blocking call of this attempt.
    scope: CancelScope,

    /// The borrowed job and its single-use outcome.
    attempt: Arc<JobAttempt>,

    /// Job-scoped trace source.
    trace: Arc<dyn TraceWriter>,

    /// Set by the start-instance step.
    instance: Option<Arc<dyn Instance>>,

    /// Set once by the generate-script step.
    script: Option<Bytes>,

    /// Set by the run-script step.
    run_result: Option<RunResult>,

    /// Extension data for custom steps.
    pub extensions: StateBag,
}

impl ExecutionContext {
    pub fn new(scope: CancelScope, attempt: Arc<JobAttempt>, trace: Arc<dyn TraceWriter>) -> Self {
        Self {
            scope,
            attempt,
            trace,
            instance: None,
            script: None,
            run_result: None,
            extensions: StateBag::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Ambient state
    // -----------------------------------------------------------------------

    pub fn scope(&self) -> &CancelScope {
        &self.scope
    }

    pub fn attempt(&self) -> &Arc<JobAttempt> {
        &self.attempt
    }

    pub fn job(&self) -> &Arc<dyn Job> {
        self.attempt.job()
    }

    pub fn trace(&self) -> &Arc<dyn TraceWriter> {
        &self.trace
    }

    // -----------------------------------------------------------------------
    // Products of earlier steps
    // -----------------------------------------------------------------------

    /// The leased instance. Missing means the pipeline has no start step
    /// before this one.
    pub fn instance(&self) -> Result<Arc<dyn Instance>, StateError> {
        self.instance
            .clone()
            .ok_or(StateError::MissingField("instance"))
    }

    pub fn has_instance(&self) -> bool {
        self.instance.is_some()
    }

    pub fn set_instance(&mut self, instance: Arc<dyn Instance>) {
        self.instance = Some(instance);
    }

    pub fn take_instance(&mut self) -> Option<Arc<dyn Instance>> {
        self.instance.take()
    }

    pub fn script(&self) -> Result<&Bytes, StateError> {
        self.script.as_ref().ok_or(StateError::MissingField("script"))
    }

    /// Store the generated script. It is produced once per attempt.
    pub fn set_script(&mut self, script: Bytes) -> Result<(), StateError> {
        if self.script.is_some() {
            return Err(StateError::AlreadySet("script"));
        }
        self.script = Some(script);
        Ok(())
    }

    pub fn run_result(&self) -> Option<RunResult> {
        self.run_result
    }

    pub fn set_run_result(&mut self, result: RunResult) {
        self.run_result = Some(result);
    }
}
