// Step: one independently-failable unit of a job pipeline.

use async_trait::async_trait;
use thiserror::Error;

use crate::execution_context::ExecutionContext;
use crate::job::AttemptError;
use crate::state_bag::StateError;

/// What the runner does after a step's `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    /// Advance to the next step.
    Continue,
    /// Stop the pipeline and clean up what ran.
    Halt,
}

/// A pipeline assembly defect. Job failures are never reported this way:
/// steps classify those themselves and return `Halt`.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Attempt(#[from] AttemptError),
}

/// A step executed by the `StepsRunner`.
#[async_trait]
pub trait Step: Send + Sync {
    /// Stable name, for logs.
    fn name(&self) -> &'static str;

    /// Perform the step's work.
    async fn run(&self, context: &mut ExecutionContext) -> Result<StepAction, StepError>;

    /// Release whatever `run` acquired. Called in reverse order for every
    /// step whose `run` was invoked, however the pipeline ended.
    async fn cleanup(&self, _context: &mut ExecutionContext) {}
}
