// worker-engine: Job execution core of the CI worker.
// Depends on `worker-sdk` and `worker-common`.
//
// Architecture:
//   ProcessorPool::run → Processor::run → JobRunner::run
//     → StepsRunner::run → per-step Step::run / Step::cleanup

pub mod backend;
pub mod cancellation;
pub mod context;
pub mod execution_context;
pub mod job;
pub mod job_runner;
pub mod processor;
pub mod script_generator;
pub mod state_bag;
pub mod step;
pub mod steps;
pub mod steps_runner;

#[cfg(test)]
pub(crate) mod test_support;

pub use backend::{Instance, Provider, RunResult, RunScriptError, StartAttributes};
pub use cancellation::CancellationRegistry;
pub use context::{CancelScope, ContextError};
pub use execution_context::ExecutionContext;
pub use job::{AttemptError, AttemptOutcome, FinishState, Job, JobAttempt, JobPayload, LogWriter};
pub use job_runner::JobRunner;
pub use processor::{JobQueue, PoolSummary, Processor, ProcessorPool};
pub use script_generator::{GenerateError, ScriptGenerator, WebScriptGenerator};
pub use state_bag::{StateBag, StateError};
pub use step::{Step, StepAction, StepError};
pub use steps_runner::{RunnerState, StepsOutcome, StepsRunner};
