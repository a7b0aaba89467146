// StepsRunner: runs an ordered list of steps over one ExecutionContext.
// Halts on the first `Halt`, then cleans up every step that ran, last first.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;

use crate::execution_context::ExecutionContext;
use crate::step::{Step, StepAction};

/// Where the runner is in its single pass over the steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    NotStarted,
    /// The step at this index is in `run`.
    Running(usize),
    /// The step at this index halted (or failed); later steps are skipped.
    HaltedAfter(usize),
    /// Every step continued.
    Completed,
    CleaningUp,
    Done,
}

/// How a pipeline ended. The runner does not say why a step halted; the step
/// recorded that on the job attempt before halting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepsOutcome {
    /// Every step returned `Continue`.
    Completed,
    /// `step` returned `Halt`.
    Halted { step: &'static str },
    /// A contract error or panic stopped the pipeline. `step` is `None` when
    /// the runner itself refused to start.
    Aborted {
        step: Option<&'static str>,
        reason: String,
    },
}

impl StepsOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, StepsOutcome::Completed)
    }
}

/// Executes a fixed list of steps once.
pub struct StepsRunner {
    steps: Vec<Box<dyn Step>>,
    state: RunnerState,
}

impl StepsRunner {
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self {
            steps,
            state: RunnerState::NotStarted,
        }
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run all steps, then clean up the ones that ran in reverse order.
    pub async fn run(&mut self, context: &mut ExecutionContext) -> StepsOutcome {
        if self.state != RunnerState::NotStarted {
            context
                .trace()
                .error("Steps runner reused after it already ran; refusing to start");
            return StepsOutcome::Aborted {
                step: None,
                reason: format!("runner is {:?}", self.state),
            };
        }

        let mut outcome = StepsOutcome::Completed;
        let mut ran = 0;

        for (index, step) in self.steps.iter().enumerate() {
            transition(&mut self.state, RunnerState::Running(index), context);
            ran = index + 1;
            context.trace().verbose(&format!("Running step {}", step.name()));

            let result = AssertUnwindSafe(step.run(context)).catch_unwind().await;
            let stopped = match result {
                Ok(Ok(StepAction::Continue)) => None,
                Ok(Ok(StepAction::Halt)) => {
                    context
                        .trace()
                        .info(&format!("Step {} halted the pipeline", step.name()));
                    Some(StepsOutcome::Halted { step: step.name() })
                }
                Ok(Err(err)) => {
                    context.trace().error(&format!(
                        "Step {} failed with a pipeline error: {}",
                        step.name(),
                        err
                    ));
                    Some(StepsOutcome::Aborted {
                        step: Some(step.name()),
                        reason: err.to_string(),
                    })
                }
                Err(panic) => {
                    let reason = panic_message(panic.as_ref());
                    context
                        .trace()
                        .error(&format!("Step {} panicked: {}", step.name(), reason));
                    Some(StepsOutcome::Aborted {
                        step: Some(step.name()),
                        reason,
                    })
                }
            };

            if let Some(stopped) = stopped {
                transition(&mut self.state, RunnerState::HaltedAfter(index), context);
                outcome = stopped;
                break;
            }
        }

        if outcome.is_completed() {
            transition(&mut self.state, RunnerState::Completed, context);
        }

        transition(&mut self.state, RunnerState::CleaningUp, context);
        for step in self.steps[..ran].iter().rev() {
            context
                .trace()
                .verbose(&format!("Cleaning up step {}", step.name()));
            if let Err(panic) = AssertUnwindSafe(step.cleanup(context)).catch_unwind().await {
                context.trace().error(&format!(
                    "Cleanup of step {} panicked: {}",
                    step.name(),
                    panic_message(panic.as_ref())
                ));
            }
        }
        transition(&mut self.state, RunnerState::Done, context);

        outcome
    }
}

fn transition(state: &mut RunnerState, next: RunnerState, context: &ExecutionContext) {
    context
        .trace()
        .verbose(&format!("Steps runner {:?} -> {:?}", state, next));
    *state = next;
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
