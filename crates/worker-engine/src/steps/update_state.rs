// Marks the job started; cleanup reports the terminal state of a run that
// nobody else decided.

use async_trait::async_trait;

use crate::execution_context::ExecutionContext;
use crate::step::{Step, StepAction, StepError};

pub struct UpdateStateStep;

#[async_trait]
impl Step for UpdateStateStep {
    fn name(&self) -> &'static str {
        "update_state"
    }

    async fn run(&self, context: &mut ExecutionContext) -> Result<StepAction, StepError> {
        if let Err(e) = context.job().started().await {
            context
                .trace()
                .warning(&format!("Couldn't mark job as started: {e:#}"));
        }
        Ok(StepAction::Continue)
    }

    async fn cleanup(&self, context: &mut ExecutionContext) {
        let attempt = context.attempt();
        if attempt.is_decided() {
            return;
        }
        let Some(result) = context.run_result() else {
            return;
        };

        // A rejected decision is logged by the attempt itself.
        if result.completed {
            let _ = attempt.finish(result.finish_state()).await;
        } else {
            context
                .trace()
                .warning("Script run ended without completing; requeueing");
            let _ = attempt.requeue().await;
        }
    }
}
