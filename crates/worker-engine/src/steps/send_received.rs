// Tells the job it has been picked up. Best effort.

use async_trait::async_trait;

use crate::execution_context::ExecutionContext;
use crate::step::{Step, StepAction, StepError};

pub struct SendReceivedStep;

#[async_trait]
impl Step for SendReceivedStep {
    fn name(&self) -> &'static str {
        "send_received"
    }

    async fn run(&self, context: &mut ExecutionContext) -> Result<StepAction, StepError> {
        if let Err(e) = context.job().received().await {
            context
                .trace()
                .warning(&format!("Couldn't mark job as received: {e:#}"));
        }
        Ok(StepAction::Continue)
    }
}
