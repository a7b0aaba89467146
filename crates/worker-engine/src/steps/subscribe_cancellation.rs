// Registers the attempt's scope so a cancel request for the job id reaches it.

use async_trait::async_trait;
use std::sync::Arc;

use crate::cancellation::CancellationRegistry;
use crate::execution_context::ExecutionContext;
use crate::step::{Step, StepAction, StepError};

pub struct SubscribeCancellationStep {
    registry: Arc<CancellationRegistry>,
}

impl SubscribeCancellationStep {
    pub fn new(registry: Arc<CancellationRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Step for SubscribeCancellationStep {
    fn name(&self) -> &'static str {
        "subscribe_cancellation"
    }

    async fn run(&self, context: &mut ExecutionContext) -> Result<StepAction, StepError> {
        let attempt = context.attempt();
        if let Some(previous) =
            self.registry
                .subscribe(attempt.job_id(), attempt.id(), context.scope().clone())
        {
            context.trace().warning(&format!(
                "Job {} was still subscribed by attempt {previous}; replacing it",
                attempt.job_id()
            ));
        }
        Ok(StepAction::Continue)
    }

    async fn cleanup(&self, context: &mut ExecutionContext) {
        let attempt = context.attempt();
        self.registry.unsubscribe(attempt.job_id(), attempt.id());
    }
}
