// Leases an instance from the provider; cleanup releases it.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{Provider, StartAttributes};
use crate::context::CancelScope;
use crate::execution_context::ExecutionContext;
use crate::step::{Step, StepAction, StepError};

/// How long releasing an instance may take once the job is over.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5 * 60);

pub struct StartInstanceStep {
    provider: Arc<dyn Provider>,
    stop_timeout: Duration,
}

impl StartInstanceStep {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }
}

#[async_trait]
impl Step for StartInstanceStep {
    fn name(&self) -> &'static str {
        "start_instance"
    }

    async fn run(&self, context: &mut ExecutionContext) -> Result<StepAction, StepError> {
        let attributes = StartAttributes::from_payload(context.job().payload());
        context.trace().info(&format!(
            "Starting instance (language={}, os={})",
            attributes.language, attributes.os
        ));

        match self.provider.start(context.scope(), &attributes).await {
            Ok(instance) => {
                context
                    .trace()
                    .info(&format!("Started instance {}", instance.id()));
                context.set_instance(instance);
                Ok(StepAction::Continue)
            }
            Err(e) => {
                context
                    .trace()
                    .error(&format!("Couldn't start instance: {e:#}"));
                context.attempt().requeue().await?;
                Ok(StepAction::Halt)
            }
        }
    }

    async fn cleanup(&self, context: &mut ExecutionContext) {
        let Some(instance) = context.take_instance() else {
            return;
        };

        // The job scope may already be cancelled or past its deadline.
        let scope = CancelScope::new().with_timeout(self.stop_timeout);
        match instance.stop(&scope).await {
            Ok(()) => context
                .trace()
                .info(&format!("Stopped instance {}", instance.id())),
            Err(e) => context.trace().error(&format!(
                "Couldn't stop instance {}: {e:#}",
                instance.id()
            )),
        }
    }
}
