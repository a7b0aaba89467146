// Materializes the build script for the job.

use async_trait::async_trait;
use std::sync::Arc;

use crate::execution_context::ExecutionContext;
use crate::script_generator::ScriptGenerator;
use crate::step::{Step, StepAction, StepError};

pub struct GenerateScriptStep {
    generator: Arc<dyn ScriptGenerator>,
}

impl GenerateScriptStep {
    pub fn new(generator: Arc<dyn ScriptGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Step for GenerateScriptStep {
    fn name(&self) -> &'static str {
        "generate_script"
    }

    async fn run(&self, context: &mut ExecutionContext) -> Result<StepAction, StepError> {
        let job = Arc::clone(context.job());
        let result = self.generator.generate(context.scope(), job.payload()).await;

        match result {
            Ok(script) => {
                context
                    .trace()
                    .verbose(&format!("Generated script ({} bytes)", script.len()));
                context.set_script(script)?;
                Ok(StepAction::Continue)
            }
            Err(err) => {
                context
                    .trace()
                    .error(&format!("Couldn't generate build script: {err}"));
                context.attempt().requeue().await?;
                Ok(StepAction::Halt)
            }
        }
    }
}
