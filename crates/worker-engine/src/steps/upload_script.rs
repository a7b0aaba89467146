// Places the generated script on the leased instance.

use async_trait::async_trait;

use crate::execution_context::ExecutionContext;
use crate::step::{Step, StepAction, StepError};

pub struct UploadScriptStep;

#[async_trait]
impl Step for UploadScriptStep {
    fn name(&self) -> &'static str {
        "upload_script"
    }

    async fn run(&self, context: &mut ExecutionContext) -> Result<StepAction, StepError> {
        let instance = context.instance()?;
        let script = context.script()?.clone();

        if let Err(e) = instance.upload_script(context.scope(), &script).await {
            context.trace().error(&format!(
                "Couldn't upload script to instance {}: {e:#}",
                instance.id()
            ));
            context.attempt().requeue().await?;
            return Ok(StepAction::Halt);
        }

        Ok(StepAction::Continue)
    }
}
