// Runs the uploaded script on the instance, streaming output to the job log,
// and classifies how the run ended.

use async_trait::async_trait;
use std::sync::Arc;

use crate::backend::RunScriptError;
use crate::execution_context::ExecutionContext;
use crate::job::FinishState;
use crate::step::{Step, StepAction, StepError};

pub struct RunScriptStep;

#[async_trait]
impl Step for RunScriptStep {
    fn name(&self) -> &'static str {
        "run_script"
    }

    async fn run(&self, context: &mut ExecutionContext) -> Result<StepAction, StepError> {
        let instance = context.instance()?;
        let job = Arc::clone(context.job());
        let scope = context.scope().clone();

        let mut writer = match job.log_writer(&scope).await {
            Ok(writer) => writer,
            Err(e) => {
                context
                    .trace()
                    .error(&format!("Couldn't open a log writer: {e:#}"));
                context.attempt().requeue().await?;
                return Ok(StepAction::Halt);
            }
        };

        // An instance that ignores the scope must not hold the pipeline past a
        // cancel. A result that is already available still wins.
        let outcome = tokio::select! {
            biased;
            result = instance.run_script(&scope, &mut *writer) => result,
            reason = scope.cancelled() => Err(RunScriptError::interrupted(reason)),
        };

        if let Err(e) = writer.close().await {
            context
                .trace()
                .warning(&format!("Couldn't close log writer: {e:#}"));
        }

        match outcome {
            Ok(result) => {
                context.trace().info(&format!(
                    "Script finished on instance {} (exit code {:?})",
                    instance.id(),
                    result.exit_code
                ));
                context.set_run_result(result);
                Ok(StepAction::Continue)
            }
            Err(err) => {
                let completed = err.result.completed;
                context.trace().error(&format!(
                    "Couldn't run script (completed={completed}): {err}"
                ));
                context.set_run_result(err.result);
                if completed {
                    context.attempt().finish(FinishState::Errored).await?;
                } else {
                    context.attempt().requeue().await?;
                }
                Ok(StepAction::Halt)
            }
        }
    }
}
