// JobRunner: runs one attempt of one job through the standard pipeline.
// Builds the execution context, applies the hard timeout, runs the steps and
// makes sure the attempt ends with an outcome.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use worker_common::constants::defaults::MAX_HARD_TIMEOUT_SECS;
use worker_common::{TraceManager, WorkerSettings};
use worker_sdk::TraceWriter;

use crate::backend::Provider;
use crate::cancellation::CancellationRegistry;
use crate::context::CancelScope;
use crate::execution_context::ExecutionContext;
use crate::job::{AttemptOutcome, FinishState, Job, JobAttempt};
use crate::script_generator::{ScriptGenerator, WebScriptGenerator};
use crate::step::Step;
use crate::steps::start_instance::DEFAULT_STOP_TIMEOUT;
use crate::steps::{
    GenerateScriptStep, RunScriptStep, SendReceivedStep, StartInstanceStep,
    SubscribeCancellationStep, UpdateStateStep, UploadScriptStep,
};
use crate::steps_runner::{StepsOutcome, StepsRunner};

/// Executes job attempts. Shared by every processor of a pool.
pub struct JobRunner {
    generator: Arc<dyn ScriptGenerator>,
    provider: Arc<dyn Provider>,
    cancellations: Arc<CancellationRegistry>,
    trace_manager: TraceManager,
    hard_timeout: Duration,
    stop_timeout: Duration,
}

impl JobRunner {
    pub fn new(
        generator: Arc<dyn ScriptGenerator>,
        provider: Arc<dyn Provider>,
        cancellations: Arc<CancellationRegistry>,
        trace_manager: TraceManager,
        hard_timeout: Duration,
    ) -> Self {
        Self {
            generator,
            provider,
            cancellations,
            trace_manager,
            hard_timeout,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    /// A runner that renders scripts with the web service named in `settings`.
    pub fn from_settings(
        settings: &WorkerSettings,
        provider: Arc<dyn Provider>,
        cancellations: Arc<CancellationRegistry>,
    ) -> Result<Self> {
        let generator = WebScriptGenerator::from_settings(settings)?;
        Ok(Self::new(
            Arc::new(generator),
            provider,
            cancellations,
            TraceManager::new(settings.worker_name.clone()),
            settings.hard_timeout(),
        ))
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn cancellations(&self) -> &Arc<CancellationRegistry> {
        &self.cancellations
    }

    pub fn trace_manager(&self) -> &TraceManager {
        &self.trace_manager
    }

    /// The standard pipeline, in execution order.
    pub fn build_steps(&self) -> Vec<Box<dyn Step>> {
        vec![
            Box::new(SubscribeCancellationStep::new(Arc::clone(&self.cancellations))),
            Box::new(GenerateScriptStep::new(Arc::clone(&self.generator))),
            Box::new(SendReceivedStep),
            Box::new(
                StartInstanceStep::new(Arc::clone(&self.provider))
                    .with_stop_timeout(self.stop_timeout),
            ),
            Box::new(UploadScriptStep),
            Box::new(UpdateStateStep),
            Box::new(RunScriptStep),
        ]
    }

    /// Run one attempt of `job` through the standard pipeline.
    pub async fn run(&self, job: Arc<dyn Job>, parent: &CancelScope) -> Result<AttemptOutcome> {
        let steps = self.build_steps();
        self.run_steps(job, steps, parent).await
    }

    /// Run one attempt of `job` through `steps`.
    ///
    /// Returns the attempt's outcome. An `Err` means the pipeline itself is
    /// broken (a contract error or a panic); the attempt has then been
    /// finished as errored.
    pub async fn run_steps(
        &self,
        job: Arc<dyn Job>,
        steps: Vec<Box<dyn Step>>,
        parent: &CancelScope,
    ) -> Result<AttemptOutcome> {
        let job_id = job.id();
        let attempt_id = Uuid::new_v4();
        let trace: Arc<dyn TraceWriter> = Arc::new(
            self.trace_manager
                .get("job_runner")
                .for_job(job_id, attempt_id.to_string()),
        );

        let hard_timeout = job
            .payload()
            .timeouts
            .hard_limit
            .filter(|secs| *secs > 0)
            .map(|secs| Duration::from_secs(secs.min(MAX_HARD_TIMEOUT_SECS)))
            .unwrap_or(self.hard_timeout);
        let scope = parent.with_timeout(hard_timeout);

        let attempt = Arc::new(JobAttempt::with_id(attempt_id, job, Arc::clone(&trace)));
        trace.info(&format!(
            "Starting job {job_id} (hard timeout {}s)",
            hard_timeout.as_secs()
        ));

        let mut context =
            ExecutionContext::new(scope.clone(), Arc::clone(&attempt), Arc::clone(&trace));
        let mut runner = StepsRunner::new(steps);
        let outcome = runner.run(&mut context).await;
        drop(context);

        if let Some(reason) = scope.error() {
            trace.info(&format!("Job {job_id} ended after its scope stopped: {reason}"));
        }

        if let StepsOutcome::Aborted { step, reason } = &outcome {
            if !attempt.is_decided() {
                let _ = attempt.finish(FinishState::Errored).await;
            }
            anyhow::bail!(
                "pipeline for job {job_id} aborted in {}: {reason}",
                step.unwrap_or("steps runner")
            );
        }

        match attempt.outcome() {
            Some(decided) => {
                trace.info(&format!("Job {job_id} {decided}"));
                Ok(decided)
            }
            None => {
                trace.error(&format!(
                    "Pipeline for job {job_id} ended ({outcome:?}) without deciding an outcome; requeueing"
                ));
                let _ = attempt.requeue().await;
                Ok(AttemptOutcome::Requeued)
            }
        }
    }
}
