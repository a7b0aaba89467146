// Processor / ProcessorPool: pull jobs from the queue and run them, one at a
// time per processor, N processors per pool.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::Instrument;
use uuid::Uuid;
use worker_common::Tracing;

use crate::context::CancelScope;
use crate::job::{AttemptOutcome, Job};
use crate::job_runner::JobRunner;

/// Source of jobs. Closing the channel ends the pool.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn jobs(&self, scope: &CancelScope) -> Result<mpsc::Receiver<Arc<dyn Job>>>;
}

type SharedJobs = Arc<Mutex<mpsc::Receiver<Arc<dyn Job>>>>;

/// Counts of what a processor (or a whole pool) did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolSummary {
    pub processed: usize,
    pub requeued: usize,
    pub finished: usize,
    /// Attempts whose pipeline was broken.
    pub aborted: usize,
}

impl PoolSummary {
    pub fn record(&mut self, result: &Result<AttemptOutcome>) {
        self.processed += 1;
        match result {
            Ok(AttemptOutcome::Requeued) => self.requeued += 1,
            Ok(AttemptOutcome::Finished(_)) => self.finished += 1,
            Err(_) => self.aborted += 1,
        }
    }

    pub fn merge(&mut self, other: PoolSummary) {
        self.processed += other.processed;
        self.requeued += other.requeued;
        self.finished += other.finished;
        self.aborted += other.aborted;
    }
}

/// Runs jobs from a shared receiver until shutdown, until running jobs are
/// cancelled, or until the queue closes.
pub struct Processor {
    id: Uuid,
    runner: Arc<JobRunner>,
    jobs: SharedJobs,
    job_scope: CancelScope,
    shutdown: CancelScope,
    trace: Tracing,
}

impl Processor {
    fn new(
        runner: Arc<JobRunner>,
        jobs: SharedJobs,
        job_scope: CancelScope,
        shutdown: CancelScope,
    ) -> Self {
        let trace = runner.trace_manager().get("processor");
        Self {
            id: Uuid::new_v4(),
            runner,
            jobs,
            job_scope,
            shutdown,
            trace,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn run(&self) -> PoolSummary {
        let mut summary = PoolSummary::default();
        tracing::info!("Processor ready");

        while let Some(job) = self.next_job().await {
            let job_id = job.id();
            tracing::info!(job_id, "Processing job");

            let result = self.runner.run(job, &self.job_scope).await;
            match &result {
                Ok(outcome) => tracing::info!(job_id, %outcome, "Job attempt done"),
                Err(e) => self
                    .trace
                    .error_chain(&format!("Pipeline for job {job_id} aborted"), e),
            }
            summary.record(&result);
        }

        tracing::info!(processed = summary.processed, "Processor stopped");
        summary
    }

    /// The next job, or `None` once shutdown is requested, running jobs were
    /// cancelled, or the queue closed. A job taken after `cancel_running`
    /// would only be requeued unrun.
    async fn next_job(&self) -> Option<Arc<dyn Job>> {
        if self.shutdown.is_done() || self.job_scope.is_done() {
            return None;
        }
        let mut jobs = self.jobs.lock().await;
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            _ = self.job_scope.cancelled() => None,
            job = jobs.recv() => job,
        }
    }
}

/// A fixed number of processors sharing one job runner.
///
/// Cancelling the `shutdown` scope passed to [`run`](Self::run) stops taking
/// new jobs and lets running attempts finish. [`cancel_running`](Self::cancel_running)
/// interrupts running attempts and also stops taking new jobs.
pub struct ProcessorPool {
    runner: Arc<JobRunner>,
    size: usize,
    job_scope: CancelScope,
}

impl ProcessorPool {
    pub fn new(runner: Arc<JobRunner>, size: usize) -> Self {
        Self {
            runner,
            size: size.max(1),
            job_scope: CancelScope::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Cancel every running attempt (they are requeued) and stop the pool.
    pub fn cancel_running(&self) {
        tracing::warn!("Cancelling all running jobs");
        self.job_scope.cancel();
    }

    pub async fn run(&self, queue: &dyn JobQueue, shutdown: CancelScope) -> Result<PoolSummary> {
        let receiver = queue
            .jobs(&shutdown)
            .await
            .context("failed to subscribe to the job queue")?;
        let jobs: SharedJobs = Arc::new(Mutex::new(receiver));

        tracing::info!(size = self.size, "Starting processor pool");
        let mut set = JoinSet::new();
        for _ in 0..self.size {
            let processor = Processor::new(
                Arc::clone(&self.runner),
                Arc::clone(&jobs),
                self.job_scope.clone(),
                shutdown.clone(),
            );
            let span = tracing::info_span!("processor", id = %processor.id());
            set.spawn(async move { processor.run().await }.instrument(span));
        }

        let mut summary = PoolSummary::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(processed) => summary.merge(processed),
                Err(e) => tracing::error!(error = %e, "Processor task failed"),
            }
        }

        tracing::info!(
            processed = summary.processed,
            requeued = summary.requeued,
            finished = summary.finished,
            aborted = summary.aborted,
            "Processor pool stopped"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationRegistry;
    use crate::test_support::{FakeInstance, FakeJob, FakeProvider, RunBehavior, StaticGenerator};
    use parking_lot::Mutex as SyncMutex;
    use std::time::Duration;
    use worker_common::TraceManager;

    struct ChannelQueue {
        receiver: SyncMutex<Option<mpsc::Receiver<Arc<dyn Job>>>>,
    }

    impl ChannelQueue {
        fn new() -> (mpsc::Sender<Arc<dyn Job>>, Self) {
            let (tx, rx) = mpsc::channel(16);
            (
                tx,
                Self {
                    receiver: SyncMutex::new(Some(rx)),
                },
            )
        }
    }

    #[async_trait]
    impl JobQueue for ChannelQueue {
        async fn jobs(&self, _scope: &CancelScope) -> Result<mpsc::Receiver<Arc<dyn Job>>> {
            self.receiver
                .lock()
                .take()
                .ok_or_else(|| anyhow::anyhow!("queue already subscribed"))
        }
    }

    fn job_runner(instance: Arc<FakeInstance>) -> Arc<JobRunner> {
        Arc::new(JobRunner::new(
            StaticGenerator::ok(b"make\n"),
            FakeProvider::with_instance(instance),
            Arc::new(CancellationRegistry::new()),
            TraceManager::new("test-worker"),
            Duration::from_secs(600),
        ))
    }

    #[tokio::test]
    async fn runs_every_job_until_the_queue_closes() {
        let pool = ProcessorPool::new(job_runner(FakeInstance::succeeding(0)), 2);
        let (tx, queue) = ChannelQueue::new();
        let jobs: Vec<_> = (1..=3).map(FakeJob::new).collect();
        for job in &jobs {
            tx.send(job.clone()).await.unwrap();
        }
        drop(tx);

        let summary = pool.run(&queue, CancelScope::new()).await.unwrap();

        assert_eq!(
            summary,
            PoolSummary {
                processed: 3,
                requeued: 0,
                finished: 3,
                aborted: 0,
            }
        );
        for job in &jobs {
            assert_eq!(job.finished().len(), 1);
        }
    }

    #[tokio::test]
    async fn shutdown_stops_taking_new_jobs() {
        let pool = ProcessorPool::new(job_runner(FakeInstance::succeeding(0)), 1);
        let (tx, queue) = ChannelQueue::new();
        let job = FakeJob::new(1);
        tx.send(job.clone()).await.unwrap();

        let shutdown = CancelScope::new();
        shutdown.cancel();
        let summary = pool.run(&queue, shutdown).await.unwrap();

        assert_eq!(summary.processed, 0);
        assert_eq!(job.received_count(), 0);
    }

    #[tokio::test]
    async fn cancel_running_requeues_in_flight_jobs() {
        let instance = FakeInstance::new(RunBehavior::WaitForCancel);
        let pool = Arc::new(ProcessorPool::new(job_runner(instance.clone()), 1));
        let (tx, queue) = ChannelQueue::new();
        let job = FakeJob::new(7);
        tx.send(job.clone()).await.unwrap();
        let shutdown = CancelScope::new();

        let handle = {
            let pool = Arc::clone(&pool);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { pool.run(&queue, shutdown).await })
        };

        while instance.run_count() == 0 {
            tokio::task::yield_now().await;
        }
        shutdown.cancel();
        pool.cancel_running();

        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.requeued, 1);
        assert_eq!(job.requeue_count(), 1);
        drop(tx);
    }

    #[tokio::test]
    async fn cancelled_pool_takes_no_new_jobs() {
        let instance = FakeInstance::succeeding(0);
        let pool = ProcessorPool::new(job_runner(instance.clone()), 2);
        let (tx, queue) = ChannelQueue::new();
        let jobs: Vec<_> = (1..=3).map(FakeJob::new).collect();
        for job in &jobs {
            tx.send(job.clone()).await.unwrap();
        }

        pool.cancel_running();
        let summary = pool.run(&queue, CancelScope::new()).await.unwrap();

        assert_eq!(summary, PoolSummary::default());
        assert_eq!(instance.run_count(), 0);
        for job in &jobs {
            assert_eq!(job.requeue_count(), 0);
            assert_eq!(job.received_count(), 0);
        }
        drop(tx);
    }

    #[tokio::test]
    async fn cancel_running_alone_stops_an_idle_pool() {
        let instance = FakeInstance::new(RunBehavior::WaitForCancel);
        let pool = Arc::new(ProcessorPool::new(job_runner(instance.clone()), 2));
        let (tx, queue) = ChannelQueue::new();
        let job = FakeJob::new(11);
        tx.send(job.clone()).await.unwrap();

        let handle = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.run(&queue, CancelScope::new()).await })
        };

        while instance.run_count() == 0 {
            tokio::task::yield_now().await;
        }
        pool.cancel_running();

        // The queue stays open; only the cancel ends the pool.
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.requeued, 1);
        assert_eq!(job.requeue_count(), 1);
        drop(tx);
    }

    #[tokio::test]
    async fn queue_subscription_failure_is_an_error() {
        let pool = ProcessorPool::new(job_runner(FakeInstance::succeeding(0)), 1);
        let (_tx, queue) = ChannelQueue::new();
        queue.jobs(&CancelScope::new()).await.unwrap();

        let err = pool.run(&queue, CancelScope::new()).await.unwrap_err();
        assert!(format!("{err:#}").contains("already subscribed"));
    }

    #[test]
    fn summary_counts_outcomes() {
        let mut summary = PoolSummary::default();
        summary.record(&Ok(AttemptOutcome::Requeued));
        summary.record(&Ok(AttemptOutcome::Finished(crate::job::FinishState::Passed)));
        summary.record(&Err(anyhow::anyhow!("broken pipeline")));

        let mut total = PoolSummary::default();
        total.merge(summary);
        total.merge(summary);
        assert_eq!(total.processed, 6);
        assert_eq!(total.requeued, 2);
        assert_eq!(total.finished, 2);
        assert_eq!(total.aborted, 2);
    }

    #[test]
    fn pool_has_at_least_one_processor() {
        let pool = ProcessorPool::new(job_runner(FakeInstance::succeeding(0)), 0);
        assert_eq!(pool.size(), 1);
    }
}
