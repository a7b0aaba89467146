// In-memory collaborators for unit tests.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use worker_sdk::CollectingTraceWriter;

use crate::backend::{Instance, Provider, RunResult, RunScriptError, StartAttributes};
use crate::context::CancelScope;
use crate::execution_context::ExecutionContext;
use crate::job::{FinishState, Job, JobAttempt, JobPayload, LogWriter};
use crate::script_generator::{GenerateError, ScriptGenerator};

// ---------------------------------------------------------------------------
// Job + log writer
// ---------------------------------------------------------------------------

pub struct FakeJob {
    payload: JobPayload,
    requeues: AtomicUsize,
    received: AtomicUsize,
    started: AtomicUsize,
    finished: Mutex<Vec<FinishState>>,
    fail_log_writer: AtomicBool,
    fail_requeue: AtomicBool,
    fail_received: AtomicBool,
    log: Arc<Mutex<Vec<u8>>>,
    log_closed: Arc<AtomicBool>,
}

impl FakeJob {
    pub fn new(id: u64) -> Arc<Self> {
        let mut payload = JobPayload::default();
        payload.kind = "job:test".to_string();
        payload.job.id = id;
        payload.repository.slug = "octo/widgets".to_string();
        Self::with_payload(payload)
    }

    pub fn with_payload(payload: JobPayload) -> Arc<Self> {
        Arc::new(Self {
            payload,
            requeues: AtomicUsize::new(0),
            received: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
            finished: Mutex::new(Vec::new()),
            fail_log_writer: AtomicBool::new(false),
            fail_requeue: AtomicBool::new(false),
            fail_received: AtomicBool::new(false),
            log: Arc::new(Mutex::new(Vec::new())),
            log_closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_failing_log_writer(self: Arc<Self>) -> Arc<Self> {
        self.fail_log_writer.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_failing_requeue(self: Arc<Self>) -> Arc<Self> {
        self.fail_requeue.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_failing_received(self: Arc<Self>) -> Arc<Self> {
        self.fail_received.store(true, Ordering::SeqCst);
        self
    }

    pub fn requeue_count(&self) -> usize {
        self.requeues.load(Ordering::SeqCst)
    }

    pub fn received_count(&self) -> usize {
        self.received.load(Ordering::SeqCst)
    }

    pub fn started_count(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> Vec<FinishState> {
        self.finished.lock().clone()
    }

    pub fn log_output(&self) -> String {
        String::from_utf8_lossy(&self.log.lock()).into_owned()
    }

    pub fn log_closed(&self) -> bool {
        self.log_closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Job for FakeJob {
    fn payload(&self) -> &JobPayload {
        &self.payload
    }

    async fn log_writer(&self, _scope: &CancelScope) -> anyhow::Result<Box<dyn LogWriter>> {
        if self.fail_log_writer.load(Ordering::SeqCst) {
            anyhow::bail!("log service unavailable");
        }
        Ok(Box::new(MemoryLogWriter {
            buf: Arc::clone(&self.log),
            closed: Arc::clone(&self.log_closed),
        }))
    }

    async fn requeue(&self) -> anyhow::Result<()> {
        self.requeues.fetch_add(1, Ordering::SeqCst);
        if self.fail_requeue.load(Ordering::SeqCst) {
            anyhow::bail!("queue unavailable");
        }
        Ok(())
    }

    async fn received(&self) -> anyhow::Result<()> {
        self.received.fetch_add(1, Ordering::SeqCst);
        if self.fail_received.load(Ordering::SeqCst) {
            anyhow::bail!("state service unavailable");
        }
        Ok(())
    }

    async fn started(&self) -> anyhow::Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn finish(&self, state: FinishState) -> anyhow::Result<()> {
        self.finished.lock().push(state);
        Ok(())
    }
}

pub struct MemoryLogWriter {
    buf: Arc<Mutex<Vec<u8>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl LogWriter for MemoryLogWriter {
    async fn write(&mut self, chunk: &[u8]) -> anyhow::Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            anyhow::bail!("write after close");
        }
        self.buf.lock().extend_from_slice(chunk);
        Ok(())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A fresh execution context for `job` with a collecting trace.
pub fn context_for(job: Arc<FakeJob>) -> (ExecutionContext, Arc<CollectingTraceWriter>) {
    context_with_scope(job, CancelScope::new())
}

pub fn context_with_scope(
    job: Arc<FakeJob>,
    scope: CancelScope,
) -> (ExecutionContext, Arc<CollectingTraceWriter>) {
    let trace = Arc::new(CollectingTraceWriter::new());
    let attempt = Arc::new(JobAttempt::new(job, trace.clone()));
    (ExecutionContext::new(scope, attempt, trace.clone()), trace)
}

// ---------------------------------------------------------------------------
// Instance + provider
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub enum RunBehavior {
    /// Write some output and exit with the code.
    Exit(i32),
    /// Fail, reporting whether the script had completed.
    Fail { completed: bool },
    /// Block until the scope is cancelled, then report an interrupted run.
    WaitForCancel,
    /// Block forever, ignoring the scope.
    Hang,
}

pub struct FakeInstance {
    behavior: RunBehavior,
    runs: AtomicUsize,
    stops: AtomicUsize,
    uploaded: Mutex<Option<Vec<u8>>>,
    fail_upload: AtomicBool,
}

impl FakeInstance {
    pub fn new(behavior: RunBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            runs: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            uploaded: Mutex::new(None),
            fail_upload: AtomicBool::new(false),
        })
    }

    pub fn succeeding(exit_code: i32) -> Arc<Self> {
        Self::new(RunBehavior::Exit(exit_code))
    }

    pub fn failing(completed: bool) -> Arc<Self> {
        Self::new(RunBehavior::Fail { completed })
    }

    pub fn with_failing_upload(self: Arc<Self>) -> Arc<Self> {
        self.fail_upload.store(true, Ordering::SeqCst);
        self
    }

    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn uploaded(&self) -> Option<Vec<u8>> {
        self.uploaded.lock().clone()
    }
}

#[async_trait]
impl Instance for FakeInstance {
    fn id(&self) -> &str {
        "fake-instance"
    }

    async fn upload_script(&self, _scope: &CancelScope, script: &[u8]) -> anyhow::Result<()> {
        if self.fail_upload.load(Ordering::SeqCst) {
            anyhow::bail!("scp: connection refused");
        }
        *self.uploaded.lock() = Some(script.to_vec());
        Ok(())
    }

    async fn run_script(
        &self,
        scope: &CancelScope,
        writer: &mut dyn LogWriter,
    ) -> Result<RunResult, RunScriptError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        writer
            .write(b"$ ./build.sh\n")
            .await
            .map_err(RunScriptError::interrupted)?;

        match self.behavior {
            RunBehavior::Exit(code) => Ok(RunResult::completed(code)),
            RunBehavior::Fail { completed } => {
                let result = if completed {
                    RunResult::completed(1)
                } else {
                    RunResult::interrupted()
                };
                Err(RunScriptError::new(result, anyhow::anyhow!("ssh session lost")))
            }
            RunBehavior::WaitForCancel => {
                let reason = scope.cancelled().await;
                Err(RunScriptError::interrupted(reason))
            }
            RunBehavior::Hang => std::future::pending().await,
        }
    }

    async fn stop(&self, _scope: &CancelScope) -> anyhow::Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeProvider {
    instance: Option<Arc<FakeInstance>>,
    starts: AtomicUsize,
    last_attributes: Mutex<Option<StartAttributes>>,
}

impl FakeProvider {
    pub fn with_instance(instance: Arc<FakeInstance>) -> Arc<Self> {
        Arc::new(Self {
            instance: Some(instance),
            starts: AtomicUsize::new(0),
            last_attributes: Mutex::new(None),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            instance: None,
            starts: AtomicUsize::new(0),
            last_attributes: Mutex::new(None),
        })
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn last_attributes(&self) -> Option<StartAttributes> {
        self.last_attributes.lock().clone()
    }
}

#[async_trait]
impl Provider for FakeProvider {
    async fn start(
        &self,
        _scope: &CancelScope,
        attributes: &StartAttributes,
    ) -> anyhow::Result<Arc<dyn Instance>> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self.last_attributes.lock() = Some(attributes.clone());
        match &self.instance {
            Some(instance) => Ok(Arc::clone(instance) as Arc<dyn Instance>),
            None => anyhow::bail!("no capacity for {}", attributes.os),
        }
    }
}

// ---------------------------------------------------------------------------
// Script generator
// ---------------------------------------------------------------------------

pub struct StaticGenerator {
    script: Option<Bytes>,
    calls: AtomicUsize,
}

impl StaticGenerator {
    pub fn ok(script: &'static [u8]) -> Arc<Self> {
        Arc::new(Self {
            script: Some(Bytes::from_static(script)),
            calls: AtomicUsize::new(0),
        })
    }

    /// Always answers as if the rendering service returned 503.
    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            script: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScriptGenerator for StaticGenerator {
    async fn generate(
        &self,
        scope: &CancelScope,
        _payload: &JobPayload,
    ) -> Result<Bytes, GenerateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = scope.error() {
            return Err(reason.into());
        }
        match &self.script {
            Some(script) => Ok(script.clone()),
            None => Err(GenerateError::Status {
                status: 503,
                body: "rendering service busy".to_string(),
            }),
        }
    }
}
