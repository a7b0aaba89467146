// Backend contracts: the compute instance a script runs on and the provider
// that leases it. Implementations live outside the core.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::context::CancelScope;
use crate::job::{FinishState, JobPayload, LogWriter};

/// What `Instance::run_script` observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunResult {
    /// The script ran to its end (successfully or not), as opposed to being
    /// interrupted or lost.
    pub completed: bool,

    /// Exit code of the script, when it completed and reported one.
    pub exit_code: Option<i32>,
}

impl RunResult {
    pub fn completed(exit_code: i32) -> Self {
        Self {
            completed: true,
            exit_code: Some(exit_code),
        }
    }

    pub fn interrupted() -> Self {
        Self {
            completed: false,
            exit_code: None,
        }
    }

    /// Terminal state for a completed run: exit 0 passes, anything else
    /// (including a missing code) fails.
    pub fn finish_state(&self) -> FinishState {
        match self.exit_code {
            Some(0) => FinishState::Passed,
            _ => FinishState::Failed,
        }
    }
}

/// A failed `run_script` call, carrying what was observed before it failed.
#[derive(Debug)]
pub struct RunScriptError {
    pub result: RunResult,
    pub source: anyhow::Error,
}

impl RunScriptError {
    pub fn new(result: RunResult, source: impl Into<anyhow::Error>) -> Self {
        Self {
            result,
            source: source.into(),
        }
    }

    /// The run was cut short; nobody knows whether the script finished.
    pub fn interrupted(source: impl Into<anyhow::Error>) -> Self {
        Self::new(RunResult::interrupted(), source)
    }
}

impl fmt::Display for RunScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.source)?;
        if self.result.completed {
            write!(f, " (after completion)")?;
        }
        Ok(())
    }
}

impl std::error::Error for RunScriptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.source)
    }
}

/// A leased remote compute resource that runs one script per lease.
///
/// Lease exclusivity is the provider's responsibility.
#[async_trait]
pub trait Instance: Send + Sync {
    /// Provider-specific handle, for logs.
    fn id(&self) -> &str;

    /// Place the generated script on the instance.
    async fn upload_script(&self, scope: &CancelScope, script: &[u8]) -> anyhow::Result<()>;

    /// Execute the uploaded script, streaming output into `writer`.
    ///
    /// Implementations must observe `scope` and report an interrupted run as
    /// `completed: false`.
    async fn run_script(
        &self,
        scope: &CancelScope,
        writer: &mut dyn LogWriter,
    ) -> Result<RunResult, RunScriptError>;

    /// Release the instance.
    async fn stop(&self, scope: &CancelScope) -> anyhow::Result<()>;
}

/// What the provider needs to pick an instance for a job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartAttributes {
    pub language: String,
    pub os: String,
    pub dist: Option<String>,
    pub group: Option<String>,
    pub image: Option<String>,
}

impl StartAttributes {
    const DEFAULT_LANGUAGE: &'static str = "minimal";
    const DEFAULT_OS: &'static str = "linux";

    /// Derive attributes from the payload's build configuration.
    pub fn from_payload(payload: &JobPayload) -> Self {
        let field = |name: &str| {
            payload
                .config
                .get(name)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Self {
            language: field("language").unwrap_or_else(|| Self::DEFAULT_LANGUAGE.to_string()),
            os: field("os").unwrap_or_else(|| Self::DEFAULT_OS.to_string()),
            dist: field("dist"),
            group: field("group"),
            image: field("image").or_else(|| field("osx_image")),
        }
    }
}

/// Leases instances.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn start(
        &self,
        scope: &CancelScope,
        attributes: &StartAttributes,
    ) -> anyhow::Result<Arc<dyn Instance>>;
}
