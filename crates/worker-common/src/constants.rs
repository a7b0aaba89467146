// Constants shared across the worker: environment variable names and defaults.

/// Environment variables read by `WorkerSettings::apply_env`.
pub mod env {
    pub const BUILD_API_URL: &str = "WORKER_BUILD_API_URL";
    pub const POOL_SIZE: &str = "WORKER_POOL_SIZE";
    pub const HARD_TIMEOUT: &str = "WORKER_HARD_TIMEOUT";
    pub const HTTP_TIMEOUT: &str = "WORKER_HTTP_TIMEOUT";
    pub const SKIP_TLS_VERIFY: &str = "WORKER_SKIP_TLS_VERIFY";
    pub const WORKER_NAME: &str = "WORKER_NAME";
    pub const LOG_FORMAT: &str = "WORKER_LOG_FORMAT";
}

/// Default values for `WorkerSettings`.
pub mod defaults {
    /// Number of concurrent processors.
    pub const POOL_SIZE: usize = 1;

    /// Upper bound on one job attempt, in seconds (50 minutes).
    pub const HARD_TIMEOUT_SECS: u64 = 50 * 60;

    /// Largest hard timeout accepted from settings or a job payload (one day).
    pub const MAX_HARD_TIMEOUT_SECS: u64 = 24 * 60 * 60;

    /// Per-request timeout for remote services, in seconds.
    pub const HTTP_TIMEOUT_SECS: u64 = 60;

    /// Name reported in logs when none is configured.
    pub const WORKER_NAME: &str = "ci-worker";
}

/// Longest remote error body echoed into a log line.
pub const MAX_LOGGED_BODY_CHARS: usize = 512;
