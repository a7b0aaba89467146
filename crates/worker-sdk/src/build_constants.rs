/// Build constants for the worker package.
/// Values come from compile-time environment variables with fallbacks.

/// Worker package metadata.
#[derive(Debug, Clone)]
pub struct WorkerPackage;

impl WorkerPackage {
    /// The semantic version of the worker, from `CARGO_PKG_VERSION`.
    pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    /// The distribution name, from `WORKER_PACKAGE_NAME` at compile time.
    pub const PACKAGE_NAME: &'static str = match option_env!("WORKER_PACKAGE_NAME") {
        Some(n) => n,
        None => "ci-worker",
    };

    /// The commit this binary was built from, from `WORKER_COMMIT_HASH`.
    pub const COMMIT_HASH: &'static str = match option_env!("WORKER_COMMIT_HASH") {
        Some(h) => h,
        None => "N/A",
    };

    /// The `User-Agent` value sent to remote services.
    pub fn user_agent() -> String {
        format!("{}/{} ({})", Self::PACKAGE_NAME, Self::VERSION, Self::COMMIT_HASH)
    }
}
