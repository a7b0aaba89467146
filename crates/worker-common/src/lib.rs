// worker-common: Shared services and infrastructure for the CI worker.
// Depends on `worker-sdk`; consumed by `worker-engine`.

pub mod config_store;
pub mod constants;
pub mod error;
pub mod http_client_factory;
pub mod logging;
pub mod tracing;

// ---------------------------------------------------------------------------
// Re-exports for convenient access
// ---------------------------------------------------------------------------

pub use config_store::{ConfigurationStore, WorkerSettings};
pub use error::ConfigError;
pub use http_client_factory::HttpClientFactory;
pub use tracing::{TraceManager, Tracing};
