// worker-sdk: Foundation layer for the CI worker.
// No dependencies on other worker crates; holds the trace abstraction and
// the small helpers shared by `worker-common` and `worker-engine`.

pub mod build_constants;
pub mod string_util;
pub mod trace;

pub use build_constants::WorkerPackage;
pub use string_util::StringUtil;
pub use trace::{CollectingTraceWriter, TraceLevel, TraceWriter};
