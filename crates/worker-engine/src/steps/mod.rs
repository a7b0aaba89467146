// The standard job pipeline, in the order the job runner assembles it:
//
//   subscribe_cancellation → generate_script → send_received
//     → start_instance → upload_script → update_state → run_script

pub mod generate_script;
pub mod run_script;
pub mod send_received;
pub mod start_instance;
pub mod subscribe_cancellation;
pub mod update_state;
pub mod upload_script;

pub use generate_script::GenerateScriptStep;
pub use run_script::RunScriptStep;
pub use send_received::SendReceivedStep;
pub use start_instance::StartInstanceStep;
pub use subscribe_cancellation::SubscribeCancellationStep;
pub use update_state::UpdateStateStep;
pub use upload_script::UploadScriptStep;
