pub mod collaborators;
pub mod runner;
pub mod station;

pub use collaborators::{
    CommandOutput, DeviceIdProvider, Exporter, FailureDecision, FirmwareUploader, Interaction,
    ManualVerdict, RemoteError, RemoteExecutor, RetryDecision, Selector, SessionLog, Shutdown,
    Silent, StatusDisplay, UploadReport,
};
pub use runner::{Collaborators, RunOutcome, SessionRunner, TestPhase};
pub use station::{DeviceRun, run_device_session};
