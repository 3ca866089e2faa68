//! Job execution engine: wire types, manifest generation, remediation
//! mutators, work-unit polling and the completion monitor.

pub mod dispatcher;
pub mod manifests;
pub mod monitor;
pub mod mutators;
pub mod poller;
pub mod secure;
pub mod state;
pub mod types;

pub use dispatcher::Dispatcher;
pub use monitor::MonitorRegistry;
pub use types::{Error, Job, JobState, JobType, RemediationStatus, RemediationType, Result};
