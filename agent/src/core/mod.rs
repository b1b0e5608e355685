//! Core server lifecycle components

pub mod launch;
pub mod log_buffer;
pub mod registry;
pub mod supervisor;

pub use launch::JavaLauncher;
pub use log_buffer::{LogBuffer, LogFollower};
pub use registry::{RestartPolicy, ServerRegistry};
pub use supervisor::{ExitEvent, ExitRecord, ProcessSupervisor, StopTimeouts};
