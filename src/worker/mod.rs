// Package worker tracks the bitness-specific service workers through their PID files.

pub mod pidfile;
pub mod process;
pub mod record;


pub use process::{OsProcesses, Probe, ProcessOps, TerminationError};
pub use record::{LiveStatus, WorkerId, WorkerRecord, WorkerSet};
