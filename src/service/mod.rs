// Package service aggregates worker liveness into the overall service status.

pub mod layout;
pub mod state;


pub use layout::{ServiceLayout, WorkerPaths};
pub use state::{CheckOutcome, LogSink, ServiceMonitor, ServiceState, StatusSink};
