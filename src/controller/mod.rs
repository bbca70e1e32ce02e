// Start/stop orchestration: installer invocation, pending timeout, on-demand mode.

pub mod installer;
pub mod lifecycle;
pub mod timer;


pub use installer::{CommandInstaller, Installer, InstallerError, Verb};
pub use lifecycle::{LifecycleController, Phase, StatusReport, WorkerReport};
pub use timer::DeferredTimer;
