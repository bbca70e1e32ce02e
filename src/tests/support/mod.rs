// Shared test support code: fake process table, scripted installer, status sink and
// filesystem fixtures.

pub mod common;
pub mod installer;
pub mod process;

pub use common::*;
pub use installer::{CallLog, ScriptedInstaller};
pub use process::FakeProcesses;
