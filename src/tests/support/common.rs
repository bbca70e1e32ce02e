// Filesystem fixture and status recording shared by the scenario tests.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use crate::config::{new_test_config, Config, ConfigTrait};
use crate::controller::LifecycleController;
use crate::service::{ServiceState, StatusSink};
use crate::worker::WorkerId;

use super::installer::ScriptedInstaller;
use super::process::FakeProcesses;

/// Sink that remembers every notification.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ServiceState>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ServiceState> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn last(&self) -> Option<ServiceState> {
        self.events.lock().last().copied()
    }
}

impl StatusSink for RecordingSink {
    fn status_changed(&self, state: &ServiceState) {
        self.events.lock().push(*state);
    }
}

/// Temp directory laid out like an installation: binaries in the base, PID files in
/// `Servlet/`, pattern lists in `Global/`.
pub struct Fixture {
    pub dir: TempDir,
    pub cfg: Config,
    pub processes: Arc<FakeProcesses>,
    pub sink: Arc<RecordingSink>,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = new_test_config(dir.path());
        std::fs::create_dir_all(&cfg.service().root).expect("create service root");
        Self {
            dir,
            cfg,
            processes: FakeProcesses::new(),
            sink: RecordingSink::new(),
        }
    }

    pub fn base(&self) -> &Path {
        self.dir.path()
    }

    pub fn root(&self) -> PathBuf {
        self.cfg.service().root.clone()
    }

    pub fn pid_path(&self, worker: WorkerId) -> PathBuf {
        let name = match worker {
            WorkerId::X86 => "InjectSvc32.pid",
            WorkerId::X64 => "InjectSvc64.pid",
        };
        self.root().join(name)
    }

    pub fn ack_path(&self) -> PathBuf {
        self.root().join("inject.ack")
    }

    /// Writes `contents` to `rel` (relative to the base directory) and returns the path.
    pub fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.base().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(&path, contents).expect("write fixture file");
        path
    }

    pub fn read(&self, rel: &str) -> Option<String> {
        std::fs::read_to_string(self.base().join(rel)).ok()
    }

    /// Live binaries for both workers, so `has_service` holds.
    pub fn install_binaries(&self) {
        self.write("InjectSvc32.dll", "live32");
        self.write("InjectSvc64.dll", "live64");
    }

    pub fn installer(&self) -> ScriptedInstaller {
        ScriptedInstaller::new(self.root(), self.processes.clone())
    }

    pub fn controller(&self, installer: ScriptedInstaller) -> LifecycleController {
        LifecycleController::new(
            &self.cfg,
            self.processes.clone(),
            Box::new(installer),
            self.sink.clone(),
        )
        .expect("controller init")
    }

    /// Controller that reports state without applying staged updates.
    pub fn inspector(&self, installer: ScriptedInstaller) -> LifecycleController {
        LifecycleController::inspect(
            &self.cfg,
            self.processes.clone(),
            Box::new(installer),
            self.sink.clone(),
        )
        .expect("controller init")
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
