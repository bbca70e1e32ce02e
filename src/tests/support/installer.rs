//! Scripted installer that behaves like the real workers: `Install` starts a process and
//! drops its PID file, `Remove` makes the process exit and leaves the PID file stale.

use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

use crate::controller::{Installer, InstallerError, Verb};
use crate::worker::WorkerId;

use super::process::FakeProcesses;

pub type CallLog = Arc<Mutex<Vec<(WorkerId, Verb)>>>;

pub struct ScriptedInstaller {
    root: PathBuf,
    processes: Arc<FakeProcesses>,
    pids: [u32; 2],
    pid_files: [String; 2],
    failing: [bool; 2],
    write_pid_files: bool,
    calls: CallLog,
}

impl ScriptedInstaller {
    pub fn new(root: PathBuf, processes: Arc<FakeProcesses>) -> Self {
        Self {
            root,
            processes,
            pids: [3232, 6464],
            pid_files: ["InjectSvc32.pid".to_string(), "InjectSvc64.pid".to_string()],
            failing: [false, false],
            write_pid_files: true,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(mut self, worker: WorkerId) -> Self {
        self.failing[worker.index()] = true;
        self
    }

    /// Workers start but are slow to publish their PID files.
    pub fn silent(mut self) -> Self {
        self.write_pid_files = false;
        self
    }

    pub fn pid(&self, worker: WorkerId) -> u32 {
        self.pids[worker.index()]
    }

    pub fn calls(&self) -> CallLog {
        self.calls.clone()
    }
}

impl Installer for ScriptedInstaller {
    fn invoke(&mut self, worker: WorkerId, verb: Verb) -> Result<(), InstallerError> {
        self.calls.lock().push((worker, verb));

        if self.failing[worker.index()] {
            return Err(InstallerError::Spawn {
                worker,
                program: PathBuf::from("scripted"),
                source: std::io::Error::new(std::io::ErrorKind::Other, "scripted failure"),
            });
        }

        let pid = self.pids[worker.index()];
        match verb {
            Verb::Install => {
                self.processes.spawn(pid);
                if self.write_pid_files {
                    let path = self.root.join(&self.pid_files[worker.index()]);
                    std::fs::write(path, pid.to_string()).map_err(|source| InstallerError::Spawn {
                        worker,
                        program: PathBuf::from("scripted"),
                        source,
                    })?;
                }
            }
            Verb::Remove => self.processes.exit(pid),
        }
        Ok(())
    }
}
