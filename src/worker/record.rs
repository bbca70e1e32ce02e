// Worker identity and the per-worker live-PID cache.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::pidfile;
use super::process::{Probe, ProcessOps};

/// Bitness-specific worker of the injection service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerId {
    X86,
    X64,
}

impl WorkerId {
    /// Installer order: the 32-bit worker always goes first.
    pub const ALL: [WorkerId; 2] = [WorkerId::X86, WorkerId::X64];

    pub fn index(self) -> usize {
        match self {
            WorkerId::X86 => 0,
            WorkerId::X64 => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerId::X86 => "x86",
            WorkerId::X64 => "x64",
        }
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveStatus {
    Alive(u32),
    Dead,
}

impl LiveStatus {
    pub fn is_alive(&self) -> bool {
        matches!(self, LiveStatus::Alive(_))
    }

    pub fn pid(&self) -> Option<u32> {
        match self {
            LiveStatus::Alive(pid) => Some(*pid),
            LiveStatus::Dead => None,
        }
    }
}

/// Binds a worker to its PID file and caches the PID last proven alive.
///
/// `cached_pid` is `None` whenever the file is missing, unparsable, or names a process
/// that no longer exists.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    id: WorkerId,
    pid_file: PathBuf,
    cached_pid: Option<u32>,
}

impl WorkerRecord {
    pub fn new(id: WorkerId, pid_file: PathBuf) -> Self {
        Self {
            id,
            pid_file,
            cached_pid: None,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    pub fn cached_pid(&self) -> Option<u32> {
        self.cached_pid
    }

    /// Re-derives the worker's liveness.
    ///
    /// A PID file whose process is gone is deleted. A process we are not allowed to open
    /// is assumed alive: its file is never deleted unless it can be proven stale.
    pub fn refresh(&mut self, processes: &dyn ProcessOps) -> LiveStatus {
        if !self.pid_file.exists() {
            // The worker removed its own file; a cached pid may already be recycled.
            if let Some(pid) = self.cached_pid.take() {
                debug!(
                    component = "worker",
                    event = "pid_file_gone",
                    worker = %self.id,
                    pid,
                    "pid file removed, worker considered down"
                );
            }
            return LiveStatus::Dead;
        }

        if self.cached_pid.is_none() {
            self.cached_pid = pidfile::read(&self.pid_file);
            if self.cached_pid.is_none() {
                debug!(
                    component = "worker",
                    event = "pid_file_unreadable",
                    worker = %self.id,
                    path = ?self.pid_file,
                    "pid file has no usable pid, treating worker as down"
                );
            }
        }

        let Some(pid) = self.cached_pid else {
            return LiveStatus::Dead;
        };

        match processes.probe(pid) {
            Probe::Alive => LiveStatus::Alive(pid),
            Probe::AccessDenied => {
                debug!(
                    component = "worker",
                    event = "probe_access_denied",
                    worker = %self.id,
                    pid,
                    "process runs in another security context, assuming alive"
                );
                LiveStatus::Alive(pid)
            }
            Probe::Gone => {
                self.cached_pid = None;
                match pidfile::remove(&self.pid_file) {
                    Ok(()) => info!(
                        component = "worker",
                        event = "stale_pid_removed",
                        worker = %self.id,
                        pid,
                        "worker process is gone, pid file removed"
                    ),
                    Err(e) => warn!(
                        component = "worker",
                        event = "stale_pid_remove_failed",
                        worker = %self.id,
                        pid,
                        error = %e,
                        "failed to remove stale pid file"
                    ),
                }
                LiveStatus::Dead
            }
        }
    }
}

/// The fixed pair of worker records, indexed by `WorkerId`.
#[derive(Debug, Clone)]
pub struct WorkerSet {
    records: [WorkerRecord; 2],
}

impl WorkerSet {
    pub fn new(x86_pid_file: PathBuf, x64_pid_file: PathBuf) -> Self {
        Self {
            records: [
                WorkerRecord::new(WorkerId::X86, x86_pid_file),
                WorkerRecord::new(WorkerId::X64, x64_pid_file),
            ],
        }
    }

    pub fn get(&self, id: WorkerId) -> &WorkerRecord {
        &self.records[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkerRecord> {
        self.records.iter()
    }

    pub fn refresh_all(&mut self, processes: &dyn ProcessOps) -> [LiveStatus; 2] {
        [
            self.records[0].refresh(processes),
            self.records[1].refresh(processes),
        ]
    }
}
