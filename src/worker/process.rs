// OS process probing and termination.

/// Result of opening a process with query-only rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Alive,
    /// The process exists but belongs to another security context.
    AccessDenied,
    Gone,
}

#[derive(Debug, thiserror::Error)]
pub enum TerminationError {
    #[error("process {0} does not exist")]
    NotFound(u32),
    #[error("not permitted to terminate process {0}")]
    Denied(u32),
    #[error("failed to terminate process {pid}: {reason}")]
    Failed { pid: u32, reason: String },
}

/// Process table seam; the OS implementation is `OsProcesses`.
pub trait ProcessOps: Send + Sync {
    /// Checks whether `pid` refers to a live process.
    fn probe(&self, pid: u32) -> Probe;

    /// Forcibly terminates `pid`.
    fn terminate(&self, pid: u32) -> Result<(), TerminationError>;
}

/// Real process table.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsProcesses;

impl OsProcesses {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
impl ProcessOps for OsProcesses {
    fn probe(&self, pid: u32) -> Probe {
        // pid 0 and negative values address process groups, never a single worker.
        let Some(raw) = to_raw_pid(pid) else {
            return Probe::Gone;
        };
        // SAFETY: signal 0 performs the permission and existence check only.
        if unsafe { libc::kill(raw, 0) } == 0 {
            return Probe::Alive;
        }
        match std::io::Error::last_os_error().raw_os_error() {
            Some(libc::EPERM) => Probe::AccessDenied,
            _ => Probe::Gone,
        }
    }

    fn terminate(&self, pid: u32) -> Result<(), TerminationError> {
        let Some(raw) = to_raw_pid(pid) else {
            return Err(TerminationError::NotFound(pid));
        };
        if pid == std::process::id() {
            return Err(TerminationError::Denied(pid));
        }
        // SAFETY: plain kill(2) on a single positive pid.
        if unsafe { libc::kill(raw, libc::SIGKILL) } == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ESRCH) => Err(TerminationError::NotFound(pid)),
            Some(libc::EPERM) => Err(TerminationError::Denied(pid)),
            _ => Err(TerminationError::Failed {
                pid,
                reason: err.to_string(),
            }),
        }
    }
}

#[cfg(unix)]
fn to_raw_pid(pid: u32) -> Option<libc::pid_t> {
    libc::pid_t::try_from(pid).ok().filter(|p| *p > 0)
}

// sysinfo cannot tell "denied" apart from "gone"; every visible process counts as alive.
#[cfg(not(unix))]
impl ProcessOps for OsProcesses {
    fn probe(&self, pid: u32) -> Probe {
        if pid == 0 {
            return Probe::Gone;
        }
        let mut sys = sysinfo::System::new();
        if sys.refresh_process(sysinfo::Pid::from_u32(pid)) {
            Probe::Alive
        } else {
            Probe::Gone
        }
    }

    fn terminate(&self, pid: u32) -> Result<(), TerminationError> {
        if pid == 0 {
            return Err(TerminationError::NotFound(pid));
        }
        if pid == std::process::id() {
            return Err(TerminationError::Denied(pid));
        }
        let sys_pid = sysinfo::Pid::from_u32(pid);
        let mut sys = sysinfo::System::new();
        if !sys.refresh_process(sys_pid) {
            return Err(TerminationError::NotFound(pid));
        }
        match sys.process(sys_pid) {
            Some(process) if process.kill() => Ok(()),
            Some(_) => Err(TerminationError::Failed {
                pid,
                reason: "kill request was rejected".to_string(),
            }),
            None => Err(TerminationError::NotFound(pid)),
        }
    }
}
