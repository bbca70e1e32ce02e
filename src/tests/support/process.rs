//! In-memory process table standing in for the OS.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::worker::{Probe, ProcessOps, TerminationError};

#[derive(Default)]
pub struct FakeProcesses {
    table: Mutex<HashMap<u32, Probe>>,
    unkillable: Mutex<HashSet<u32>>,
    terminated: Mutex<Vec<u32>>,
}

impl FakeProcesses {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a live process we are allowed to query.
    pub fn spawn(&self, pid: u32) {
        self.table.lock().insert(pid, Probe::Alive);
    }

    /// Registers a live process owned by another security context.
    pub fn spawn_foreign(&self, pid: u32) {
        self.table.lock().insert(pid, Probe::AccessDenied);
    }

    pub fn exit(&self, pid: u32) {
        self.table.lock().remove(&pid);
    }

    /// Makes termination of `pid` fail, as if the process held a lock we cannot break.
    pub fn lock_against_kill(&self, pid: u32) {
        self.unkillable.lock().insert(pid);
    }

    pub fn is_running(&self, pid: u32) -> bool {
        self.table.lock().contains_key(&pid)
    }

    /// PIDs termination was attempted on, in order.
    pub fn terminated(&self) -> Vec<u32> {
        self.terminated.lock().clone()
    }
}

impl ProcessOps for FakeProcesses {
    fn probe(&self, pid: u32) -> Probe {
        self.table.lock().get(&pid).copied().unwrap_or(Probe::Gone)
    }

    fn terminate(&self, pid: u32) -> Result<(), TerminationError> {
        self.terminated.lock().push(pid);
        if self.unkillable.lock().contains(&pid) {
            return Err(TerminationError::Denied(pid));
        }
        match self.table.lock().remove(&pid) {
            Some(_) => Ok(()),
            None => Err(TerminationError::NotFound(pid)),
        }
    }
}
