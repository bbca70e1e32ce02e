// Aggregated service status derived from the worker records.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::watch::SignalSource;
use crate::worker::{LiveStatus, ProcessOps, WorkerSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServiceState {
    /// At least one worker is alive.
    pub running: bool,
    /// A start/stop request is awaiting its confirmed transition.
    pub pending: bool,
    /// `running` as of the previous evaluation.
    pub prev_running: bool,
}

/// Receives status changes (status rendering, taskbar overlay, ...).
pub trait StatusSink: Send + Sync {
    fn status_changed(&self, state: &ServiceState);
}

/// Sink that only logs.
#[derive(Debug, Default)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn status_changed(&self, state: &ServiceState) {
        info!(
            component = "service",
            event = "status_changed",
            running = state.running,
            pending = state.pending,
            "global injection service status"
        );
    }
}

/// What a single `check` did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckOutcome {
    /// The records were re-read (signal fired or check was forced).
    pub evaluated: bool,
    /// `running` flipped.
    pub transitioned: bool,
    /// An outstanding request was resolved by this check.
    pub pending_cleared: bool,
}

/// Owns the worker records and derives `ServiceState` from them.
///
/// Records are only re-read when the directory watch fires or a check is forced, so the
/// state is stale between signals.
pub struct ServiceMonitor {
    workers: WorkerSet,
    watch: Box<dyn SignalSource>,
    processes: Arc<dyn ProcessOps>,
    sink: Arc<dyn StatusSink>,
    state: ServiceState,
    last_pids: [Option<u32>; 2],
    last_reported: Option<(bool, bool)>,
}

impl ServiceMonitor {
    pub fn new(
        workers: WorkerSet,
        watch: Box<dyn SignalSource>,
        processes: Arc<dyn ProcessOps>,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            workers,
            watch,
            processes,
            sink,
            state: ServiceState::default(),
            last_pids: [None, None],
            last_reported: None,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn workers(&self) -> &WorkerSet {
        &self.workers
    }

    /// PIDs observed alive by the last evaluation, indexed by `WorkerId`.
    pub fn live_pids(&self) -> [Option<u32>; 2] {
        self.last_pids
    }

    /// Re-derives `running` if the watch fired or `forced` is set.
    ///
    /// A transition or a forced check resolves an outstanding request.
    pub fn check(&mut self, forced: bool) -> CheckOutcome {
        // Always poll the watch so a forced check also consumes a pending signal.
        let signaled = self.watch.is_signaled();
        if !signaled && !forced {
            return CheckOutcome::default();
        }

        let statuses = self.workers.refresh_all(self.processes.as_ref());
        self.last_pids = [statuses[0].pid(), statuses[1].pid()];

        self.state.prev_running = self.state.running;
        self.state.running = statuses.iter().any(LiveStatus::is_alive);

        let transitioned = self.state.running != self.state.prev_running;
        let mut outcome = CheckOutcome {
            evaluated: true,
            transitioned,
            pending_cleared: false,
        };

        if transitioned || forced {
            if self.state.pending {
                self.state.pending = false;
                outcome.pending_cleared = true;
            }
            self.report();
        }

        debug!(
            component = "service",
            event = "checked",
            signaled,
            forced,
            running = self.state.running,
            x86_pid = ?self.last_pids[0],
            x64_pid = ?self.last_pids[1],
            "service runlevel evaluated"
        );

        outcome
    }

    /// Marks a start/stop request as outstanding.
    pub fn begin_pending(&mut self) {
        self.state.pending = true;
        self.report();
    }

    /// Notifies the sink when the visible state differs from what it last saw.
    fn report(&mut self) {
        let visible = (self.state.running, self.state.pending);
        if self.last_reported == Some(visible) {
            return;
        }
        self.last_reported = Some(visible);
        self.sink.status_changed(&self.state);
    }
}
