// Start/stop state machine for the injection service.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigTrait};
use crate::patterns::{PatternFilter, PatternKind, PatternStore};
use crate::rollout;
use crate::service::{CheckOutcome, ServiceLayout, ServiceMonitor, ServiceState, StatusSink};
use crate::watch::{DirectoryWatch, FlagFile, SignalSource};
use crate::worker::{OsProcesses, ProcessOps, WorkerId, WorkerSet};

use super::installer::{CommandInstaller, Installer, Verb};
use super::timer::DeferredTimer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerReport {
    pub id: WorkerId,
    pub pid: Option<u32>,
    pub pid_file: PathBuf,
}

/// Point-in-time snapshot for status output.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub phase: Phase,
    pub running: bool,
    pub pending: bool,
    pub has_service: bool,
    pub config_root: PathBuf,
    pub workers: Vec<WorkerReport>,
    /// RFC 3339 time of the last evaluation of the worker records.
    pub checked_at: Option<String>,
}

// Auto-stop bookkeeping for an on-demand start.
struct OnDemand {
    ack: Option<FlagFile>,
    refresh: DeferredTimer,
    seen_running: bool,
}

/// Drives start/stop requests and keeps the observed service state current.
///
/// Everything runs on the caller's thread: `tick_at` is expected every poll interval and
/// never blocks.
pub struct LifecycleController {
    layout: ServiceLayout,
    monitor: ServiceMonitor,
    installer: Box<dyn Installer>,
    patterns: PatternFilter,
    pending_timer: DeferredTimer,
    pending_timeout: Duration,
    on_demand_refresh: Duration,
    on_demand: Option<OnDemand>,
    last_request: Option<Verb>,
    has_service: bool,
    last_checked: Option<DateTime<Utc>>,
}

impl LifecycleController {
    /// Builds a controller with the real process table and installer command.
    pub fn from_config(cfg: &Config, sink: Arc<dyn StatusSink>) -> Result<Self> {
        let layout = ServiceLayout::from_config(cfg)?;
        let installer = Box::new(CommandInstaller::new(&layout));
        Self::build(cfg, layout, Arc::new(OsProcesses::new()), installer, sink, true)
    }

    /// Like `from_config`, but never applies staged updates: staged files and running
    /// workers are left alone.
    pub fn inspect_from_config(cfg: &Config, sink: Arc<dyn StatusSink>) -> Result<Self> {
        let layout = ServiceLayout::from_config(cfg)?;
        let installer = Box::new(CommandInstaller::new(&layout));
        Self::build(cfg, layout, Arc::new(OsProcesses::new()), installer, sink, false)
    }

    pub fn new(
        cfg: &Config,
        processes: Arc<dyn ProcessOps>,
        installer: Box<dyn Installer>,
        sink: Arc<dyn StatusSink>,
    ) -> Result<Self> {
        let layout = ServiceLayout::from_config(cfg)?;
        Self::build(cfg, layout, processes, installer, sink, true)
    }

    pub fn inspect(
        cfg: &Config,
        processes: Arc<dyn ProcessOps>,
        installer: Box<dyn Installer>,
        sink: Arc<dyn StatusSink>,
    ) -> Result<Self> {
        let layout = ServiceLayout::from_config(cfg)?;
        Self::build(cfg, layout, processes, installer, sink, false)
    }

    fn build(
        cfg: &Config,
        layout: ServiceLayout,
        processes: Arc<dyn ProcessOps>,
        installer: Box<dyn Installer>,
        sink: Arc<dyn StatusSink>,
        apply_staged: bool,
    ) -> Result<Self> {
        std::fs::create_dir_all(layout.root())
            .with_context(|| format!("failed to create service root {:?}", layout.root()))?;

        // Staged binaries must be live before anything can start a worker from them.
        if apply_staged && cfg.is_rollout_enabled() {
            let applied = rollout::reconcile(&layout.staged_updates(), processes.as_ref());
            if applied > 0 {
                info!(
                    component = "controller",
                    event = "rollout_done",
                    applied,
                    "staged updates applied"
                );
            }
        }

        let has_service =
            layout.root().is_dir() && layout.workers().iter().all(|w| w.binary.exists());

        let workers = WorkerSet::new(
            layout.worker(WorkerId::X86).pid_file.clone(),
            layout.worker(WorkerId::X64).pid_file.clone(),
        );
        let watch = DirectoryWatch::new(layout.root(), cfg.watch_debounce());
        let monitor = ServiceMonitor::new(workers, Box::new(watch), processes, sink);

        let patterns = PatternFilter::with_store(PatternStore::new(
            layout.patterns_dir(),
            layout.whitelist_file(),
            layout.blacklist_file(),
        ));

        let mut controller = Self {
            layout,
            monitor,
            installer,
            patterns,
            pending_timer: DeferredTimer::new(),
            pending_timeout: cfg.pending_timeout(),
            on_demand_refresh: cfg.on_demand_refresh(),
            on_demand: None,
            last_request: None,
            has_service,
            last_checked: None,
        };
        controller.force_check();

        info!(
            component = "controller",
            event = "initialized",
            root = ?controller.layout.root(),
            has_service,
            running = controller.running(),
            whitelist = controller.patterns.list(PatternKind::Whitelist).len(),
            blacklist = controller.patterns.list(PatternKind::Blacklist).len(),
            "injection service controller ready"
        );

        Ok(controller)
    }

    pub fn tick(&mut self) -> CheckOutcome {
        self.tick_at(Instant::now())
    }

    /// One poll step: reaps installer children, resolves the pending timeout, evaluates the
    /// watch and advances on-demand mode.
    pub fn tick_at(&mut self, now: Instant) -> CheckOutcome {
        self.installer.reap();

        let timed_out = self.pending_timer.fire_if_due(now);
        if timed_out {
            info!(
                component = "controller",
                event = "pending_timeout",
                timeout = %humantime::format_duration(self.pending_timeout),
                "no transition observed in time, forcing a check"
            );
        }

        // On-demand forcing waits for the outstanding request to resolve on its own.
        let on_demand = self.on_demand.is_some() && !self.pending();
        let outcome = self.evaluate(timed_out || on_demand);

        if !self.pending() {
            self.pending_timer.cancel();
        }
        self.poll_on_demand(now);

        outcome
    }

    /// Re-reads the worker records regardless of the watch.
    pub fn force_check(&mut self) -> CheckOutcome {
        self.evaluate(true)
    }

    fn evaluate(&mut self, forced: bool) -> CheckOutcome {
        let outcome = self.monitor.check(forced);
        if outcome.pending_cleared {
            self.pending_timer.cancel();
        }
        if outcome.evaluated {
            self.last_checked = Some(Utc::now());
        }
        if outcome.transitioned {
            info!(
                component = "controller",
                event = "transition",
                running = self.running(),
                phase = ?self.phase(),
                "service runlevel changed"
            );
        }
        outcome
    }

    pub fn request_start_stop(&mut self, auto_stop: bool) -> bool {
        self.request_start_stop_at(Instant::now(), auto_stop)
    }

    /// Starts the service when it is down and stops it otherwise.
    ///
    /// Returns the 64-bit installer result; false when that step was skipped. The request
    /// stays pending until a transition is observed or the pending timeout forces a check.
    pub fn request_start_stop_at(&mut self, now: Instant, auto_stop: bool) -> bool {
        self.pending_timer.cancel();
        self.on_demand = None;

        let running = self.running();
        let verb = if running { Verb::Remove } else { Verb::Install };

        if auto_stop && !running {
            let mut ack = self.layout.ack_file().map(FlagFile::new);
            if let Some(ack) = ack.as_mut() {
                ack.rearm();
            }
            let mut refresh = DeferredTimer::new();
            refresh.arm(now, self.on_demand_refresh);
            self.on_demand = Some(OnDemand {
                ack,
                refresh,
                seen_running: false,
            });
        }

        let ok32 = self.invoke(WorkerId::X86, verb);
        // A 64-bit shutdown is attempted even when the 32-bit one failed.
        let ok = if ok32 || running {
            self.invoke(WorkerId::X64, verb)
        } else {
            warn!(
                component = "controller",
                event = "x64_skipped",
                verb = %verb,
                "32-bit installer failed, 64-bit step skipped"
            );
            false
        };

        self.monitor.begin_pending();
        self.pending_timer.arm(now, self.pending_timeout);
        self.last_request = Some(verb);

        info!(
            component = "controller",
            event = "requested",
            verb = %verb,
            auto_stop = self.on_demand.is_some(),
            ok,
            "start/stop requested"
        );
        ok
    }

    fn invoke(&mut self, worker: WorkerId, verb: Verb) -> bool {
        match self.installer.invoke(worker, verb) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    component = "controller",
                    event = "installer_failed",
                    worker = %worker,
                    verb = %verb,
                    error = %e,
                    "installer invocation failed"
                );
                false
            }
        }
    }

    fn poll_on_demand(&mut self, now: Instant) {
        let running = self.running();
        let refresh_every = self.on_demand_refresh;

        let Some(od) = self.on_demand.as_mut() else {
            return;
        };

        if !running {
            if od.seen_running {
                self.on_demand = None;
                debug!(
                    component = "controller",
                    event = "on_demand_ended",
                    "service stopped, on-demand mode over"
                );
            }
            return;
        }
        od.seen_running = true;

        if !od.refresh.fire_if_due(now) {
            return;
        }
        od.refresh.arm(now, refresh_every);

        let acked = od.ack.as_mut().is_some_and(|ack| ack.is_signaled());
        if acked {
            info!(
                component = "controller",
                event = "inject_ack",
                "injection acknowledged, stopping on-demand service"
            );
            self.on_demand = None;
            self.request_start_stop_at(now, false);
        }
    }

    pub fn running(&self) -> bool {
        self.monitor.state().running
    }

    pub fn pending(&self) -> bool {
        self.monitor.state().pending
    }

    pub fn state(&self) -> ServiceState {
        self.monitor.state()
    }

    pub fn is_on_demand(&self) -> bool {
        self.on_demand.is_some()
    }

    pub fn phase(&self) -> Phase {
        let state = self.monitor.state();
        match (state.pending, self.last_request) {
            (true, Some(Verb::Install)) => Phase::Starting,
            (true, Some(Verb::Remove)) => Phase::Stopping,
            _ if state.running => Phase::Running,
            _ => Phase::Stopped,
        }
    }

    pub fn has_service(&self) -> bool {
        self.has_service
    }

    pub fn config_root(&self) -> &Path {
        self.layout.root()
    }

    pub fn add_pattern(&mut self, text: &str, is_whitelist: bool) -> bool {
        self.patterns.add(text, PatternKind::from_flag(is_whitelist))
    }

    pub fn remove_pattern(&mut self, text: &str, is_whitelist: bool) -> bool {
        self.patterns.remove(text, PatternKind::from_flag(is_whitelist))
    }

    pub fn replace_patterns(&mut self, text: &str, is_whitelist: bool) -> bool {
        self.patterns.replace(text, PatternKind::from_flag(is_whitelist))
    }

    pub fn matches(&self, candidate: &str, kind: PatternKind) -> bool {
        self.patterns.matches(candidate, kind)
    }

    pub fn patterns(&self) -> &PatternFilter {
        &self.patterns
    }

    pub fn report(&self) -> StatusReport {
        let state = self.monitor.state();
        let pids = self.monitor.live_pids();

        StatusReport {
            phase: self.phase(),
            running: state.running,
            pending: state.pending,
            has_service: self.has_service,
            config_root: self.layout.root().to_path_buf(),
            workers: self
                .monitor
                .workers()
                .iter()
                .map(|record| WorkerReport {
                    id: record.id(),
                    pid: pids[record.id().index()],
                    pid_file: record.pid_file().to_path_buf(),
                })
                .collect(),
            checked_at: self.last_checked.map(|t| t.to_rfc3339()),
        }
    }
}
