// Async driver for the lifecycle controller.

use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::controller::{LifecycleController, Phase, StatusReport};
use crate::patterns::PatternKind;
use crate::service::CheckOutcome;
use crate::shutdown::GracefulShutdown;

/// Shared, lock-guarded access to the controller.
///
/// Every operation holds the lock for its whole duration, so a request and the timer
/// bookkeeping it does can never interleave with a tick.
#[derive(Clone)]
pub struct ControllerHandle {
    inner: Arc<Mutex<LifecycleController>>,
}

impl ControllerHandle {
    pub fn new(controller: LifecycleController) -> Self {
        Self {
            inner: Arc::new(Mutex::new(controller)),
        }
    }

    /// Runs `f` with exclusive access.
    pub fn with<R>(&self, f: impl FnOnce(&mut LifecycleController) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn tick(&self) -> CheckOutcome {
        self.inner.lock().tick()
    }

    pub fn force_check(&self) -> CheckOutcome {
        self.inner.lock().force_check()
    }

    pub fn request_start_stop(&self, auto_stop: bool) -> bool {
        self.inner.lock().request_start_stop(auto_stop)
    }

    pub fn running(&self) -> bool {
        self.inner.lock().running()
    }

    pub fn pending(&self) -> bool {
        self.inner.lock().pending()
    }

    pub fn phase(&self) -> Phase {
        self.inner.lock().phase()
    }

    pub fn report(&self) -> StatusReport {
        self.inner.lock().report()
    }

    pub fn add_pattern(&self, text: &str, is_whitelist: bool) -> bool {
        self.inner.lock().add_pattern(text, is_whitelist)
    }

    pub fn matches(&self, candidate: &str, kind: PatternKind) -> bool {
        self.inner.lock().matches(candidate, kind)
    }
}

/// Polls the controller on a fixed interval until cancelled.
#[derive(Clone)]
pub struct App {
    shutdown_token: CancellationToken,
    controller: ControllerHandle,
    poll_interval: Duration,
}

impl App {
    pub fn new(
        shutdown_token: CancellationToken,
        controller: LifecycleController,
        poll_interval: Duration,
    ) -> Self {
        Self {
            shutdown_token,
            controller: ControllerHandle::new(controller),
            poll_interval,
        }
    }

    pub fn handle(&self) -> ControllerHandle {
        self.controller.clone()
    }

    /// Starts the polling loop in the background; `gsh` is told when it has stopped.
    pub async fn serve(&self, gsh: Arc<GracefulShutdown>) -> Result<()> {
        let app = self.clone();
        tokio::task::spawn(async move {
            app.run().await;
            gsh.done();
        });

        info!(
            component = "app",
            event = "started",
            poll_interval = %humantime::format_duration(self.poll_interval),
            "application lifecycle"
        );
        Ok(())
    }

    /// Ticks until the token is cancelled.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                _ = ticker.tick() => {
                    self.controller.tick();
                }
            }
        }

        info!(
            component = "app",
            event = "stopped",
            "application lifecycle"
        );
    }

    /// Ticks until no request is pending, `max` elapses or the token is cancelled.
    /// Returns whether the request settled.
    pub async fn run_until_settled(&self, max: Duration) -> bool {
        self.run_until(Some(max), |c| !c.pending()).await
    }

    /// Ticks until `done` holds after a tick, the optional deadline passes or the token
    /// is cancelled. Returns the final value of `done` (false on cancellation).
    pub async fn run_until<F>(&self, max: Option<Duration>, done: F) -> bool
    where
        F: Fn(&ControllerHandle) -> bool,
    {
        let deadline = max.map(|m| Instant::now() + m);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => return false,
                _ = sleep_until_opt(deadline) => return done(&self.controller),
                _ = ticker.tick() => {
                    self.controller.tick();
                    if done(&self.controller) {
                        return true;
                    }
                }
            }
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
