// Package shutdown provides graceful shutdown functionality.

use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Notify;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
#[error("graceful shutdown timeout exceeded")]
pub struct TimeoutError;

/// Waits for Ctrl-C or cancellation, then for every registered task to report done.
#[derive(Clone)]
pub struct GracefulShutdown {
    shutdown_token: CancellationToken,
    timeout: Arc<parking_lot::RwLock<Duration>>,
    running: Arc<AtomicUsize>,
    finished: Arc<Notify>,
}

impl GracefulShutdown {
    pub fn new(shutdown_token: CancellationToken) -> Self {
        Self {
            shutdown_token,
            timeout: Arc::new(parking_lot::RwLock::new(Duration::from_secs(10))),
            running: Arc::new(AtomicUsize::new(0)),
            finished: Arc::new(Notify::new()),
        }
    }

    pub fn set_graceful_timeout(&self, timeout: Duration) {
        *self.timeout.write() = timeout;
    }

    /// Registers `n` tasks that must call `done` before shutdown completes.
    pub fn add(&self, n: usize) {
        self.running.fetch_add(n, Ordering::SeqCst);
    }

    /// Marks one registered task as finished.
    pub fn done(&self) {
        let prev = self
            .running
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .unwrap_or(0);
        if prev <= 1 {
            self.finished.notify_waiters();
        }
    }

    /// Waits for a shutdown trigger and then for all tasks, bounded by the timeout.
    pub async fn await_shutdown(&self) -> Result<()> {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!(
                    component = "graceful-shutdown",
                    event = "os_signal",
                    signal = "SIGINT",
                    "cancellation started"
                );
            }
            _ = self.shutdown_token.cancelled() => {
                info!(
                    component = "graceful-shutdown",
                    event = "ctx_done",
                    "cancellation started"
                );
            }
        }

        self.cancel_and_await_with_timeout().await
    }

    async fn cancel_and_await_with_timeout(&self) -> Result<()> {
        self.shutdown_token.cancel();

        let timeout_duration = *self.timeout.read();
        match timeout(timeout_duration, self.wait_for_completion()).await {
            Ok(()) => {
                info!(
                    component = "graceful-shutdown",
                    event = "shutdown_success",
                    "service was gracefully shut down"
                );
                Ok(())
            }
            Err(_) => {
                warn!(
                    component = "graceful-shutdown",
                    event = "shutdown_timeout",
                    timeout = %humantime::format_duration(timeout_duration),
                    "not all tasks were closed within timeout"
                );
                Err(TimeoutError.into())
            }
        }
    }

    async fn wait_for_completion(&self) {
        loop {
            // Register interest before reading the counter so a concurrent `done` is not lost.
            let notified = self.finished.notified();
            if self.running.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_waits_for_registered_tasks() {
        let token = CancellationToken::new();
        let gsh = GracefulShutdown::new(token.clone());
        gsh.add(1);

        let worker = gsh.clone();
        let worker_token = token.clone();
        tokio::spawn(async move {
            worker_token.cancelled().await;
            worker.done();
        });

        token.cancel();
        assert!(gsh.await_shutdown().await.is_ok());
    }

    #[tokio::test]
    async fn test_times_out_on_stuck_task() {
        let token = CancellationToken::new();
        let gsh = GracefulShutdown::new(token.clone());
        gsh.set_graceful_timeout(Duration::from_millis(20));
        gsh.add(1);

        token.cancel();
        let err = gsh.await_shutdown().await.unwrap_err();
        assert!(err.downcast_ref::<TimeoutError>().is_some());
    }
}
