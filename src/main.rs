// Main entrypoint for gisctl, the global injection service controller.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use gisctl::app::{App, ControllerHandle};
use gisctl::config::{Config, ConfigTrait};
use gisctl::controller::LifecycleController;
use gisctl::patterns::{PatternFilter, PatternKind, PatternStore};
use gisctl::service::{LogSink, ServiceLayout};
use gisctl::shutdown::GracefulShutdown;

const CONFIG_PATH: &str = "cfg/gisctl.cfg.yaml";
const CONFIG_PATH_LOCAL: &str = "cfg/gisctl.cfg.local.yaml";

/// gisctl - start, stop and watch the global injection service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Custom config file path
    #[arg(short, long, value_name = "FILE")]
    cfg: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current service status as JSON
    Status,
    /// Start the service if it is stopped
    Start {
        /// Stop again once a worker acknowledges an injection
        #[arg(long)]
        auto_stop: bool,
    },
    /// Stop the service if it is running
    Stop,
    /// Start a stopped service or stop a running one
    Toggle,
    /// Keep polling the service until interrupted
    Serve,
    /// Manage the whitelist and blacklist
    Pattern {
        #[command(subcommand)]
        action: PatternAction,
    },
}

#[derive(Subcommand, Debug)]
enum PatternAction {
    /// Append patterns (`|`-separated) to a list
    Add {
        #[arg(value_enum)]
        kind: ListKind,
        text: String,
    },
    /// Remove patterns from a list
    Remove {
        #[arg(value_enum)]
        kind: ListKind,
        text: String,
    },
    /// Print one or both lists
    List {
        #[arg(value_enum)]
        kind: Option<ListKind>,
    },
    /// Check whether an executable path matches a list
    Test {
        #[arg(value_enum)]
        kind: ListKind,
        candidate: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ListKind {
    Whitelist,
    Blacklist,
}

impl From<ListKind> for PatternKind {
    fn from(kind: ListKind) -> Self {
        match kind {
            ListKind::Whitelist => PatternKind::Whitelist,
            ListKind::Blacklist => PatternKind::Blacklist,
        }
    }
}

/// Loads the configuration struct from YAML file.
/// Tries local config first, then falls back to default config.
/// Returns the config together with the path it was read from; the logger is not
/// installed yet, so the caller reports the load.
fn load_cfg(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    if let Some(custom_path) = path {
        let cfg = Config::load(&custom_path)
            .with_context(|| format!("failed to load custom config from {:?}", custom_path))?;
        return Ok((cfg, custom_path));
    }

    let local = PathBuf::from(CONFIG_PATH_LOCAL);
    if let Ok(cfg) = Config::load(&local) {
        return Ok((cfg, local));
    }

    let cfg = Config::load(PathBuf::from(CONFIG_PATH))
        .with_context(|| format!("failed to load config from {}", CONFIG_PATH))?;
    Ok((cfg, PathBuf::from(CONFIG_PATH)))
}

/// Configures structured logging based on configuration. Logs go to stderr; stdout is
/// reserved for command output.
fn configure_logger(cfg: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let log_level = cfg
        .logs()
        .and_then(|logs| logs.level.as_ref())
        .map(|s| s.as_str())
        .unwrap_or("info");

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if cfg.is_prod() {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let (cfg, cfg_path) = load_cfg(args.cfg)?;
    configure_logger(&cfg);
    info!(
        component = "config",
        event = "load_success",
        path = ?cfg_path,
        env = %cfg.controller.env,
        "config loaded"
    );

    match args.command {
        Command::Pattern { action } => run_pattern(&cfg, action),
        command => tokio::runtime::Runtime::new()
            .context("Failed to create tokio runtime")?
            .block_on(async_main(cfg, command)),
    }
}

async fn async_main(cfg: Config, command: Command) -> Result<()> {
    let shutdown_token = CancellationToken::new();

    // Status only reports: staged updates wait for a command that may touch the workers.
    let controller = match command {
        Command::Status => LifecycleController::inspect_from_config(&cfg, Arc::new(LogSink)),
        _ => LifecycleController::from_config(&cfg, Arc::new(LogSink)),
    }
    .context("failed to initialize service controller")?;
    let app = App::new(shutdown_token.clone(), controller, cfg.poll_interval());
    let handle = app.handle();

    match command {
        Command::Status => print_json(&handle.report()),
        Command::Start { auto_stop } => {
            if handle.running() {
                info!(component = "main", event = "noop", "service is already running");
                return print_json(&handle.report());
            }
            run_request(&cfg, &app, &handle, shutdown_token, auto_stop).await
        }
        Command::Stop => {
            if !handle.running() {
                info!(component = "main", event = "noop", "service is already stopped");
                return print_json(&handle.report());
            }
            run_request(&cfg, &app, &handle, shutdown_token, false).await
        }
        Command::Toggle => run_request(&cfg, &app, &handle, shutdown_token, false).await,
        Command::Serve => serve(app, shutdown_token).await,
        Command::Pattern { action } => run_pattern(&cfg, action),
    }
}

/// Issues one start/stop request and polls until it settles (and, for an on-demand start,
/// until the service has stopped again).
async fn run_request(
    cfg: &Config,
    app: &App,
    handle: &ControllerHandle,
    shutdown_token: CancellationToken,
    auto_stop: bool,
) -> Result<()> {
    let ctrl_c_token = shutdown_token.clone();
    tokio::task::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_token.cancel();
        }
    });

    let ok = handle.request_start_stop(auto_stop);

    // The pending timer forces a check after one timeout; allow a few more polls on top.
    let settle = cfg.pending_timeout() + cfg.poll_interval() * 4;
    if !app.run_until_settled(settle).await {
        warn!(
            component = "main",
            event = "unsettled",
            "request did not settle before giving up"
        );
    }

    if auto_stop && ok {
        info!(
            component = "main",
            event = "on_demand",
            "waiting for an injection acknowledgement, Ctrl-C to leave the service running"
        );
        app.run_until(None, |c| !c.with(|ctl| ctl.is_on_demand()) && !c.pending())
            .await;
    }

    print_json(&handle.report())?;
    if !ok {
        bail!("installer invocation failed");
    }
    Ok(())
}

async fn serve(app: App, shutdown_token: CancellationToken) -> Result<()> {
    let graceful_shutdown = GracefulShutdown::new(shutdown_token);
    graceful_shutdown.set_graceful_timeout(Duration::from_secs(5));

    graceful_shutdown.add(1);
    app.serve(Arc::new(graceful_shutdown.clone())).await?;

    if let Err(e) = graceful_shutdown.await_shutdown().await {
        error!(
            component = "main",
            scope = "service",
            event = "graceful_shutdown_failed",
            error = %e,
            "failed to gracefully shut down controller"
        );
        return Err(e);
    }
    Ok(())
}

fn run_pattern(cfg: &Config, action: PatternAction) -> Result<()> {
    let layout = ServiceLayout::from_config(cfg)?;
    let mut filter = PatternFilter::with_store(PatternStore::new(
        layout.patterns_dir(),
        layout.whitelist_file(),
        layout.blacklist_file(),
    ));

    match action {
        PatternAction::Add { kind, text } => {
            if !filter.add(&text, kind.into()) {
                bail!("no pattern added to the {}", PatternKind::from(kind));
            }
            print_json(&filter.list(kind.into()).entries())
        }
        PatternAction::Remove { kind, text } => {
            if !filter.remove(&text, kind.into()) {
                bail!("no pattern removed from the {}", PatternKind::from(kind));
            }
            print_json(&filter.list(kind.into()).entries())
        }
        PatternAction::List { kind: Some(kind) } => print_json(&filter.list(kind.into()).entries()),
        PatternAction::List { kind: None } => print_json(&serde_json::json!({
            "whitelist": filter.list(PatternKind::Whitelist).entries(),
            "blacklist": filter.list(PatternKind::Blacklist).entries(),
        })),
        PatternAction::Test { kind, candidate } => {
            let kind = PatternKind::from(kind);
            print_json(&serde_json::json!({
                "candidate": candidate,
                "kind": kind,
                "matched": filter.matches(&candidate, kind),
            }))
        }
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to encode output")?;
    println!("{}", out);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_cfg_reports_custom_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gisctl.cfg.yaml");
        let yaml = serde_yaml::to_string(&gisctl::config::new_test_config(dir.path())).unwrap();
        std::fs::write(&path, yaml).unwrap();

        let (cfg, loaded_from) = load_cfg(Some(path.clone())).unwrap();
        assert_eq!(loaded_from, path);
        assert!(cfg.is_test());
        assert_eq!(cfg.controller.env, "test");
    }

    #[test]
    fn test_load_cfg_missing_custom_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_cfg(Some(dir.path().join("absent.yaml"))).is_err());
    }
}
