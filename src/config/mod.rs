// Configuration loading and management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::worker::WorkerId;

pub const PROD: &str = "prod";
#[allow(dead_code)]
pub const DEV: &str = "dev";
#[allow(dead_code)]
pub const TEST: &str = "test";

const DEFAULT_PENDING_TIMEOUT: Duration = Duration::from_millis(500);
const DEFAULT_ON_DEMAND_REFRESH: Duration = Duration::from_millis(500);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(16);
const DEFAULT_WATCH_DEBOUNCE: Duration = Duration::from_millis(100);
const DEFAULT_EXTENSION: &str = ".dll";
const DEFAULT_WHITELIST_FILE: &str = "whitelist.ini";
const DEFAULT_BLACKLIST_FILE: &str = "blacklist.ini";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Controller {
    #[serde(rename = "controller")]
    pub controller: ControllerBox,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerBox {
    pub env: String,
    pub logs: Option<Logs>,
    pub service: Service,
    pub workers: Vec<Worker>,
    pub rollout: Option<Rollout>,
    pub patterns: Option<Patterns>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logs {
    pub level: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Service {
    /// Directory holding the worker PID files; the installer runs from here.
    pub root: PathBuf,
    /// Directory holding the worker binaries (live, staged and backup).
    #[serde(rename = "install_dir")]
    pub install_dir: Option<PathBuf>,
    #[serde(rename = "pending_timeout", default, with = "humantime_serde")]
    pub pending_timeout: Option<Duration>,
    #[serde(rename = "on_demand_refresh", default, with = "humantime_serde")]
    pub on_demand_refresh: Option<Duration>,
    #[serde(rename = "poll_interval", default, with = "humantime_serde")]
    pub poll_interval: Option<Duration>,
    #[serde(rename = "watch_debounce", default, with = "humantime_serde")]
    pub watch_debounce: Option<Duration>,
    /// Flag file (inside `root`) a worker drops after a successful on-demand injection.
    #[serde(rename = "ack_file")]
    pub ack_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Worker {
    pub id: WorkerId,
    /// PID file name, relative to the service root.
    #[serde(rename = "pid_file")]
    pub pid_file: String,
    /// Binary stem inside the install dir, e.g. `InjectSvc64`.
    pub component: String,
    pub extension: Option<String>,
    pub installer: Installer,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Installer {
    pub program: PathBuf,
    /// Argument template; `{component}` and `{verb}` are substituted.
    pub args: Option<Vec<String>>,
    /// Locally staged service host (relative to the service root), preferred for `Install`.
    pub host: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Rollout {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Patterns {
    pub dir: Option<PathBuf>,
    #[serde(rename = "whitelist_file")]
    pub whitelist_file: Option<String>,
    #[serde(rename = "blacklist_file")]
    pub blacklist_file: Option<String>,
}

// Config trait
pub trait ConfigTrait {
    fn logs(&self) -> Option<&Logs>;
    fn is_prod(&self) -> bool;
    #[allow(dead_code)]
    fn is_test(&self) -> bool;
    fn service(&self) -> &Service;
    fn workers(&self) -> &[Worker];
    fn worker(&self, id: WorkerId) -> Option<&Worker>;
    fn install_dir(&self) -> &Path;
    fn pending_timeout(&self) -> Duration;
    fn on_demand_refresh(&self) -> Duration;
    fn poll_interval(&self) -> Duration;
    fn watch_debounce(&self) -> Duration;
    fn is_rollout_enabled(&self) -> bool;
    fn patterns_dir(&self) -> PathBuf;
    fn whitelist_file(&self) -> &str;
    fn blacklist_file(&self) -> &str;
}

// Config type alias for convenience
pub type Config = Controller;

impl ConfigTrait for Config {
    fn logs(&self) -> Option<&Logs> {
        self.controller.logs.as_ref()
    }

    fn is_prod(&self) -> bool {
        self.controller.env == PROD
    }

    fn is_test(&self) -> bool {
        self.controller.env == TEST
    }

    fn service(&self) -> &Service {
        &self.controller.service
    }

    fn workers(&self) -> &[Worker] {
        &self.controller.workers
    }

    fn worker(&self, id: WorkerId) -> Option<&Worker> {
        self.controller.workers.iter().find(|w| w.id == id)
    }

    fn install_dir(&self) -> &Path {
        self.controller
            .service
            .install_dir
            .as_deref()
            .unwrap_or_else(|| Path::new("."))
    }

    fn pending_timeout(&self) -> Duration {
        self.controller
            .service
            .pending_timeout
            .unwrap_or(DEFAULT_PENDING_TIMEOUT)
    }

    fn on_demand_refresh(&self) -> Duration {
        self.controller
            .service
            .on_demand_refresh
            .unwrap_or(DEFAULT_ON_DEMAND_REFRESH)
    }

    fn poll_interval(&self) -> Duration {
        self.controller
            .service
            .poll_interval
            .unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    fn watch_debounce(&self) -> Duration {
        self.controller
            .service
            .watch_debounce
            .unwrap_or(DEFAULT_WATCH_DEBOUNCE)
    }

    fn is_rollout_enabled(&self) -> bool {
        self.controller
            .rollout
            .as_ref()
            .map(|r| r.enabled)
            .unwrap_or(true)
    }

    fn patterns_dir(&self) -> PathBuf {
        self.controller
            .patterns
            .as_ref()
            .and_then(|p| p.dir.clone())
            .unwrap_or_else(|| self.controller.service.root.join("Global"))
    }

    fn whitelist_file(&self) -> &str {
        self.controller
            .patterns
            .as_ref()
            .and_then(|p| p.whitelist_file.as_deref())
            .unwrap_or(DEFAULT_WHITELIST_FILE)
    }

    fn blacklist_file(&self) -> &str {
        self.controller
            .patterns
            .as_ref()
            .and_then(|p| p.blacklist_file.as_deref())
            .unwrap_or(DEFAULT_BLACKLIST_FILE)
    }
}

impl Worker {
    /// Extension of the live binary, including the leading dot.
    pub fn extension(&self) -> &str {
        self.extension.as_deref().unwrap_or(DEFAULT_EXTENSION)
    }
}

impl Config {
    /// Loads configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Resolve absolute path
        let abs_path = path
            .canonicalize()
            .with_context(|| format!("failed to resolve absolute config filepath: {:?}", path))?;

        let data = std::fs::read_to_string(&abs_path)
            .with_context(|| format!("read config yaml file {:?}", abs_path))?;

        let mut cfg = Self::from_yaml(&data)
            .with_context(|| format!("unmarshal yaml from {:?}", abs_path))?;

        // Relative paths are relative to the config file, not the caller's cwd.
        if let Some(base) = abs_path.parent() {
            cfg.resolve_paths(base);
        }

        Ok(cfg)
    }

    /// Parses and validates a YAML document without touching the filesystem.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let cfg: Controller = serde_yaml::from_str(data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        for id in WorkerId::ALL {
            let n = self.controller.workers.iter().filter(|w| w.id == id).count();
            if n != 1 {
                anyhow::bail!("exactly one {} worker must be configured, found {}", id, n);
            }
        }

        for worker in &self.controller.workers {
            if worker.pid_file.trim().is_empty() {
                anyhow::bail!("worker {} has an empty pid_file", worker.id);
            }
            if worker.component.trim().is_empty() {
                anyhow::bail!("worker {} has an empty component name", worker.id);
            }
        }

        if let Some(ack) = &self.controller.service.ack_file {
            if ack.trim().is_empty() {
                anyhow::bail!("service.ack_file must not be empty when set");
            }
        }

        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let service = &mut self.controller.service;
        service.root = absolutize(base, &service.root);
        if let Some(dir) = service.install_dir.take() {
            service.install_dir = Some(absolutize(base, &dir));
        } else {
            service.install_dir = Some(base.to_path_buf());
        }

        if let Some(patterns) = self.controller.patterns.as_mut() {
            if let Some(dir) = patterns.dir.take() {
                patterns.dir = Some(absolutize(base, &dir));
            }
        }
    }
}

fn absolutize(base: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

// Test config is always available for integration tests
mod test_config;
#[allow(unused_imports)]
pub use test_config::new_test_config;

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
controller:
  env: dev
  logs:
    level: debug
  service:
    root: Servlet
    pending_timeout: 750ms
    ack_file: inject.ack
  workers:
    - id: x86
      pid_file: InjectSvc32.pid
      component: InjectSvc32
      installer:
        program: /usr/bin/true
        host: svchost32.exe
    - id: x64
      pid_file: InjectSvc64.pid
      component: InjectSvc64
      extension: .so
      installer:
        program: /usr/bin/true
        args: ["{component}", "{verb}"]
"#;

    #[test]
    fn test_parse_sample_with_defaults() {
        let cfg = Config::from_yaml(SAMPLE).expect("sample config parses");

        assert!(!cfg.is_prod());
        assert_eq!(cfg.pending_timeout(), Duration::from_millis(750));
        assert_eq!(cfg.poll_interval(), DEFAULT_POLL_INTERVAL);
        assert!(cfg.is_rollout_enabled());
        assert_eq!(cfg.whitelist_file(), "whitelist.ini");
        assert_eq!(cfg.worker(WorkerId::X86).map(|w| w.extension()), Some(".dll"));
        assert_eq!(cfg.worker(WorkerId::X64).map(|w| w.extension()), Some(".so"));
    }

    #[test]
    fn test_missing_worker_is_rejected() {
        let broken = SAMPLE.replace("id: x64", "id: x86");
        let err = Config::from_yaml(&broken).unwrap_err();
        assert!(err.to_string().contains("exactly one"));
    }

    #[test]
    fn test_relative_paths_resolve_against_config_dir() {
        let mut cfg = Config::from_yaml(SAMPLE).unwrap();
        cfg.resolve_paths(Path::new("/opt/inject"));

        assert_eq!(cfg.service().root, PathBuf::from("/opt/inject/Servlet"));
        assert_eq!(cfg.install_dir(), Path::new("/opt/inject"));
        assert_eq!(cfg.patterns_dir(), PathBuf::from("/opt/inject/Servlet/Global"));
    }
}
