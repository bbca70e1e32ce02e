use super::{Config, ControllerBox, Installer, Logs, Patterns, Rollout, Service, Worker};
use crate::worker::WorkerId;
use std::path::Path;
use std::time::Duration;

/// Creates a test configuration rooted at `base` (normally a temp dir).
///
/// PID files live in `base/Servlet`, binaries in `base`, pattern lists in `base/Global`.
pub fn new_test_config(base: &Path) -> Config {
    let worker = |id: WorkerId, stem: &str| Worker {
        id,
        pid_file: format!("{}.pid", stem),
        component: stem.to_string(),
        extension: Some(".dll".to_string()),
        installer: Installer {
            program: base.join("installer"),
            args: None,
            host: None,
        },
    };

    Config {
        controller: ControllerBox {
            env: super::TEST.to_string(),
            logs: Some(Logs {
                level: Some("debug".to_string()),
            }),
            service: Service {
                root: base.join("Servlet"),
                install_dir: Some(base.to_path_buf()),
                pending_timeout: Some(Duration::from_millis(500)),
                on_demand_refresh: Some(Duration::from_millis(500)),
                poll_interval: Some(Duration::from_millis(5)),
                watch_debounce: Some(Duration::ZERO),
                ack_file: Some("inject.ack".to_string()),
            },
            workers: vec![
                worker(WorkerId::X86, "InjectSvc32"),
                worker(WorkerId::X64, "InjectSvc64"),
            ],
            rollout: Some(Rollout { enabled: true }),
            patterns: Some(Patterns {
                dir: Some(base.join("Global")),
                whitelist_file: None,
                blacklist_file: None,
            }),
        },
    }
}
