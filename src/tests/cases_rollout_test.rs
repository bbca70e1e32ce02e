#[cfg(test)]
mod tests {
    use crate::config::Rollout;
    use crate::support::Fixture;
    use crate::worker::WorkerId;

    #[test]
    fn test_init_swaps_staged_binary_held_by_unkillable_worker() {
        let f = Fixture::new();
        f.install_binaries();
        f.write("InjectSvc64.new", "next64");
        f.processes.spawn(6464);
        f.processes.lock_against_kill(6464);
        f.write("Servlet/InjectSvc64.pid", "6464");

        let ctl = f.controller(f.installer());

        assert_eq!(f.processes.terminated(), vec![6464]);
        assert!(!f.pid_path(WorkerId::X64).exists());
        assert_eq!(f.read("InjectSvc64.dll").as_deref(), Some("next64"));
        assert_eq!(f.read("InjectSvc64.old").as_deref(), Some("live64"));
        assert_eq!(f.read("InjectSvc32.dll").as_deref(), Some("live32"), "not staged");
        assert!(ctl.has_service());
        // The pid file is gone, so the surviving process no longer counts.
        assert!(!ctl.running());
    }

    #[test]
    fn test_first_install_from_staged_payloads() {
        let f = Fixture::new();
        f.write("InjectSvc32.new", "first32");
        f.write("InjectSvc64.new", "first64");

        let ctl = f.controller(f.installer());

        assert!(ctl.has_service());
        assert_eq!(f.read("InjectSvc32.dll").as_deref(), Some("first32"));
        assert_eq!(f.read("InjectSvc64.dll").as_deref(), Some("first64"));
        assert!(f.read("InjectSvc32.old").is_none());
    }

    #[test]
    fn test_second_init_is_noop() {
        let f = Fixture::new();
        f.install_binaries();
        f.write("InjectSvc32.new", "next32");

        drop(f.controller(f.installer()));
        drop(f.controller(f.installer()));

        assert_eq!(f.read("InjectSvc32.dll").as_deref(), Some("next32"));
        assert_eq!(f.read("InjectSvc32.old").as_deref(), Some("live32"));
    }

    #[test]
    fn test_inspecting_controller_leaves_staged_update_alone() {
        let f = Fixture::new();
        f.install_binaries();
        f.write("InjectSvc64.new", "next64");
        f.processes.spawn(6464);
        f.write("Servlet/InjectSvc64.pid", "6464");

        let ctl = f.inspector(f.installer());

        assert!(f.processes.terminated().is_empty());
        assert!(f.processes.is_running(6464));
        assert_eq!(f.read("InjectSvc64.dll").as_deref(), Some("live64"));
        assert_eq!(f.read("InjectSvc64.new").as_deref(), Some("next64"));
        assert!(f.read("InjectSvc64.old").is_none());
        assert!(ctl.running());
        assert_eq!(ctl.report().workers[1].pid, Some(6464));
    }

    #[test]
    fn test_disabled_rollout_leaves_files() {
        let mut f = Fixture::new();
        f.cfg.controller.rollout = Some(Rollout { enabled: false });
        f.install_binaries();
        f.write("InjectSvc64.new", "next64");

        let _ctl = f.controller(f.installer());

        assert_eq!(f.read("InjectSvc64.dll").as_deref(), Some("live64"));
        assert_eq!(f.read("InjectSvc64.new").as_deref(), Some("next64"));
    }
}
