#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use crate::app::App;
    use crate::controller::Phase;
    use crate::shutdown::GracefulShutdown;
    use crate::support::Fixture;

    #[tokio::test]
    async fn test_request_settles_through_polling() {
        let f = Fixture::new();
        let app = App::new(
            CancellationToken::new(),
            f.controller(f.installer()),
            Duration::from_millis(5),
        );
        let handle = app.handle();

        assert!(handle.request_start_stop(false));
        assert_eq!(handle.phase(), Phase::Starting);

        assert!(app.run_until_settled(Duration::from_secs(2)).await);
        assert_eq!(handle.phase(), Phase::Running);
    }

    #[tokio::test]
    async fn test_silent_workers_settle_on_timeout() {
        let f = Fixture::new();
        let app = App::new(
            CancellationToken::new(),
            f.controller(f.installer().silent()),
            Duration::from_millis(5),
        );
        let handle = app.handle();

        handle.request_start_stop(false);
        assert!(app.run_until_settled(Duration::from_secs(2)).await);
        assert_eq!(handle.phase(), Phase::Stopped);
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let f = Fixture::new();
        let token = CancellationToken::new();
        let app = App::new(token.clone(), f.controller(f.installer()), Duration::from_millis(5));
        let handle = app.handle();

        let gsh = GracefulShutdown::new(token.clone());
        gsh.set_graceful_timeout(Duration::from_secs(2));
        gsh.add(1);
        app.serve(Arc::new(gsh.clone())).await.unwrap();

        // A worker started outside the controller is noticed by the loop.
        f.processes.spawn(3232);
        f.write("Servlet/InjectSvc32.pid", "3232");
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !handle.running() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(handle.running());

        token.cancel();
        assert!(gsh.await_shutdown().await.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_wait_returns_false() {
        let f = Fixture::new();
        let token = CancellationToken::new();
        let app = App::new(
            token.clone(),
            f.controller(f.installer().silent()),
            Duration::from_millis(5),
        );

        app.handle().request_start_stop(false);
        token.cancel();
        assert!(!app.run_until_settled(Duration::from_secs(2)).await);
    }
}
