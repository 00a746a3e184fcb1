//! Lifecycle behavior: accept/processing decoupling, drain on dispose,
//! idempotent teardown, base-path scoping.

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use resthost_core::{HostConfig, ListenerState};
    use serde_json::Value;

    use crate::{spawn_host, spawn_host_with};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_accept_new_connections_while_a_handler_is_pending() {
        let th = spawn_host().await;

        // First request parks inside its handler on the gate.
        let gated = tokio::spawn({
            let client = th.client.clone();
            let url = th.url("/gate");
            async move { client.get(url).send().await.unwrap() }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!gated.is_finished(), "gated request must still be pending");

        // A second connection is accepted and served to completion while
        // the first is still suspended.
        let resp = th.client.get(th.url("/status")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        assert!(!gated.is_finished());

        th.gate.add_permits(1);
        let resp = gated.await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["released"], true);

        th.dispose().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_drain_in_flight_requests_on_dispose() {
        let th = spawn_host().await;

        let mut tasks = Vec::new();
        for _ in 0..3 {
            tasks.push(tokio::spawn({
                let client = th.client.clone();
                let url = th.url("/sleep/300");
                async move { client.get(url).send().await.unwrap() }
            }));
        }

        // Let the requests reach their handlers before tearing down.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(th.host.dispatcher().in_flight() > 0);

        let started = Instant::now();
        th.dispose().await;
        assert!(
            started.elapsed() >= Duration::from_millis(150),
            "dispose returned before in-flight work finished"
        );
        assert_eq!(th.host.dispatcher().in_flight(), 0);

        for task in tasks {
            let resp = task.await.unwrap();
            assert_eq!(resp.status(), 200);
            let body: Value = resp.json().await.unwrap();
            assert_eq!(body["slept_ms"], 300);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_dispose_exactly_once_under_concurrent_callers() {
        let th = spawn_host().await;

        let (r1, r2) = tokio::join!(
            tokio::spawn({
                let host = th.host.clone();
                async move { host.dispose().await }
            }),
            tokio::spawn({
                let host = th.host.clone();
                async move { host.dispose().await }
            }),
        );
        r1.unwrap();
        r2.unwrap();

        assert_eq!(th.host.state(), ListenerState::Stopped);
        assert!(th.host.dispatcher().is_disposed());

        // The socket is gone; new connections are refused.
        assert!(th.client.get(th.url("/status")).send().await.is_err());
    }

    #[tokio::test]
    async fn test_should_restart_after_stop() {
        let th = spawn_host().await;

        th.host.stop().await;
        assert_eq!(th.host.state(), ListenerState::Stopped);

        let addr = th.host.start("http://127.0.0.1:0").await.unwrap();
        assert_eq!(th.host.state(), ListenerState::Listening);

        let resp = th
            .client
            .get(format!("http://{addr}/status"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        th.dispose().await;
    }

    #[tokio::test]
    async fn test_should_scope_requests_to_the_base_path() {
        let th = spawn_host_with(HostConfig::default(), "/api").await;

        let resp = th.client.get(th.url("/status")).send().await.unwrap();
        assert_eq!(resp.status(), 200);

        // Outside the base path nothing is routed.
        let addr = th.host.local_addr().unwrap();
        let resp = th
            .client
            .get(format!("http://{addr}/status"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);

        th.dispose().await;
    }

    #[tokio::test]
    async fn test_should_keep_capacity_one_host_responsive_sequentially() {
        let config = HostConfig {
            pool_size: 1,
            ..HostConfig::default()
        };
        let th = spawn_host_with(config, "").await;

        for _ in 0..4 {
            let resp = th.client.get(th.url("/status")).send().await.unwrap();
            assert_eq!(resp.status(), 200);
        }
        assert!(th.host.dispatcher().worker_count() <= 1);

        th.dispose().await;
    }
}
