//! Integration tests for the resthost engine.
//!
//! Each test spawns a live host on an ephemeral loopback port and drives
//! it over real HTTP with reqwest. The test service registered by
//! [`spawn_host`] exercises every pipeline stage: templated routes at
//! different specificities, a wildcard, a gated slow operation for
//! concurrency assertions, a faulting operation, and a raw pre-encoded
//! result.

use std::sync::Arc;
use std::sync::Once;

use bytes::Bytes;
use serde_json::{Value, json};
use tokio::sync::Semaphore;

use resthost_core::{HostConfig, RestHost};
use resthost_http::PreRequestFilter;
use resthost_model::{HostResult, RequestContext, ResponsePayload, ResponseValue};

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// A live host plus the bits tests need to drive it.
#[derive(Debug)]
pub struct TestHost {
    /// The running host.
    pub host: Arc<RestHost>,
    /// Base url of the live listener, without a trailing slash.
    pub base_url: String,
    /// Shared HTTP client.
    pub client: reqwest::Client,
    /// Permit gate the `/gate` operation blocks on.
    pub gate: Arc<Semaphore>,
}

impl TestHost {
    /// Full url for `path` on the live host.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Dispose the host.
    pub async fn dispose(&self) {
        self.host.dispose().await;
    }
}

/// Pre-request filter short-circuiting requests carrying the
/// `x-short-circuit` header.
struct ShortCircuitFilter;

impl PreRequestFilter for ShortCircuitFilter {
    fn apply(&self, ctx: &mut RequestContext) -> HostResult<()> {
        if ctx.headers.contains_key("x-short-circuit") {
            ctx.send(ResponsePayload::new(
                http::StatusCode::FORBIDDEN,
                "text/plain",
                "short-circuited",
            ))?;
        }
        Ok(())
    }
}

/// Spawn a host with the default configuration at the root base path.
pub async fn spawn_host() -> TestHost {
    spawn_host_with(HostConfig::default(), "").await
}

/// Spawn a host with `config`, serving under `base_path` (`""` or `/api`).
pub async fn spawn_host_with(config: HostConfig, base_path: &str) -> TestHost {
    init_tracing();

    let host = RestHost::new(config);
    let gate = Arc::new(Semaphore::new(0));
    register_test_service(&host, &gate);

    let url_base = format!("http://127.0.0.1:0{base_path}");
    let addr = host.start(&url_base).await.expect("host starts");

    TestHost {
        host: Arc::new(host),
        base_url: format!("http://{addr}{base_path}"),
        client: reqwest::Client::new(),
        gate,
    }
}

fn register_test_service(host: &RestHost, gate: &Arc<Semaphore>) {
    host.filters().add_pre_request(Arc::new(ShortCircuitFilter));

    for (verbs, pattern, operation) in [
        ("GET", "/status", "status"),
        ("ANY", "/echo", "echo"),
        ("GET", "/users/{id}", "get_user"),
        ("POST", "/users", "create_user"),
        ("GET", "/a/{x}", "variable"),
        ("GET", "/a/fixed", "fixed"),
        ("GET", "/files/*", "files"),
        ("GET", "/gate", "gated"),
        ("GET", "/sleep/{ms}", "sleep"),
        ("GET", "/fail", "fail"),
        ("GET", "/raw", "raw"),
    ] {
        host.register_route(verbs, pattern, operation)
            .expect("test route registers");
    }

    host.register_operation("status", |_dto: Value| async move {
        Ok(ResponseValue::Value(json!({"status": "running"})))
    });
    host.register_operation("echo", |dto: Value| async move {
        Ok(ResponseValue::Value(dto))
    });
    host.register_operation("get_user", |dto: Value| async move {
        Ok(ResponseValue::Value(dto))
    });
    host.register_operation("create_user", |dto: Value| async move {
        Ok(ResponseValue::Value(dto))
    });
    host.register_operation("variable", |_dto: Value| async move {
        Ok(ResponseValue::Value(json!({"matched": "variable"})))
    });
    host.register_operation("fixed", |_dto: Value| async move {
        Ok(ResponseValue::Value(json!({"matched": "fixed"})))
    });
    host.register_operation("files", |_dto: Value| async move {
        Ok(ResponseValue::Value(json!({"matched": "files"})))
    });

    let gate = Arc::clone(gate);
    host.register_operation("gated", move |_dto: Value| {
        let gate = Arc::clone(&gate);
        async move {
            let permit = gate.acquire().await.expect("gate open");
            permit.forget();
            Ok(ResponseValue::Value(json!({"released": true})))
        }
    });

    host.register_operation("sleep", |dto: Value| async move {
        let ms: u64 = dto["ms"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0);
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
        Ok(ResponseValue::Value(json!({"slept_ms": ms})))
    });

    host.register_operation("fail", |_dto: Value| async move {
        Err::<ResponseValue, _>(resthost_model::HostError::handler("intentional failure"))
    });

    host.register_operation("raw", |_dto: Value| async move {
        Ok(ResponseValue::Raw {
            content_type: "application/octet-stream".to_owned(),
            body: Bytes::from_static(b"\x00\x01binary"),
        })
    });
}

mod test_content;
mod test_lifecycle;
mod test_pipeline;
mod test_routing;
