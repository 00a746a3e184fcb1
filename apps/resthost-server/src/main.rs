//! resthost server - a self-hosted HTTP service host.
//!
//! Hosts a small demo service on the resthost dispatch engine: routes are
//! matched by verb and path template, DTOs are bound from body and
//! parameters, and responses are negotiated between JSON and XML.
//!
//! # Usage
//!
//! ```text
//! LISTEN_URL=http://0.0.0.0:8080/ resthost-server
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `LISTEN_URL` | `http://0.0.0.0:8080/` | Url base (scheme, host, port, base path) |
//! | `POOL_SIZE` | `500` | Worker pool capacity |
//! | `IDLE_TIMEOUT` | `300` | Seconds before idle workers are reclaimed |
//! | `SHUTDOWN_TIMEOUT` | `30` | Seconds dispose waits for in-flight work |
//! | `DEBUG_MODE` | `false` | Enable the `?debug` raw dump flag |
//! | `WRITE_ERRORS_TO_RESPONSE` | `true` | Serialize faults into responses |
//! | `ALLOW_JSONP` | `true` | Enable `?callback=` JSONP wrapping |
//! | `ALLOW_ROUTE_EXTENSIONS` | `true` | Enable `.json` / `.xml` route extensions |
//! | `LOG_LEVEL` | `info` | Log level filter (`RUST_LOG` overrides) |

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::info;
use tracing_subscriber::EnvFilter;

use resthost_core::{HostConfig, RestHost};
use resthost_model::ResponseValue;

/// Server version reported by the status operation.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// Read the listen url base from the environment.
fn listen_url() -> String {
    std::env::var("LISTEN_URL").unwrap_or_else(|_| "http://0.0.0.0:8080/".to_string())
}

/// Build the greeting payload for the hello operation.
fn greeting(dto: &Value) -> Value {
    let name = dto["name"].as_str().unwrap_or("world");
    json!({ "greeting": format!("hello, {name}") })
}

/// Register the demo routes and operations.
fn register_service(host: &RestHost) -> Result<()> {
    host.register_route("GET", "/status", "status")?;
    host.register_route("GET", "/hello/{name}", "hello")?;
    host.register_route("ANY", "/echo", "echo")?;
    host.register_route("GET,POST", "/echo/*", "echo")?;

    host.register_operation("status", |_dto: Value| async move {
        Ok(ResponseValue::Value(json!({
            "status": "running",
            "version": VERSION,
        })))
    });

    host.register_operation("hello", |dto: Value| async move {
        Ok(ResponseValue::Value(greeting(&dto)))
    });

    host.register_operation("echo", |dto: Value| async move {
        Ok(ResponseValue::Value(dto))
    });

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = HostConfig::from_env();
    init_tracing(&config.log_level)?;

    let url_base = listen_url();
    let host = RestHost::new(config);
    register_service(&host)?;

    let addr = host
        .start(&url_base)
        .await
        .with_context(|| format!("failed to start host on {url_base}"))?;
    info!(%addr, version = VERSION, "resthost server started");

    tokio::signal::ctrl_c().await.ok();
    info!("received shutdown signal, draining");
    host.dispose().await;
    info!("shutdown complete");

    Ok(())
}
