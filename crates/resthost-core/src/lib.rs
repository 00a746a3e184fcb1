//! The resthost engine: listener, worker pool, and host lifecycle.
//!
//! [`RestHost`] is the entry point: register routes and operations, then
//! `start` a url base. The listener runs a single-outstanding-accept loop
//! that hands connections off without waiting; the [`WorkerDispatcher`]
//! bounds concurrent pipeline execution; `dispose` drains both.
//!
//! ```no_run
//! use resthost_core::{HostConfig, RestHost};
//! use resthost_model::ResponseValue;
//! use serde_json::{Value, json};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let host = RestHost::new(HostConfig::from_env());
//! host.register_route("GET", "/hello/{name}", "hello")?;
//! host.register_operation("hello", |dto: Value| async move {
//!     Ok(ResponseValue::Value(json!({"greeting": dto["name"]})))
//! });
//!
//! host.start("http://127.0.0.1:8080/").await?;
//! # host.dispose().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod dispatcher;
mod host;
mod listener;

pub use config::HostConfig;
pub use dispatcher::{DispatcherConfig, WorkerDispatcher};
pub use host::RestHost;
pub use listener::{HttpListener, ListenerState, UrlBase, parse_url_base};
