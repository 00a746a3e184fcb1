//! Host configuration.
//!
//! All configuration is driven by environment variables with sensible
//! defaults, so a host can be stood up with no configuration at all.

use std::time::Duration;

use resthost_http::PipelineOptions;

use crate::dispatcher::DispatcherConfig;

/// Global configuration for a resthost instance.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    /// Maximum number of pool workers processing requests concurrently.
    pub pool_size: usize,
    /// Seconds an idle worker lingers before it is reclaimed.
    pub idle_timeout_secs: u64,
    /// Seconds `dispose` waits for in-flight work before giving up.
    pub shutdown_timeout_secs: u64,
    /// Whether the debug query flag may dump raw serialized responses.
    pub debug_mode: bool,
    /// Whether faults are written to the response or re-raised.
    pub write_errors_to_response: bool,
    /// Whether JSONP wrapping via the callback parameter is enabled.
    pub allow_jsonp: bool,
    /// Whether route extensions (`/users/1.json`) select the content type.
    pub allow_route_extensions: bool,
    /// Default response content type when negotiation yields nothing.
    pub default_content_type: String,
    /// Log level filter.
    pub log_level: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            pool_size: 500,
            idle_timeout_secs: 300,
            shutdown_timeout_secs: 30,
            debug_mode: false,
            write_errors_to_response: true,
            allow_jsonp: true,
            allow_route_extensions: true,
            default_content_type: "application/json".to_owned(),
            log_level: "info".to_owned(),
        }
    }
}

impl HostConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_parse("POOL_SIZE") {
            config.pool_size = v;
        }
        if let Some(v) = env_parse("IDLE_TIMEOUT") {
            config.idle_timeout_secs = v;
        }
        if let Some(v) = env_parse("SHUTDOWN_TIMEOUT") {
            config.shutdown_timeout_secs = v;
        }
        if let Ok(v) = std::env::var("DEBUG_MODE") {
            config.debug_mode = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("WRITE_ERRORS_TO_RESPONSE") {
            config.write_errors_to_response = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("ALLOW_JSONP") {
            config.allow_jsonp = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("ALLOW_ROUTE_EXTENSIONS") {
            config.allow_route_extensions = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("DEFAULT_CONTENT_TYPE") {
            config.default_content_type = v;
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }

    /// The worker dispatcher configuration derived from this config.
    #[must_use]
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            capacity: self.pool_size,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
        }
    }

    /// The pipeline policy knobs derived from this config.
    #[must_use]
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            debug_mode: self.debug_mode,
            allow_jsonp: self.allow_jsonp,
            allow_route_extensions: self.allow_route_extensions,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn parse_bool(v: &str) -> bool {
    v == "1" || v.eq_ignore_ascii_case("true")
}
