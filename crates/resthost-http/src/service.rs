//! Hyper service bridging the transport to the pipeline.
//!
//! The service turns a parsed hyper request into a [`RequestContext`],
//! hands a [`WorkUnit`] to the configured [`UnitExecutor`] (the worker
//! dispatcher in a running host), and awaits the response sink. The accept
//! loop never waits on any of this; backpressure comes from the executor.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http_body_util::BodyExt;
use hyper::body::Incoming;

use resthost_model::{RequestContext, ResponsePayload};

use crate::body::HostBody;
use crate::pipeline::RequestPipeline;

/// One unit of pipeline execution: a request context bound to the pipeline
/// that will process it.
pub struct WorkUnit {
    pipeline: Arc<RequestPipeline>,
    ctx: RequestContext,
}

impl std::fmt::Debug for WorkUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkUnit")
            .field("request_id", &self.ctx.request_id)
            .finish()
    }
}

impl WorkUnit {
    /// Bind `ctx` to `pipeline`.
    #[must_use]
    pub fn new(pipeline: Arc<RequestPipeline>, ctx: RequestContext) -> Self {
        Self { pipeline, ctx }
    }

    /// The request id of the bound context.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.ctx.request_id
    }

    /// Execute the pipeline for the bound context.
    ///
    /// Faults are handled inside the pipeline; a fault re-raised because
    /// error responses are disabled is logged here, at the pipeline's
    /// caller, and the transport side observes the dropped sink.
    pub async fn run(self) {
        let Self { pipeline, ctx } = self;
        let request_id = ctx.request_id.clone();
        if let Err(fault) = pipeline.execute(ctx).await {
            tracing::error!(
                request_id = %request_id,
                error = %fault,
                "request faulted with error responses disabled"
            );
        }
    }
}

/// Executes submitted work units; implemented by the worker dispatcher.
pub trait UnitExecutor: Send + Sync + 'static {
    /// Hand `unit` off for asynchronous, unordered execution.
    fn submit(&self, unit: WorkUnit);
}

/// Executor that spawns each unit as its own task, with no pooling or
/// bounds. Useful in tests; a running host installs its dispatcher instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpawnUnitExecutor;

impl UnitExecutor for SpawnUnitExecutor {
    fn submit(&self, unit: WorkUnit) {
        tokio::spawn(unit.run());
    }
}

/// Hyper `Service` implementation for the host.
///
/// Cheap to clone; one clone serves each connection.
pub struct HostService {
    pipeline: Arc<RequestPipeline>,
    executor: Arc<dyn UnitExecutor>,
    base_path: Arc<str>,
}

impl std::fmt::Debug for HostService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostService")
            .field("base_path", &self.base_path)
            .finish()
    }
}

impl Clone for HostService {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            executor: Arc::clone(&self.executor),
            base_path: Arc::clone(&self.base_path),
        }
    }
}

impl HostService {
    /// Create a service dispatching through `executor`.
    ///
    /// `base_path` is the path prefix of the url base the listener was
    /// started with; requests outside it are answered 404 without entering
    /// the pipeline.
    #[must_use]
    pub fn new(
        pipeline: Arc<RequestPipeline>,
        executor: Arc<dyn UnitExecutor>,
        base_path: &str,
    ) -> Self {
        Self {
            pipeline,
            executor,
            base_path: Arc::from(normalize_base_path(base_path)),
        }
    }
}

impl hyper::service::Service<http::Request<Incoming>> for HostService {
    type Response = http::Response<HostBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let service = self.clone();
        let request_id = uuid::Uuid::new_v4().to_string();

        Box::pin(async move {
            let response = process_request(req, &service, &request_id).await;
            Ok(add_common_headers(response, &request_id))
        })
    }
}

/// Parse the request, submit the pipeline unit, and await the response.
async fn process_request(
    req: http::Request<Incoming>,
    service: &HostService,
    request_id: &str,
) -> http::Response<HostBody> {
    let (parts, incoming) = req.into_parts();

    let raw_path = percent_encoding::percent_decode_str(parts.uri.path())
        .decode_utf8_lossy()
        .into_owned();
    let Some(path) = strip_base_path(&raw_path, &service.base_path) else {
        tracing::debug!(path = %raw_path, "request outside the host base path");
        return status_response(http::StatusCode::NOT_FOUND);
    };

    let query: Vec<(String, String)> = form_urlencoded::parse(
        parts.uri.query().unwrap_or_default().as_bytes(),
    )
    .into_owned()
    .collect();

    let body = match incoming.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::warn!(request_id, error = %e, "failed to read request body");
            return status_response(http::StatusCode::BAD_REQUEST);
        }
    };

    let (ctx, response_rx) = RequestContext::new(
        request_id,
        parts.method,
        path,
        query,
        parts.headers,
        body,
    );

    // Hand off without waiting; the unit completes on a pool worker.
    service
        .executor
        .submit(WorkUnit::new(Arc::clone(&service.pipeline), ctx));

    match response_rx.await {
        Ok(payload) => payload_to_response(payload),
        // The unit was dropped without writing: disposed pool or a
        // re-raised fault. Either way the client gets a plain 500.
        Err(_) => status_response(http::StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Strip the host base path from `path`.
///
/// Returns the in-host path (always starting with `/`), or `None` when the
/// request falls outside the base path.
fn strip_base_path<'a>(path: &'a str, base: &str) -> Option<&'a str> {
    if base.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(base)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Normalize a configured base path to `""` or `"/prefix"` form.
fn normalize_base_path(base: &str) -> String {
    let trimmed = base.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

fn payload_to_response(payload: ResponsePayload) -> http::Response<HostBody> {
    let mut builder = http::Response::builder().status(payload.status);
    if let Some(content_type) = &payload.content_type {
        builder = builder.header(http::header::CONTENT_TYPE, content_type);
    }
    let body = if payload.body.is_empty() {
        HostBody::empty()
    } else {
        HostBody::from_bytes(payload.body)
    };
    builder
        .body(body)
        .unwrap_or_else(|_| status_response(http::StatusCode::INTERNAL_SERVER_ERROR))
}

fn status_response(status: http::StatusCode) -> http::Response<HostBody> {
    let mut response = http::Response::new(HostBody::empty());
    *response.status_mut() = status;
    response
}

/// Stamp every response with the request id and server identity.
fn add_common_headers(
    mut response: http::Response<HostBody>,
    request_id: &str,
) -> http::Response<HostBody> {
    let headers = response.headers_mut();
    if let Ok(hv) = http::HeaderValue::from_str(request_id) {
        headers.entry("x-request-id").or_insert(hv);
    }
    headers.insert("server", http::HeaderValue::from_static("resthost"));
    response
}
