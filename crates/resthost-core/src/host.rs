//! The host facade tying listener, dispatcher, and pipeline together.
//!
//! A [`RestHost`] owns every registry the pipeline reads from plus the
//! worker pool and the listener. Routes, operations, binders, and filters
//! are registered up front; `start` assembles the pipeline and service and
//! brings the listener up. Lifecycle transitions are serialized behind one
//! coarse lock with a disposed flag, making start/stop/dispose idempotent
//! and safe under concurrent callers.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;

use resthost_http::{
    BinderRegistry, ContentTypes, ErrorHandler, ErrorTransform, FilterRegistry, HandlerInvoker,
    HostService, OperationHandler, OperationRegistry, RequestPipeline, RouteRegistry,
};
use resthost_model::{HostError, HostResult, RequestContext, RouteError, VerbSet};

use crate::config::HostConfig;
use crate::dispatcher::WorkerDispatcher;
use crate::listener::{HttpListener, ListenerState, parse_url_base};

/// A self-hosted HTTP service host.
pub struct RestHost {
    config: HostConfig,
    routes: Arc<RouteRegistry>,
    types: Arc<ContentTypes>,
    filters: Arc<FilterRegistry>,
    operations: Arc<OperationRegistry>,
    binders: Arc<BinderRegistry>,
    error_transform: Mutex<Option<Arc<ErrorTransform>>>,
    dispatcher: WorkerDispatcher,
    listener: HttpListener,
    lifecycle: tokio::sync::Mutex<bool>,
}

impl std::fmt::Debug for RestHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestHost")
            .field("state", &self.state())
            .field("routes", &self.routes)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl RestHost {
    /// Create a host with the built-in content types.
    #[must_use]
    pub fn new(config: HostConfig) -> Self {
        let types = ContentTypes::with_defaults(&config.default_content_type);
        Self::with_content_types(config, types)
    }

    /// Create a host with a custom content-type registry.
    #[must_use]
    pub fn with_content_types(config: HostConfig, types: ContentTypes) -> Self {
        let dispatcher = WorkerDispatcher::new(config.dispatcher_config());
        let drain_timeout = config.dispatcher_config().shutdown_timeout;
        Self {
            config,
            routes: Arc::new(RouteRegistry::new()),
            types: Arc::new(types),
            filters: Arc::new(FilterRegistry::new()),
            operations: Arc::new(OperationRegistry::new()),
            binders: Arc::new(BinderRegistry::new()),
            error_transform: Mutex::new(None),
            dispatcher,
            listener: HttpListener::new(drain_timeout),
            lifecycle: tokio::sync::Mutex::new(false),
        }
    }

    /// The host configuration.
    #[must_use]
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Register a route template, e.g. `("GET", "/users/{id}", "get_user")`.
    ///
    /// `verbs` is a comma-separated verb list or `"ANY"`; the pattern uses
    /// `{name}` variables and an optional trailing `*` wildcard.
    pub fn register_route(
        &self,
        verbs: &str,
        pattern: &str,
        operation: &str,
    ) -> Result<(), RouteError> {
        let verbs = VerbSet::parse(verbs)?;
        self.routes.register(verbs, pattern, operation)
    }

    /// Register the handler behind an operation identifier.
    pub fn register_operation(&self, operation: &str, handler: impl OperationHandler) {
        self.operations.register(operation, handler);
    }

    /// Register a custom DTO binder for an operation.
    pub fn register_binder(
        &self,
        operation: &str,
        binder: impl Fn(&RequestContext) -> HostResult<serde_json::Value> + Send + Sync + 'static,
    ) {
        self.binders.register(operation, Arc::new(binder));
    }

    /// The filter registry; add filters and converters through it.
    #[must_use]
    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    /// Install the error transform hook applied to non-negotiable faults.
    pub fn set_error_transform(
        &self,
        transform: impl Fn(HostError, &RequestContext) -> HostError + Send + Sync + 'static,
    ) {
        *self.error_transform.lock() = Some(Arc::new(transform));
    }

    /// Start listening on `url_base` (e.g. `http://127.0.0.1:8080/api/`).
    ///
    /// Idempotent: a host that is already listening is left in place.
    /// Returns the bound address, useful with port 0.
    pub async fn start(&self, url_base: &str) -> HostResult<SocketAddr> {
        let disposed = self.lifecycle.lock().await;
        if *disposed {
            return Err(HostError::Disposed);
        }

        let base = parse_url_base(url_base)?;

        let mut errors = ErrorHandler::new(
            Arc::clone(&self.types),
            self.config.write_errors_to_response,
        );
        if let Some(transform) = self.error_transform.lock().clone() {
            errors = errors.with_transform(transform);
        }

        let invoker: Arc<dyn HandlerInvoker> = Arc::clone(&self.operations) as _;
        let pipeline = Arc::new(RequestPipeline::new(
            Arc::clone(&self.routes),
            Arc::clone(&self.types),
            Arc::clone(&self.filters),
            Arc::clone(&self.binders),
            invoker,
            Arc::new(errors),
            self.config.pipeline_options(),
        ));

        let service = HostService::new(
            pipeline,
            Arc::new(self.dispatcher.clone()),
            &base.base_path,
        );

        self.listener.start(&base.bind_addr, service).await
    }

    /// Stop the listener; registered routes and handlers survive for a
    /// later `start`. Idempotent.
    pub async fn stop(&self) {
        let _guard = self.lifecycle.lock().await;
        self.listener.stop().await;
    }

    /// Tear the host down: stop the listener, then drain and release the
    /// worker pool. Only the first call performs teardown.
    pub async fn dispose(&self) {
        let mut disposed = self.lifecycle.lock().await;
        if *disposed {
            return;
        }
        *disposed = true;

        self.listener.stop().await;
        self.dispatcher.dispose().await;
        tracing::info!("host disposed");
    }

    /// Current listener state.
    #[must_use]
    pub fn state(&self) -> ListenerState {
        self.listener.state()
    }

    /// Bound address, while listening.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr()
    }

    /// The worker dispatcher, mainly for observability.
    #[must_use]
    pub fn dispatcher(&self) -> &WorkerDispatcher {
        &self.dispatcher
    }
}
