//! Handler invocation seam and the operation registry.
//!
//! The pipeline invokes the target operation through [`HandlerInvoker`].
//! The default implementation, [`OperationRegistry`], is a map from
//! operation identifier to a polymorphic [`OperationHandler`], populated
//! once at registration and dispatched through a virtual call.
//!
//! Handlers return a future; an operation that suspends simply keeps its
//! future pending, and the worker awaits it without blocking.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use resthost_model::{HostError, RequestContext, ResolvedRoute, ResponseValue};

/// Future returned by handler invocation.
pub type HandlerFuture =
    Pin<Box<dyn Future<Output = Result<ResponseValue, HostError>> + Send + 'static>>;

/// A registered target operation.
///
/// The context is borrowed only for the synchronous part of the call;
/// anything the returned future needs must be cloned out of it.
pub trait OperationHandler: Send + Sync + 'static {
    /// Invoke the operation with the bound DTO.
    fn invoke(&self, dto: Value, ctx: &RequestContext) -> HandlerFuture;
}

/// Blanket impl so plain async closures over the DTO register directly.
impl<F, Fut> OperationHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ResponseValue, HostError>> + Send + 'static,
{
    fn invoke(&self, dto: Value, _ctx: &RequestContext) -> HandlerFuture {
        Box::pin(self(dto))
    }
}

/// The collaborator contract the pipeline invokes operations through.
pub trait HandlerInvoker: Send + Sync + 'static {
    /// Invoke the operation targeted by `route`.
    fn invoke(&self, route: &ResolvedRoute, dto: Value, ctx: &RequestContext) -> HandlerFuture;
}

/// Map-backed invoker: operation identifier to handler, populated at
/// registration time.
#[derive(Default)]
pub struct OperationRegistry {
    handlers: DashMap<String, Arc<dyn OperationHandler>>,
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("len", &self.handlers.len())
            .finish()
    }
}

impl OperationRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `operation`, replacing any prior handler.
    pub fn register(&self, operation: impl Into<String>, handler: impl OperationHandler) {
        self.handlers.insert(operation.into(), Arc::new(handler));
    }

    /// Whether a handler is registered for `operation`.
    #[must_use]
    pub fn contains(&self, operation: &str) -> bool {
        self.handlers.contains_key(operation)
    }
}

impl HandlerInvoker for OperationRegistry {
    fn invoke(&self, route: &ResolvedRoute, dto: Value, ctx: &RequestContext) -> HandlerFuture {
        let operation = route.template.operation();
        match self.handlers.get(operation) {
            Some(handler) => {
                tracing::debug!(request_id = %ctx.request_id, operation, "invoking handler");
                handler.invoke(dto, ctx)
            }
            None => {
                let msg = format!("no handler registered for operation {operation:?}");
                Box::pin(std::future::ready(Err(HostError::handler(msg))))
            }
        }
    }
}

/// Handler that faults every invocation; useful as a placeholder while a
/// route's operation is not wired up yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotImplementedHandler;

impl OperationHandler for NotImplementedHandler {
    fn invoke(&self, _dto: Value, _ctx: &RequestContext) -> HandlerFuture {
        Box::pin(std::future::ready(Err(HostError::handler(
            "operation not implemented",
        ))))
    }
}
