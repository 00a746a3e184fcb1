//! Filter chains applied around route resolution and handler invocation.
//!
//! Filters run in registration order. Pre-request, request, and response
//! filters may short-circuit the pipeline by writing the response through
//! the context; converters are pure transforms and cannot halt. Request
//! filters come in two tiers: global filters run first, then filters
//! registered for the specific target operation.
//!
//! Lists are append-only and read under a short lock, so filters can be
//! registered while requests are in flight.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use resthost_model::{HostResult, RequestContext, ResponseValue};

/// Runs before route resolution; may write the response to halt.
pub trait PreRequestFilter: Send + Sync {
    /// Apply the filter.
    fn apply(&self, ctx: &mut RequestContext) -> HostResult<()>;
}

/// Runs after binding, before handler invocation; may halt.
pub trait RequestFilter: Send + Sync {
    /// Apply the filter to the bound DTO.
    fn apply(&self, ctx: &mut RequestContext, dto: &mut Value) -> HostResult<()>;
}

/// Pure transform applied to the bound DTO; cannot halt.
pub trait RequestConverter: Send + Sync {
    /// Convert the DTO, returning the replacement.
    fn convert(&self, ctx: &RequestContext, dto: Value) -> Value;
}

/// Runs after handler invocation; may halt (e.g. substitute the response).
pub trait ResponseFilter: Send + Sync {
    /// Apply the filter to the handler result.
    fn apply(&self, ctx: &mut RequestContext, response: &mut ResponseValue) -> HostResult<()>;
}

/// Pure transform applied to the handler result; cannot halt.
pub trait ResponseConverter: Send + Sync {
    /// Convert the response, returning the replacement.
    fn convert(&self, ctx: &RequestContext, response: ResponseValue) -> ResponseValue;
}

/// Ordered registry of all filter chains.
#[derive(Default)]
pub struct FilterRegistry {
    pre_request: RwLock<Vec<Arc<dyn PreRequestFilter>>>,
    request: RwLock<Vec<Arc<dyn RequestFilter>>>,
    request_by_operation: RwLock<HashMap<String, Vec<Arc<dyn RequestFilter>>>>,
    request_converters: RwLock<Vec<Arc<dyn RequestConverter>>>,
    response: RwLock<Vec<Arc<dyn ResponseFilter>>>,
    response_converters: RwLock<Vec<Arc<dyn ResponseConverter>>>,
}

impl std::fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("pre_request", &self.pre_request.read().len())
            .field("request", &self.request.read().len())
            .field("response", &self.response.read().len())
            .finish()
    }
}

impl FilterRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pre-request filter.
    pub fn add_pre_request(&self, filter: Arc<dyn PreRequestFilter>) {
        self.pre_request.write().push(filter);
    }

    /// Register a global request filter.
    pub fn add_request(&self, filter: Arc<dyn RequestFilter>) {
        self.request.write().push(filter);
    }

    /// Register a request filter for one target operation.
    pub fn add_request_for(&self, operation: impl Into<String>, filter: Arc<dyn RequestFilter>) {
        self.request_by_operation
            .write()
            .entry(operation.into())
            .or_default()
            .push(filter);
    }

    /// Register a request converter.
    pub fn add_request_converter(&self, converter: Arc<dyn RequestConverter>) {
        self.request_converters.write().push(converter);
    }

    /// Register a response filter.
    pub fn add_response(&self, filter: Arc<dyn ResponseFilter>) {
        self.response.write().push(filter);
    }

    /// Register a response converter.
    pub fn add_response_converter(&self, converter: Arc<dyn ResponseConverter>) {
        self.response_converters.write().push(converter);
    }

    /// Apply pre-request filters; stops early once the response is sent.
    pub fn apply_pre_request(&self, ctx: &mut RequestContext) -> HostResult<()> {
        let filters: Vec<_> = self.pre_request.read().clone();
        for filter in filters {
            filter.apply(ctx)?;
            if ctx.response_sent() {
                break;
            }
        }
        Ok(())
    }

    /// Apply global request filters, then those registered for `operation`.
    pub fn apply_request(
        &self,
        ctx: &mut RequestContext,
        operation: &str,
        dto: &mut Value,
    ) -> HostResult<()> {
        let global: Vec<_> = self.request.read().clone();
        let targeted: Vec<_> = self
            .request_by_operation
            .read()
            .get(operation)
            .cloned()
            .unwrap_or_default();

        for filter in global.into_iter().chain(targeted) {
            filter.apply(ctx, dto)?;
            if ctx.response_sent() {
                break;
            }
        }
        Ok(())
    }

    /// Apply request converters in order.
    #[must_use]
    pub fn apply_request_converters(&self, ctx: &RequestContext, mut dto: Value) -> Value {
        let converters: Vec<_> = self.request_converters.read().clone();
        for converter in converters {
            dto = converter.convert(ctx, dto);
        }
        dto
    }

    /// Apply response filters; stops early once the response is sent.
    pub fn apply_response(
        &self,
        ctx: &mut RequestContext,
        response: &mut ResponseValue,
    ) -> HostResult<()> {
        let filters: Vec<_> = self.response.read().clone();
        for filter in filters {
            filter.apply(ctx, response)?;
            if ctx.response_sent() {
                break;
            }
        }
        Ok(())
    }

    /// Apply response converters in order.
    #[must_use]
    pub fn apply_response_converters(
        &self,
        ctx: &RequestContext,
        mut response: ResponseValue,
    ) -> ResponseValue {
        let converters: Vec<_> = self.response_converters.read().clone();
        for converter in converters {
            response = converter.convert(ctx, response);
        }
        response
    }
}
