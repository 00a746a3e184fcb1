//! The per-request pipeline state machine.
//!
//! Stages run in a fixed order over one [`RequestContext`]: pre-request
//! filters, route resolution, content negotiation, DTO binding, request
//! filters, handler invocation, response converters, response filters, and
//! finally serialization and the write. Any filter stage that writes the
//! response halts the remaining stages.
//!
//! Faults are caught once, at the pipeline boundary: `run_stages` errors
//! (and panics, converted to pipeline faults) are delegated to the
//! [`ErrorHandler`](crate::errors::ErrorHandler) with the context still in
//! hand.

use std::sync::Arc;

use futures::FutureExt;
use http::StatusCode;

use resthost_model::{
    HostError, HostResult, PipelineOutcome, RequestContext, ResponsePayload, ResponseValue,
};

use crate::binding::{BinderRegistry, bind_request};
use crate::codecs::{ContentTypes, JAVASCRIPT, JSON};
use crate::errors::ErrorHandler;
use crate::filters::FilterRegistry;
use crate::handler::HandlerInvoker;
use crate::negotiation::select_response_content_type;
use crate::routing::RouteRegistry;

/// Host policy knobs the pipeline consults per request.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Whether the debug query flag may dump raw serialized responses.
    pub debug_mode: bool,
    /// Whether JSONP wrapping is enabled.
    pub allow_jsonp: bool,
    /// Whether route extensions (`/users/1.json`) select the content type.
    pub allow_route_extensions: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            debug_mode: false,
            allow_jsonp: true,
            allow_route_extensions: true,
        }
    }
}

/// The request pipeline and its collaborators.
pub struct RequestPipeline {
    routes: Arc<RouteRegistry>,
    types: Arc<ContentTypes>,
    filters: Arc<FilterRegistry>,
    binders: Arc<BinderRegistry>,
    invoker: Arc<dyn HandlerInvoker>,
    errors: Arc<ErrorHandler>,
    options: PipelineOptions,
}

impl std::fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("routes", &self.routes)
            .field("options", &self.options)
            .finish()
    }
}

impl RequestPipeline {
    /// Assemble a pipeline from its collaborators.
    #[must_use]
    pub fn new(
        routes: Arc<RouteRegistry>,
        types: Arc<ContentTypes>,
        filters: Arc<FilterRegistry>,
        binders: Arc<BinderRegistry>,
        invoker: Arc<dyn HandlerInvoker>,
        errors: Arc<ErrorHandler>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            routes,
            types,
            filters,
            binders,
            invoker,
            errors,
            options,
        }
    }

    /// Run the pipeline for one request.
    ///
    /// Returns `Err` only when the error handler re-raises (error responses
    /// disabled); the caller owns logging for that case. In every other
    /// case the response has been written (or the client went away).
    pub async fn execute(&self, mut ctx: RequestContext) -> HostResult<()> {
        let outcome = std::panic::AssertUnwindSafe(self.run_stages(&mut ctx))
            .catch_unwind()
            .await;

        let fault = match outcome {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(fault)) => fault,
            Err(panic) => {
                HostError::pipeline(format!("stage panicked: {}", panic_message(panic.as_ref())))
            }
        };

        self.errors.handle(fault, &mut ctx)
    }

    async fn run_stages(&self, ctx: &mut RequestContext) -> HostResult<()> {
        // 1. Pre-request filters run before the route is even resolved.
        self.filters.apply_pre_request(ctx)?;
        if ctx.response_sent() {
            return Ok(());
        }

        // 2. Route resolution.
        let extensions = self.options.allow_route_extensions.then_some(&*self.types);
        let route = self.routes.resolve(&ctx.verb, &ctx.path, extensions)?;
        tracing::debug!(
            request_id = %ctx.request_id,
            operation = route.template.operation(),
            pattern = route.template.pattern(),
            "resolved route"
        );

        // 3. Response content-type selection.
        let content_type = select_response_content_type(
            ctx,
            route.content_type_override.as_deref(),
            &self.types,
        )?;
        ctx.response_content_type = Some(content_type);

        // 4. DTO construction.
        let mut dto = bind_request(ctx, &route, &self.binders, &self.types, &self.filters)?;

        // 5. Request filters: global, then operation-specific.
        self.filters
            .apply_request(ctx, route.template.operation(), &mut dto)?;
        if ctx.response_sent() {
            return Ok(());
        }

        // 6. Handler invocation. The future may suspend; the worker yields
        // here and resumption may land on another worker.
        let response = self.invoker.invoke(&route, dto, ctx).await?;
        if ctx.response_sent() {
            return Ok(());
        }

        // 7-8. Response converters, then response filters.
        let mut response = self.filters.apply_response_converters(ctx, response);
        self.filters.apply_response(ctx, &mut response)?;
        if ctx.response_sent() {
            return Ok(());
        }

        // 9-10. Debug dump, JSONP, serialization.
        let payload = self.render_response(ctx, response)?;

        // 11. Write the final bytes.
        ctx.send(payload)
    }

    /// Render the handler result into the final response payload.
    fn render_response(&self, ctx: &RequestContext, response: ResponseValue) -> PipelineOutcome {
        if self.options.debug_mode && ctx.debug_flag() {
            return render_debug_dump(&response);
        }

        match response {
            ResponseValue::Empty => Ok(ResponsePayload::empty(StatusCode::NO_CONTENT)),
            // Pre-encoded payloads go out as-is and are never JSONP-wrapped.
            ResponseValue::Raw { content_type, body } => {
                Ok(ResponsePayload::new(StatusCode::OK, content_type, body))
            }
            ResponseValue::Value(value) => {
                let content_type = ctx
                    .response_content_type
                    .clone()
                    .unwrap_or_else(|| self.types.default_content_type().to_owned());
                let serializer = self
                    .types
                    .serializer(&content_type)
                    .ok_or_else(|| HostError::UnsupportedContentType(content_type.clone()))?;
                let body = serializer.serialize(&value)?;

                if self.options.allow_jsonp {
                    if let Some(callback) = ctx.jsonp_callback() {
                        let mut wrapped = Vec::with_capacity(callback.len() + body.len() + 2);
                        wrapped.extend_from_slice(callback.as_bytes());
                        wrapped.push(b'(');
                        wrapped.extend_from_slice(&body);
                        wrapped.push(b')');
                        return Ok(ResponsePayload::new(StatusCode::OK, JAVASCRIPT, wrapped));
                    }
                }

                Ok(ResponsePayload::new(StatusCode::OK, content_type, body))
            }
        }
    }
}

/// Raw serialized dump of the outcome, bypassing negotiation.
fn render_debug_dump(response: &ResponseValue) -> PipelineOutcome {
    let dump = match response {
        ResponseValue::Value(value) => serde_json::to_vec_pretty(value)
            .map_err(|e| HostError::pipeline(format!("debug dump failed: {e}")))?,
        ResponseValue::Raw { body, .. } => body.to_vec(),
        ResponseValue::Empty => b"null".to_vec(),
    };
    Ok(ResponsePayload::new(StatusCode::OK, JSON, dump))
}

/// Best-effort panic payload extraction for fault messages.
fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
