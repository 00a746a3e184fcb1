//! Centralized fault-to-response conversion.
//!
//! Every fault raised during pipeline execution lands here exactly once.
//! Expected outcomes (RouteNotFound, UnsupportedContentType) are always
//! converted to a response. Genuine faults pass through the pluggable
//! transform hook first; when writing errors to the response is disabled
//! they are handed back to the pipeline's caller instead of the wire.

use std::sync::Arc;

use http::StatusCode;

use resthost_model::{HostError, HostResult, RequestContext, ResponsePayload};

use crate::codecs::{ContentTypes, JSON};

/// Pluggable hook remapping a fault before it is serialized or re-raised.
pub type ErrorTransform = dyn Fn(HostError, &RequestContext) -> HostError + Send + Sync;

/// Converts pipeline faults into responses (or re-raises them).
pub struct ErrorHandler {
    types: Arc<ContentTypes>,
    write_errors_to_response: bool,
    transform: Option<Arc<ErrorTransform>>,
}

impl std::fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandler")
            .field("write_errors_to_response", &self.write_errors_to_response)
            .field("transform", &self.transform.as_ref().map(|_| "..."))
            .finish()
    }
}

impl ErrorHandler {
    /// Create a handler over the given content-type registry.
    #[must_use]
    pub fn new(types: Arc<ContentTypes>, write_errors_to_response: bool) -> Self {
        Self {
            types,
            write_errors_to_response,
            transform: None,
        }
    }

    /// Install the error transform hook.
    #[must_use]
    pub fn with_transform(mut self, transform: Arc<ErrorTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Handle `fault` for `ctx`.
    ///
    /// Returns `Err` with the transformed fault when error responses are
    /// disabled and the fault is not an expected outcome; the caller owns
    /// logging or escalation from there.
    pub fn handle(&self, fault: HostError, ctx: &mut RequestContext) -> HostResult<()> {
        if fault.is_expected() {
            self.write(&fault, ctx);
            return Ok(());
        }

        let fault = match &self.transform {
            Some(transform) => transform(fault, ctx),
            None => fault,
        };

        if self.write_errors_to_response {
            self.write(&fault, ctx);
            Ok(())
        } else {
            Err(fault)
        }
    }

    /// Serialize the fault payload in the negotiated content type and send
    /// it. A response that was already written wins; the fault is logged.
    fn write(&self, fault: &HostError, ctx: &mut RequestContext) {
        if ctx.response_sent() {
            tracing::error!(
                request_id = %ctx.request_id,
                error = %fault,
                "fault raised after the response was written"
            );
            return;
        }

        let content_type = ctx
            .response_content_type
            .clone()
            .filter(|ct| self.types.supports(ct))
            .unwrap_or_else(|| JSON.to_owned());

        let payload = error_payload(fault);
        let body = self
            .types
            .serializer(&content_type)
            .and_then(|s| s.serialize(&payload).ok())
            .unwrap_or_else(|| {
                // The registry always carries JSON; this is the floor.
                serde_json::to_vec(&payload).map(bytes::Bytes::from).unwrap_or_default()
            });

        let status = fault.status_code();
        if ctx
            .send(ResponsePayload::new(status, content_type, body))
            .is_err()
        {
            tracing::error!(request_id = %ctx.request_id, "failed to write error response");
        } else {
            log_fault(fault, status, ctx);
        }
    }
}

/// The serialized error payload shape.
fn error_payload(fault: &HostError) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "code": fault.code(),
            "message": fault.to_string(),
        }
    })
}

fn log_fault(fault: &HostError, status: StatusCode, ctx: &RequestContext) {
    if fault.is_expected() {
        tracing::debug!(
            request_id = %ctx.request_id,
            status = %status,
            error = %fault,
            "request completed with negotiated error"
        );
    } else {
        tracing::warn!(
            request_id = %ctx.request_id,
            status = %status,
            error = %fault,
            "request faulted"
        );
    }
}
