//! Per-request context and response primitives.
//!
//! A [`RequestContext`] is created by the transport layer from a parsed
//! request and owned by exactly one worker until the response is written or
//! the request faults. The response travels back through a [`ResponseSink`],
//! a one-shot channel the transport side awaits; once a payload has been
//! sent the context is considered closed and remaining pipeline stages
//! halt.

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use tokio::sync::oneshot;

use crate::error::HostError;

/// Query parameter naming the JSONP callback function.
pub const CALLBACK_PARAM: &str = "callback";

/// Query parameter forcing a response format (`json`, `xml`, ...).
pub const FORMAT_PARAM: &str = "format";

/// Query flag requesting a raw serialized dump in debug mode.
pub const DEBUG_PARAM: &str = "debug";

/// The final response produced by the pipeline for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePayload {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response content type, if any body is present.
    pub content_type: Option<String>,
    /// Response body bytes.
    pub body: Bytes,
}

impl ResponsePayload {
    /// Build a payload with a body.
    pub fn new(status: StatusCode, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: Some(content_type.into()),
            body: body.into(),
        }
    }

    /// Build a bodyless payload.
    #[must_use]
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            content_type: None,
            body: Bytes::new(),
        }
    }
}

/// What a handler invocation produced, before serialization.
#[derive(Debug, Clone)]
pub enum ResponseValue {
    /// A structured value, serialized in the negotiated content type.
    Value(serde_json::Value),
    /// A pre-encoded payload written as-is. Exempt from JSONP wrapping.
    Raw {
        /// Content type of the encoded bytes.
        content_type: String,
        /// The encoded body.
        body: Bytes,
    },
    /// No content; written as 204 No Content.
    Empty,
}

/// Outcome of the pipeline's stage machine: the payload for the write
/// stage, or the fault handed to the error handler.
pub type PipelineOutcome = Result<ResponsePayload, HostError>;

/// One-shot channel the pipeline writes its response through.
///
/// Sending consumes the channel; [`ResponseSink::is_sent`] is how filter
/// stages observe that the response has already been produced.
#[derive(Debug)]
pub struct ResponseSink {
    tx: Option<oneshot::Sender<ResponsePayload>>,
}

impl ResponseSink {
    /// Create a sink and the receiver the transport side awaits.
    #[must_use]
    pub fn channel() -> (Self, oneshot::Receiver<ResponsePayload>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Whether a response has already been sent through this sink.
    #[must_use]
    pub fn is_sent(&self) -> bool {
        self.tx.is_none()
    }

    /// Send the response. Fails if one was already sent.
    pub fn send(&mut self, payload: ResponsePayload) -> Result<(), HostError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| HostError::pipeline("response already written"))?;
        // The receiver dropping means the client went away; not a fault.
        let _ = tx.send(payload);
        Ok(())
    }
}

/// Everything the pipeline knows about one in-flight request.
#[derive(Debug)]
pub struct RequestContext {
    /// Unique id assigned by the transport layer, echoed in responses.
    pub request_id: String,
    /// Request verb.
    pub verb: Method,
    /// Request path, with the host base path already stripped.
    pub path: String,
    /// Raw query pairs in request order.
    pub query: Vec<(String, String)>,
    /// Request headers.
    pub headers: HeaderMap,
    /// Collected request body.
    pub body: Bytes,
    /// Response content type chosen by negotiation; set by the pipeline.
    pub response_content_type: Option<String>,
    sink: ResponseSink,
}

impl RequestContext {
    /// Build a context and the response receiver for the transport side.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        verb: Method,
        path: impl Into<String>,
        query: Vec<(String, String)>,
        headers: HeaderMap,
        body: Bytes,
    ) -> (Self, oneshot::Receiver<ResponsePayload>) {
        let (sink, rx) = ResponseSink::channel();
        (
            Self {
                request_id: request_id.into(),
                verb,
                path: path.into(),
                query,
                headers,
                body,
                response_content_type: None,
                sink,
            },
            rx,
        )
    }

    /// First query parameter value named `name`.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The JSONP callback name, when the `callback` parameter is present
    /// and non-empty.
    #[must_use]
    pub fn jsonp_callback(&self) -> Option<&str> {
        self.query_param(CALLBACK_PARAM).filter(|v| !v.is_empty())
    }

    /// The explicit `format` query parameter, if present.
    #[must_use]
    pub fn format_param(&self) -> Option<&str> {
        self.query_param(FORMAT_PARAM).filter(|v| !v.is_empty())
    }

    /// Whether the `debug` query flag is present.
    #[must_use]
    pub fn debug_flag(&self) -> bool {
        self.query_param(DEBUG_PARAM).is_some()
    }

    /// Whether the response has already been written.
    #[must_use]
    pub fn response_sent(&self) -> bool {
        self.sink.is_sent()
    }

    /// Write the response. Any stage doing this halts the remaining stages.
    pub fn send(&mut self, payload: ResponsePayload) -> Result<(), HostError> {
        self.sink.send(payload)
    }
}
