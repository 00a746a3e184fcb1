//! Error taxonomy for the dispatch engine.
//!
//! Faults fall into two classes: *expected* outcomes (no matching route, an
//! unsupported content type) that are always converted into a response, and
//! genuine faults (binding, handler, pipeline) that pass through the error
//! transform hook and may be re-raised when writing errors to the response
//! is disabled.

use http::StatusCode;

/// Convenience result type for engine operations.
pub type HostResult<T> = Result<T, HostError>;

/// Fault raised by any stage of the request pipeline or by the host itself.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HostError {
    /// No registered route template matches the request verb and path.
    #[error("no route matches {verb} {path}")]
    RouteNotFound {
        /// The request verb.
        verb: String,
        /// The request path, after base-path stripping.
        path: String,
    },

    /// The negotiated response content type has no registered serializer.
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// The request DTO could not be constructed.
    #[error("failed to bind request: {0}")]
    Binding(String),

    /// The target operation handler failed.
    #[error("handler fault: {0}")]
    Handler(String),

    /// A filter, converter, or other pipeline stage failed.
    #[error("pipeline fault: {0}")]
    Pipeline(String),

    /// The listener could not bind, accept, or parse its url base.
    #[error("listener error: {0}")]
    Listener(String),

    /// The host has already been disposed.
    #[error("host already disposed")]
    Disposed,
}

impl HostError {
    /// Build a [`HostError::RouteNotFound`] for the given verb and path.
    pub fn route_not_found(verb: impl Into<String>, path: impl Into<String>) -> Self {
        Self::RouteNotFound {
            verb: verb.into(),
            path: path.into(),
        }
    }

    /// Build a [`HostError::Binding`] fault.
    pub fn binding(msg: impl Into<String>) -> Self {
        Self::Binding(msg.into())
    }

    /// Build a [`HostError::Handler`] fault.
    pub fn handler(msg: impl Into<String>) -> Self {
        Self::Handler(msg.into())
    }

    /// Build a [`HostError::Pipeline`] fault.
    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self::Pipeline(msg.into())
    }

    /// Build a [`HostError::Listener`] fault.
    pub fn listener(msg: impl std::fmt::Display) -> Self {
        Self::Listener(msg.to_string())
    }

    /// Short error code used in serialized error payloads.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::RouteNotFound { .. } => "RouteNotFound",
            Self::UnsupportedContentType(_) => "UnsupportedContentType",
            Self::Binding(_) => "BindingFailure",
            Self::Handler(_) => "HandlerFault",
            Self::Pipeline(_) => "PipelineFault",
            Self::Listener(_) => "ListenerError",
            Self::Disposed => "Disposed",
        }
    }

    /// HTTP status code this fault maps to when written to the response.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::UnsupportedContentType(_) => StatusCode::NOT_ACCEPTABLE,
            Self::Binding(_) => StatusCode::BAD_REQUEST,
            Self::Handler(_) | Self::Pipeline(_) | Self::Listener(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Disposed => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Whether this fault is an expected, negotiable outcome.
    ///
    /// Expected faults are always converted to a response, regardless of
    /// the write-errors-to-response policy, and never pass through the
    /// error transform hook.
    #[must_use]
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::RouteNotFound { .. } | Self::UnsupportedContentType(_)
        )
    }
}

/// Error raised while parsing or registering a route template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum RouteError {
    /// The path pattern is malformed.
    #[error("invalid route pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The verb list could not be parsed.
    #[error("invalid verb list {0:?}")]
    InvalidVerbs(String),

    /// A template with the same verb set and pattern is already registered.
    #[error("route already registered: {0}")]
    Duplicate(String),
}

impl RouteError {
    /// Build an [`RouteError::InvalidPattern`] for `pattern`.
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }
}
