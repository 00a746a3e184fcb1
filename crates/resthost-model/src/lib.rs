//! Data model for the resthost HTTP dispatch engine.
//!
//! This crate holds the types shared by the transport and engine layers:
//! route templates and their matching primitives, the per-request context
//! that travels through the pipeline, and the error taxonomy every stage
//! reports faults with.

mod context;
mod error;
mod route;

pub use context::{
    CALLBACK_PARAM, DEBUG_PARAM, FORMAT_PARAM, PipelineOutcome, RequestContext, ResponsePayload,
    ResponseSink, ResponseValue,
};
pub use error::{HostError, HostResult, RouteError};
pub use route::{PathSegment, ResolvedRoute, RouteTemplate, VerbSet, split_path};
