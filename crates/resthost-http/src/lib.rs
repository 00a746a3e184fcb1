//! HTTP machinery for the resthost dispatch engine.
//!
//! This crate turns parsed requests into written responses: the route
//! registry and resolver, content-type registry with the built-in JSON and
//! XML codecs, filter chains, request binding, the multi-stage request
//! pipeline, centralized error handling, and the hyper `Service` that
//! bridges connections to the worker pool through the [`UnitExecutor`]
//! seam.

mod binding;
mod body;
mod codecs;
mod errors;
mod filters;
mod handler;
mod negotiation;
mod pipeline;
mod routing;
mod service;
mod xml;

pub use binding::{BinderRegistry, RequestBinder, bind_request};
pub use body::HostBody;
pub use codecs::{
    ContentTypes, Deserializer, JAVASCRIPT, JSON, JsonCodec, Serializer, XML, canonical,
};
pub use errors::{ErrorHandler, ErrorTransform};
pub use filters::{
    FilterRegistry, PreRequestFilter, RequestConverter, RequestFilter, ResponseConverter,
    ResponseFilter,
};
pub use handler::{
    HandlerFuture, HandlerInvoker, NotImplementedHandler, OperationHandler, OperationRegistry,
};
pub use negotiation::select_response_content_type;
pub use pipeline::{PipelineOptions, RequestPipeline};
pub use routing::RouteRegistry;
pub use service::{HostService, SpawnUnitExecutor, UnitExecutor, WorkUnit};
pub use xml::XmlCodec;
