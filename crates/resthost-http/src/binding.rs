//! Request DTO construction.
//!
//! A custom binder registered for the target operation wins outright.
//! Otherwise the DTO starts from content-type-aware body deserialization
//! and is overlaid with the flattened parameter map: query parameters
//! first, then path variables, so on a key collision path wins over query
//! and both win over same-named body fields. Request converters run last.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Map, Value};

use resthost_model::{HostError, HostResult, RequestContext, ResolvedRoute};

use crate::codecs::ContentTypes;
use crate::filters::FilterRegistry;

/// A custom DTO binder for one target operation.
pub type RequestBinder = dyn Fn(&RequestContext) -> HostResult<Value> + Send + Sync;

/// Registry of custom binders keyed by operation identifier.
#[derive(Default)]
pub struct BinderRegistry {
    binders: DashMap<String, Arc<RequestBinder>>,
}

impl std::fmt::Debug for BinderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinderRegistry")
            .field("len", &self.binders.len())
            .finish()
    }
}

impl BinderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom binder for `operation`.
    pub fn register(&self, operation: impl Into<String>, binder: Arc<RequestBinder>) {
        self.binders.insert(operation.into(), binder);
    }

    fn get(&self, operation: &str) -> Option<Arc<RequestBinder>> {
        self.binders.get(operation).map(|b| Arc::clone(&b))
    }
}

/// Build the request DTO for the resolved operation.
pub fn bind_request(
    ctx: &RequestContext,
    route: &ResolvedRoute,
    binders: &BinderRegistry,
    types: &ContentTypes,
    filters: &FilterRegistry,
) -> HostResult<Value> {
    if let Some(binder) = binders.get(route.template.operation()) {
        let dto = binder(ctx)?;
        return Ok(filters.apply_request_converters(ctx, dto));
    }

    let dto = dto_from_body(ctx, types)?;
    let dto = overlay_params(dto, ctx, route)?;
    Ok(filters.apply_request_converters(ctx, dto))
}

/// Deserialize the body via the request content type, or start empty.
fn dto_from_body(ctx: &RequestContext, types: &ContentTypes) -> HostResult<Value> {
    if ctx.body.is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    let content_type = ctx
        .headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| HostError::binding("request body without a content type"))?;

    let deserializer = types.deserializer(content_type).ok_or_else(|| {
        HostError::binding(format!("no deserializer for content type {content_type:?}"))
    })?;

    deserializer.deserialize(&ctx.body)
}

/// Merge the flattened parameter map over the body DTO.
fn overlay_params(dto: Value, ctx: &RequestContext, route: &ResolvedRoute) -> HostResult<Value> {
    let mut fields = match dto {
        Value::Object(fields) => fields,
        other => {
            return Err(HostError::binding(format!(
                "request body must deserialize to an object, got {}",
                value_kind(&other)
            )));
        }
    };

    // Query first, then path variables override same-named keys.
    for (key, value) in &ctx.query {
        fields.insert(key.clone(), Value::String(value.clone()));
    }
    for (key, value) in &route.path_params {
        fields.insert(key.clone(), Value::String(value.clone()));
    }

    Ok(Value::Object(fields))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
