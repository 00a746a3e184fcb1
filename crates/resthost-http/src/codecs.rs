//! Content-type registry and the serializer/deserializer seam.
//!
//! The engine does not hard-code wire formats. Codecs are registered per
//! content type, keyed both by the canonical content type (for negotiation
//! and body deserialization) and by a short format name (for the `format`
//! query parameter and route extensions such as `/users/1.json`).
//!
//! JSON and XML codecs ship as defaults; anything else plugs in through
//! [`Serializer`] / [`Deserializer`].

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

use resthost_model::{HostError, HostResult};

use crate::xml::XmlCodec;

/// Canonical JSON content type.
pub const JSON: &str = "application/json";

/// Canonical XML content type.
pub const XML: &str = "application/xml";

/// Content type used for JSONP-wrapped responses.
pub const JAVASCRIPT: &str = "application/javascript";

/// Serializes a structured value into response bytes.
pub trait Serializer: Send + Sync {
    /// Encode `value` in this codec's wire format.
    fn serialize(&self, value: &Value) -> HostResult<Bytes>;
}

/// Deserializes request body bytes into a structured value.
pub trait Deserializer: Send + Sync {
    /// Decode `body` from this codec's wire format.
    fn deserialize(&self, body: &[u8]) -> HostResult<Value>;
}

struct Codec {
    serializer: Arc<dyn Serializer>,
    deserializer: Arc<dyn Deserializer>,
}

/// Registry of supported content types, formats, and their codecs.
///
/// Built once during host construction and shared read-only afterwards.
pub struct ContentTypes {
    default_content_type: String,
    formats: Vec<(String, String)>,
    codecs: HashMap<String, Codec>,
}

impl std::fmt::Debug for ContentTypes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentTypes")
            .field("default_content_type", &self.default_content_type)
            .field("formats", &self.formats)
            .field("codecs", &self.codecs.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ContentTypes {
    /// Create a registry with the built-in JSON and XML codecs.
    #[must_use]
    pub fn with_defaults(default_content_type: impl Into<String>) -> Self {
        let mut types = Self {
            default_content_type: canonical(&default_content_type.into()).into_owned(),
            formats: Vec::new(),
            codecs: HashMap::new(),
        };
        types.register("json", JSON, Arc::new(JsonCodec), Arc::new(JsonCodec));
        types.register("xml", XML, Arc::new(XmlCodec), Arc::new(XmlCodec));
        types
    }

    /// Register a codec under `format` and `content_type`.
    ///
    /// Re-registering a content type replaces its codec; the format table
    /// keeps first-registered wins so extension routing stays stable.
    pub fn register(
        &mut self,
        format: &str,
        content_type: &str,
        serializer: Arc<dyn Serializer>,
        deserializer: Arc<dyn Deserializer>,
    ) {
        let content_type = canonical(content_type).into_owned();
        if !self.formats.iter().any(|(f, _)| f == format) {
            self.formats
                .push((format.to_owned(), content_type.clone()));
        }
        self.codecs.insert(
            content_type,
            Codec {
                serializer,
                deserializer,
            },
        );
    }

    /// The host default response content type.
    #[must_use]
    pub fn default_content_type(&self) -> &str {
        &self.default_content_type
    }

    /// Map a format name (`json`, `xml`, ...) to its content type.
    #[must_use]
    pub fn format_content_type(&self, format: &str) -> Option<&str> {
        self.formats
            .iter()
            .find(|(f, _)| f == format)
            .map(|(_, ct)| ct.as_str())
    }

    /// Whether a codec is registered for `content_type`.
    #[must_use]
    pub fn supports(&self, content_type: &str) -> bool {
        self.codecs.contains_key(canonical(content_type).as_ref())
    }

    /// The serializer for `content_type`, if registered.
    #[must_use]
    pub fn serializer(&self, content_type: &str) -> Option<Arc<dyn Serializer>> {
        self.codecs
            .get(canonical(content_type).as_ref())
            .map(|c| Arc::clone(&c.serializer))
    }

    /// The deserializer for `content_type`, if registered.
    #[must_use]
    pub fn deserializer(&self, content_type: &str) -> Option<Arc<dyn Deserializer>> {
        self.codecs
            .get(canonical(content_type).as_ref())
            .map(|c| Arc::clone(&c.deserializer))
    }
}

impl Default for ContentTypes {
    fn default() -> Self {
        Self::with_defaults(JSON)
    }
}

/// Normalize a content type for lookup: lowercase, parameters stripped.
///
/// `Application/JSON; charset=utf-8` and `application/json` are the same
/// codec key.
#[must_use]
pub fn canonical(content_type: &str) -> std::borrow::Cow<'_, str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim();
    if essence.chars().all(|c| c.is_ascii_lowercase() || !c.is_ascii_alphabetic()) {
        std::borrow::Cow::Borrowed(essence)
    } else {
        std::borrow::Cow::Owned(essence.to_ascii_lowercase())
    }
}

/// Built-in JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Serializer for JsonCodec {
    fn serialize(&self, value: &Value) -> HostResult<Bytes> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| HostError::pipeline(format!("JSON serialization failed: {e}")))
    }
}

impl Deserializer for JsonCodec {
    fn deserialize(&self, body: &[u8]) -> HostResult<Value> {
        serde_json::from_slice(body)
            .map_err(|e| HostError::binding(format!("invalid JSON body: {e}")))
    }
}
