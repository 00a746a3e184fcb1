//! Response content-type selection.
//!
//! Precedence: route extension override, then the explicit `format` query
//! parameter, then the `Accept` header, then the host default. An `Accept`
//! header that names only unsupported concrete types (no wildcard) is a
//! negotiation failure.

use http::header;

use resthost_model::{HostError, RequestContext};

use crate::codecs::ContentTypes;

/// Choose the response content type for `ctx`.
///
/// `override_type` is the content type derived from a stripped route
/// extension, which wins outright when present.
pub fn select_response_content_type(
    ctx: &RequestContext,
    override_type: Option<&str>,
    types: &ContentTypes,
) -> Result<String, HostError> {
    if let Some(ct) = override_type {
        return Ok(ct.to_owned());
    }

    // An explicit, recognized format parameter is next; unknown formats
    // fall through to header negotiation.
    if let Some(format) = ctx.format_param() {
        if let Some(ct) = types.format_content_type(format) {
            return Ok(ct.to_owned());
        }
    }

    if let Some(accept) = ctx.headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) {
        return negotiate_accept(accept, types);
    }

    Ok(types.default_content_type().to_owned())
}

/// Pick the first supported entry of an `Accept` header, in listed order.
/// A `*/*` (or `type/*`) entry falls back to the host default.
fn negotiate_accept(accept: &str, types: &ContentTypes) -> Result<String, HostError> {
    let mut saw_entry = false;
    for entry in accept.split(',') {
        let Ok(media) = entry.trim().parse::<mime::Mime>() else {
            continue;
        };
        saw_entry = true;
        if media.subtype() == mime::STAR {
            return Ok(types.default_content_type().to_owned());
        }
        if types.supports(media.essence_str()) {
            return Ok(media.essence_str().to_owned());
        }
    }

    if saw_entry {
        Err(HostError::UnsupportedContentType(accept.to_owned()))
    } else {
        // Unparseable header; treat as absent.
        Ok(types.default_content_type().to_owned())
    }
}
