//! Route registry and resolution.
//!
//! Registration is append-only from the caller's perspective, but the
//! registry is internally copy-on-write: each registration builds a new
//! snapshot and swaps it in, so concurrent resolutions never observe a
//! partially-updated route set. A duplicate-existence set is rebuilt under
//! the same lock to reject re-registration of an identical
//! (verb-set, pattern) pair.
//!
//! Resolution picks the matching template with the highest specificity
//! (count of literal segments); ties go to the first registered.

use std::collections::HashSet;
use std::sync::Arc;

use http::Method;
use parking_lot::RwLock;

use resthost_model::{
    HostError, ResolvedRoute, RouteError, RouteTemplate, VerbSet, split_path,
};

use crate::codecs::ContentTypes;

#[derive(Default)]
struct Routes {
    snapshot: Arc<Vec<Arc<RouteTemplate>>>,
    declared: HashSet<(String, String)>,
}

/// Immutable-after-registration set of route templates.
pub struct RouteRegistry {
    routes: RwLock<Routes>,
}

impl std::fmt::Debug for RouteRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteRegistry")
            .field("len", &self.len())
            .finish()
    }
}

impl RouteRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(Routes::default()),
        }
    }

    /// Register a route template.
    ///
    /// Duplicate (verb-set, pattern) registrations are rejected; the target
    /// operation of the first registration stays in effect.
    pub fn register(
        &self,
        verbs: VerbSet,
        pattern: &str,
        operation: impl Into<String>,
    ) -> Result<(), RouteError> {
        let template = RouteTemplate::parse(verbs, pattern, operation)?;
        let key = (template.verbs().to_string(), template.pattern().to_owned());

        let mut routes = self.routes.write();
        if routes.declared.contains(&key) {
            return Err(RouteError::Duplicate(format!(
                "{} {}",
                key.0, key.1
            )));
        }

        // Copy-on-write: readers keep the old snapshot until the swap.
        let mut next = Vec::with_capacity(routes.snapshot.len() + 1);
        next.extend(routes.snapshot.iter().cloned());
        next.push(Arc::new(template));
        routes.snapshot = Arc::new(next);
        routes.declared.insert(key);
        Ok(())
    }

    /// Number of registered templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.read().snapshot.len()
    }

    /// Whether no templates are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The current route snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Arc<RouteTemplate>>> {
        Arc::clone(&self.routes.read().snapshot)
    }

    /// Resolve `verb` + `raw_path` to a registered route.
    ///
    /// When `extensions` is given, a trailing `.ext` on the final path
    /// segment naming a registered format is stripped first and recorded as
    /// the response content-type override. Unrecognized extensions leave
    /// the path untouched.
    pub fn resolve(
        &self,
        verb: &Method,
        raw_path: &str,
        extensions: Option<&ContentTypes>,
    ) -> Result<ResolvedRoute, HostError> {
        let (path, content_type_override) = match extensions {
            Some(types) => strip_format_extension(raw_path, types),
            None => (raw_path.to_owned(), None),
        };

        let segments = split_path(&path);
        let snapshot = self.snapshot();

        let mut best: Option<(usize, &Arc<RouteTemplate>, _)> = None;
        for template in snapshot.iter() {
            if !template.verbs().contains(verb) {
                continue;
            }
            let Some(captures) = template.matches(&segments) else {
                continue;
            };
            // Strictly-greater keeps the first registered on ties.
            let better = best
                .as_ref()
                .is_none_or(|(score, _, _)| template.specificity() > *score);
            if better {
                best = Some((template.specificity(), template, captures));
            }
        }

        match best {
            Some((_, template, path_params)) => Ok(ResolvedRoute {
                template: Arc::clone(template),
                path_params,
                content_type_override,
            }),
            None => Err(HostError::route_not_found(verb.as_str(), raw_path)),
        }
    }
}

impl Default for RouteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip a recognized format extension from the final path segment.
fn strip_format_extension(path: &str, types: &ContentTypes) -> (String, Option<String>) {
    let last_slash = path.rfind('/').map_or(0, |i| i + 1);
    if let Some(dot) = path[last_slash..].rfind('.') {
        let dot = last_slash + dot;
        let format = &path[dot + 1..];
        if let Some(content_type) = types.format_content_type(format) {
            return (path[..dot].to_owned(), Some(content_type.to_owned()));
        }
    }
    (path.to_owned(), None)
}
