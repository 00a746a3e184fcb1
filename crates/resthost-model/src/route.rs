//! Route templates and path matching primitives.
//!
//! A route template is an immutable (verb-set, path-pattern, operation)
//! triple. Patterns use `{name}` for variable segments and an optional
//! trailing `*` to match any number of remaining segments:
//!
//! ```text
//! GET,POST  /users/{id}/posts
//! ANY       /files/*
//! ```
//!
//! Matching is per-segment: literals compare case-sensitively, variables
//! capture exactly one segment by name. Specificity is the count of literal
//! segments and decides between templates that both match.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;

use crate::error::RouteError;

/// The set of HTTP verbs a route template answers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerbSet {
    /// Matches every verb.
    Any,
    /// Matches only the listed verbs.
    Verbs(Vec<Method>),
}

impl VerbSet {
    /// Parse a verb list such as `"GET"`, `"GET,POST"`, or `"ANY"`.
    pub fn parse(input: &str) -> Result<Self, RouteError> {
        if input.trim().eq_ignore_ascii_case("any") {
            return Ok(Self::Any);
        }

        let mut verbs = Vec::new();
        for part in input.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(RouteError::InvalidVerbs(input.to_owned()));
            }
            let method = Method::from_bytes(part.to_ascii_uppercase().as_bytes())
                .map_err(|_| RouteError::InvalidVerbs(input.to_owned()))?;
            verbs.push(method);
        }
        if verbs.is_empty() {
            return Err(RouteError::InvalidVerbs(input.to_owned()));
        }
        Ok(Self::Verbs(verbs))
    }

    /// Whether this set contains `method`.
    #[must_use]
    pub fn contains(&self, method: &Method) -> bool {
        match self {
            Self::Any => true,
            Self::Verbs(verbs) => verbs.contains(method),
        }
    }
}

impl std::fmt::Display for VerbSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => f.write_str("ANY"),
            Self::Verbs(verbs) => {
                for (i, v) in verbs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{v}")?;
                }
                Ok(())
            }
        }
    }
}

/// One segment of a parsed path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Must match the request segment exactly (case-sensitive).
    Literal(String),
    /// Matches any single segment and captures it under the given name.
    Variable(String),
    /// Matches any number of trailing segments. Only valid in last position.
    Wildcard,
}

/// An immutable registered route.
#[derive(Debug, Clone)]
pub struct RouteTemplate {
    verbs: VerbSet,
    segments: Vec<PathSegment>,
    operation: String,
    pattern: String,
    specificity: usize,
}

impl RouteTemplate {
    /// Parse `pattern` into a template targeting `operation`.
    ///
    /// Patterns must be absolute (`/...`). Variables must be non-empty and
    /// unique within the pattern; a wildcard may only appear as the final
    /// segment.
    pub fn parse(
        verbs: VerbSet,
        pattern: &str,
        operation: impl Into<String>,
    ) -> Result<Self, RouteError> {
        if !pattern.starts_with('/') {
            return Err(RouteError::invalid_pattern(
                pattern,
                "pattern must start with '/'",
            ));
        }

        let mut segments = Vec::new();
        let mut seen_vars: Vec<&str> = Vec::new();
        let raw: Vec<&str> = pattern
            .trim_end_matches('/')
            .split('/')
            .skip(1) // leading empty segment before the first '/'
            .collect();

        for (i, part) in raw.iter().enumerate() {
            if part.is_empty() {
                return Err(RouteError::invalid_pattern(pattern, "empty path segment"));
            }
            if *part == "*" {
                if i + 1 != raw.len() {
                    return Err(RouteError::invalid_pattern(
                        pattern,
                        "wildcard must be the final segment",
                    ));
                }
                segments.push(PathSegment::Wildcard);
            } else if let Some(name) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                if name.is_empty() {
                    return Err(RouteError::invalid_pattern(pattern, "empty variable name"));
                }
                if seen_vars.contains(&name) {
                    return Err(RouteError::invalid_pattern(
                        pattern,
                        format!("duplicate variable {name:?}"),
                    ));
                }
                seen_vars.push(name);
                segments.push(PathSegment::Variable(name.to_owned()));
            } else {
                segments.push(PathSegment::Literal((*part).to_owned()));
            }
        }

        let specificity = segments
            .iter()
            .filter(|s| matches!(s, PathSegment::Literal(_)))
            .count();

        Ok(Self {
            verbs,
            segments,
            operation: operation.into(),
            pattern: pattern.to_owned(),
            specificity,
        })
    }

    /// The verb set this template answers to.
    #[must_use]
    pub fn verbs(&self) -> &VerbSet {
        &self.verbs
    }

    /// The target operation identifier.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// The original pattern string, as registered.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Count of literal segments; higher wins among matching templates.
    #[must_use]
    pub fn specificity(&self) -> usize {
        self.specificity
    }

    /// Whether the template ends in a wildcard segment.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        matches!(self.segments.last(), Some(PathSegment::Wildcard))
    }

    /// Match `path_segments` against this template.
    ///
    /// Returns the captured path variables on a match, `None` otherwise.
    #[must_use]
    pub fn matches(&self, path_segments: &[&str]) -> Option<HashMap<String, String>> {
        let fixed = if self.is_wildcard() {
            let fixed = self.segments.len() - 1;
            if path_segments.len() < fixed {
                return None;
            }
            fixed
        } else {
            if path_segments.len() != self.segments.len() {
                return None;
            }
            self.segments.len()
        };

        let mut captures = HashMap::new();
        for (segment, part) in self.segments[..fixed].iter().zip(path_segments) {
            match segment {
                PathSegment::Literal(lit) => {
                    if lit != part {
                        return None;
                    }
                }
                PathSegment::Variable(name) => {
                    captures.insert(name.clone(), (*part).to_owned());
                }
                PathSegment::Wildcard => unreachable!("wildcard only in final position"),
            }
        }
        Some(captures)
    }
}

/// The result of a successful route resolution.
#[derive(Debug, Clone)]
pub struct ResolvedRoute {
    /// The matched template.
    pub template: Arc<RouteTemplate>,
    /// Path variables captured during matching.
    pub path_params: HashMap<String, String>,
    /// Content type derived from a stripped path extension, if any.
    pub content_type_override: Option<String>,
}

/// Split a request path into non-empty segments.
#[must_use]
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}
