//! sprig-router: Zero-dependency ordered segment router
//!
//! Path matching and per-method route lists used by sprig-core.
//!
//! ## Features
//! - Static paths: `/users`, `/api/v1/health`
//! - Parameters: `/users/:id`, `/posts/:postId/comments/:commentId`
//! - First registered match wins (no specificity reordering)
//! - Zero external dependencies
//!
//! ## Path Syntax
//! - `:name` - Named parameter (captures exactly one segment)
//! - anything else - Literal segment, compared byte for byte
//!
//! Leading and trailing `/` are ignored on both patterns and paths, so
//! `/users/` and `users` are the same pattern. The empty pattern matches
//! only the root path.
//!
//! ## Example
//! ```
//! use sprig_router::Router;
//!
//! let mut router = Router::new();
//! router.insert("GET", "/users", 0);
//! router.insert("GET", "/users/:id", 1);
//!
//! let m = router.find("GET", "/users/123").unwrap();
//! assert_eq!(*m.handler, 1);
//! assert_eq!(m.params.get("id").map(String::as_str), Some("123"));
//! ```

use std::collections::HashMap;

/// Path parameters captured by a match (name -> segment value)
pub type Params = HashMap<String, String>;

/// Marker that introduces a named parameter segment
pub const PARAM_PREFIX: char = ':';

/// Split a path or pattern into segments.
///
/// Leading and trailing separators are trimmed first, so the root path
/// yields a single empty segment.
///
/// ```
/// let segments: Vec<&str> = sprig_router::segments("/users/42/").collect();
/// assert_eq!(segments, ["users", "42"]);
/// assert_eq!(sprig_router::segments("/").collect::<Vec<_>>(), [""]);
/// ```
pub fn segments(path: &str) -> std::str::Split<'_, char> {
    path.trim_matches('/').split('/')
}

/// One segment of a registered pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Must equal the path segment exactly
    Literal(String),
    /// Binds the path segment under this name
    Param(String),
}

/// A parsed route pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Parse a pattern such as `/users/:id`
    pub fn parse(pattern: &str) -> Self {
        let segments = segments(pattern)
            .map(|segment| match segment.strip_prefix(PARAM_PREFIX) {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(segment.to_string()),
            })
            .collect();

        Self {
            raw: pattern.to_string(),
            segments,
        }
    }

    /// The pattern as it was registered
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Parsed segments in order
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Match an incoming path against this pattern.
    ///
    /// Returns the bound parameters, or `None` if the segment counts differ
    /// or any literal segment is not byte-exact.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let parts: Vec<&str> = segments(path).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = Params::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Param(name) => {
                    params.insert(name.clone(), part.to_string());
                }
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
            }
        }
        Some(params)
    }
}

/// Match a raw pattern against a path in one step.
///
/// ```
/// let params = sprig_router::match_path("/get-user/:userId", "/get-user/7").unwrap();
/// assert_eq!(params["userId"], "7");
/// assert!(sprig_router::match_path("/get-user/:userId", "/get-user").is_none());
/// ```
pub fn match_path(pattern: &str, path: &str) -> Option<Params> {
    Pattern::parse(pattern).matches(path)
}

/// A registered route
#[derive(Debug, Clone)]
pub struct Route<H> {
    pattern: Pattern,
    handler: H,
}

impl<H> Route<H> {
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }
}

/// Route match result
#[derive(Debug, Clone, PartialEq)]
pub struct Match<'r, H> {
    /// The matched handler
    pub handler: &'r H,
    /// Captured path parameters
    pub params: Params,
}

/// Ordered segment router
///
/// Routes are grouped by HTTP method and scanned in registration order;
/// the first pattern that matches wins.
#[derive(Debug)]
pub struct Router<H> {
    /// Method -> routes in registration order
    routes: HashMap<String, Vec<Route<H>>>,
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }
}

impl<H> Router<H> {
    /// Create a new router
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route for `method`
    ///
    /// # Example
    /// ```
    /// use sprig_router::Router;
    ///
    /// let mut router = Router::new();
    /// router.insert("GET", "/users/:id", "get_user");
    /// router.insert("POST", "/users", "create_user");
    /// assert_eq!(router.len(), 2);
    /// ```
    pub fn insert(&mut self, method: &str, pattern: &str, handler: H) {
        self.routes
            .entry(method.to_uppercase())
            .or_default()
            .push(Route {
                pattern: Pattern::parse(pattern),
                handler,
            });
    }

    /// Find the first route registered for `method` that matches `path`
    pub fn find(&self, method: &str, path: &str) -> Option<Match<'_, H>> {
        self.routes
            .get(&method.to_uppercase())?
            .iter()
            .find_map(|route| {
                route.pattern.matches(path).map(|params| Match {
                    handler: &route.handler,
                    params,
                })
            })
    }

    /// Routes registered for `method`, in match-priority order
    pub fn routes(&self, method: &str) -> &[Route<H>] {
        self.routes
            .get(&method.to_uppercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Check if a method has any routes registered
    pub fn has_method(&self, method: &str) -> bool {
        self.routes.contains_key(&method.to_uppercase())
    }

    /// Get all registered methods
    pub fn methods(&self) -> Vec<String> {
        self.routes.keys().cloned().collect()
    }

    /// Total number of routes across all methods
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
