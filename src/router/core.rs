//! Router core module - hot path for request routing.
//!
//! Fixed routes resolve with one hash lookup (two when falling back to `ALL`);
//! generic routes are scanned in registration order. Routes are registered
//! single-threaded at startup and the router is shared read-only afterwards.

#![deny(clippy::inefficient_to_string)]
#![deny(clippy::format_push_string)]
#![deny(clippy::unnecessary_to_owned)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::Method;
use tracing::{debug, info, warn};

use super::error::RouteError;
use super::route::{route_key, ParamValue, ParamVec, Route, Verb};

/// Result of successfully resolving a path + method.
#[derive(Debug)]
pub struct RouteMatch<T> {
    pub route: Arc<Route<T>>,
    /// Extracted parameters in placeholder order (stack-allocated for ≤8).
    pub params: ParamVec,
}

impl<T> Clone for RouteMatch<T> {
    fn clone(&self) -> Self {
        Self {
            route: Arc::clone(&self.route),
            params: self.params.clone(),
        }
    }
}

impl<T> RouteMatch<T> {
    /// Look up a parameter by name. The last occurrence wins.
    #[inline]
    pub fn get_param(&self, name: &str) -> Option<&ParamValue> {
        self.params
            .iter()
            .rfind(|p| p.name.as_ref() == name)
            .map(|p| &p.value)
    }

    #[inline]
    pub fn param_at(&self, index: usize) -> Option<&ParamValue> {
        self.params.get(index).map(|p| &p.value)
    }

    pub fn target(&self) -> &T {
        self.route.target()
    }
}

/// Route registry and resolver.
pub struct Router<T> {
    fixed: HashMap<String, Arc<Route<T>>>,
    generic: Vec<Arc<Route<T>>>,
}

impl<T> Default for Router<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Router<T> {
    pub fn new() -> Self {
        Self {
            fixed: HashMap::new(),
            generic: Vec::new(),
        }
    }

    /// Register a route.
    ///
    /// Generic routes are appended, so on overlap the first registered wins.
    ///
    /// # Errors
    ///
    /// [`RouteError::DuplicateRoute`] when a fixed route with the same
    /// `full_path::VERB` key is already present.
    pub fn register(&mut self, route: Route<T>) -> Result<(), RouteError> {
        if route.is_generic() {
            debug!(
                hash_key = %route.hash_key(),
                pattern = %route.compiled().pattern().as_str(),
                position = self.generic.len(),
                "Generic route registered"
            );
            self.generic.push(Arc::new(route));
            return Ok(());
        }

        if self.fixed.contains_key(route.hash_key()) {
            warn!(hash_key = %route.hash_key(), "Duplicate fixed route rejected");
            return Err(RouteError::DuplicateRoute {
                hash_key: route.hash_key().to_owned(),
            });
        }
        debug!(hash_key = %route.hash_key(), "Fixed route registered");
        self.fixed
            .insert(route.hash_key().to_owned(), Arc::new(route));
        Ok(())
    }

    /// Resolve `path` (query string already stripped) for `method`.
    ///
    /// Order: exact `path::METHOD`, exact `path::ALL`, then the first generic
    /// route accepting the method whose pattern matches. `None` means not found.
    pub fn resolve(&self, path: &str, method: &Method) -> Option<RouteMatch<T>> {
        debug!(method = %method, path = %path, "Route match attempt");
        let match_start = Instant::now();

        let result = self.resolve_fixed(path, method).or_else(|| {
            self.generic.iter().find_map(|route| {
                if !route.verb().accepts(method) {
                    return None;
                }
                route.compiled().captures(path).map(|params| RouteMatch {
                    route: Arc::clone(route),
                    params,
                })
            })
        });

        let match_duration = match_start.elapsed();
        match &result {
            Some(hit) if match_duration > Duration::from_millis(1) => warn!(
                method = %method,
                path = %path,
                hash_key = %hit.route.hash_key(),
                path_params = ?hit.params,
                duration_us = match_duration.as_micros(),
                "Slow route matching detected"
            ),
            Some(hit) => info!(
                method = %method,
                path = %path,
                hash_key = %hit.route.hash_key(),
                path_params = ?hit.params,
                duration_us = match_duration.as_micros(),
                "Route matched"
            ),
            None => warn!(
                method = %method,
                path = %path,
                duration_us = match_duration.as_micros(),
                generic_routes = self.generic.len(),
                "No route matched"
            ),
        }
        result
    }

    fn resolve_fixed(&self, path: &str, method: &Method) -> Option<RouteMatch<T>> {
        self.fixed
            .get(&route_key(path, method.as_str()))
            .or_else(|| self.fixed.get(&route_key(path, Verb::All.as_str())))
            .map(|route| RouteMatch {
                route: Arc::clone(route),
                params: ParamVec::new(),
            })
    }

    /// All routes: fixed ones sorted by key, then generic ones in registration order.
    pub fn routes(&self) -> Vec<&Arc<Route<T>>> {
        let mut fixed: Vec<&Arc<Route<T>>> = self.fixed.values().collect();
        fixed.sort_by(|a, b| a.hash_key().cmp(b.hash_key()));
        fixed.extend(self.generic.iter());
        fixed
    }

    pub fn len(&self) -> usize {
        self.fixed.len() + self.generic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn generic_len(&self) -> usize {
        self.generic.len()
    }
}
