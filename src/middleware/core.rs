use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::dispatcher::{DispatchRequest, ResponseSink};

/// Request interceptor run before the action.
///
/// A middleware ends the request by writing to the sink; the dispatcher then
/// skips the remaining middlewares and the action.
pub trait Middleware: Send + Sync {
    fn apply(&self, req: &DispatchRequest, res: &mut dyn ResponseSink);

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<F> Middleware for F
where
    F: Fn(&DispatchRequest, &mut dyn ResponseSink) + Send + Sync,
{
    fn apply(&self, req: &DispatchRequest, res: &mut dyn ResponseSink) {
        self(req, res)
    }
}

#[allow(clippy::expect_used)]
static SCOPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(/[0-9a-zA-Z\-_./]+)?(/[0-9a-zA-Z\-_.]*\{.+\}.*)?((/\*)(.*))?$")
        .expect("scope regex is valid")
});

#[derive(Clone)]
struct Registered {
    priority: i32,
    middleware: Arc<dyn Middleware>,
}

/// Global and path-scoped middlewares with priorities.
///
/// Unspecified priorities follow registration order: a global middleware gets
/// the current global count, a scoped one gets the global count plus the size
/// of its path's set.
#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    global: Vec<Registered>,
    scoped: Vec<(String, Vec<Registered>)>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn use_global(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        let priority = count_priority(self.global.len());
        self.use_global_with_priority(middleware, priority)
    }

    pub fn use_global_with_priority(
        &mut self,
        middleware: Arc<dyn Middleware>,
        priority: i32,
    ) -> &mut Self {
        debug!(middleware = middleware.name(), priority, "Global middleware registered");
        self.global.push(Registered {
            priority,
            middleware,
        });
        self
    }

    /// Scope a middleware to `path`. A path ending in `/*` covers everything below it.
    pub fn use_path(&mut self, path: &str, middleware: Arc<dyn Middleware>) -> &mut Self {
        let path = normalize_path(path);
        let set_len = self
            .scoped
            .iter()
            .find(|(p, _)| *p == path)
            .map_or(0, |(_, set)| set.len());
        let priority = count_priority(self.global.len() + set_len);
        self.push_scoped(path, middleware, priority)
    }

    pub fn use_path_with_priority(
        &mut self,
        path: &str,
        middleware: Arc<dyn Middleware>,
        priority: i32,
    ) -> &mut Self {
        let path = normalize_path(path);
        self.push_scoped(path, middleware, priority)
    }

    /// Scope a middleware to every route under a controller prefix.
    pub fn use_controller(&mut self, prefix: &str, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.use_path(&controller_scope(prefix), middleware)
    }

    pub fn use_controller_with_priority(
        &mut self,
        prefix: &str,
        middleware: Arc<dyn Middleware>,
        priority: i32,
    ) -> &mut Self {
        self.use_path_with_priority(&controller_scope(prefix), middleware, priority)
    }

    fn push_scoped(
        &mut self,
        path: String,
        middleware: Arc<dyn Middleware>,
        priority: i32,
    ) -> &mut Self {
        debug!(
            middleware = middleware.name(),
            path = %path,
            priority,
            "Scoped middleware registered"
        );
        let entry = Registered {
            priority,
            middleware,
        };
        match self.scoped.iter_mut().find(|(p, _)| *p == path) {
            Some((_, set)) => set.push(entry),
            None => self.scoped.push((path, vec![entry])),
        }
        self
    }

    /// Middlewares applying to a route's full path, ascending by priority.
    /// Ties keep global-before-scoped registration order.
    pub fn collect(&self, full_path: &str) -> Vec<Arc<dyn Middleware>> {
        let scope = scope_key(full_path);
        let mut selected: Vec<&Registered> = self.global.iter().collect();
        for (path, set) in &self.scoped {
            if scope_applies(path, &scope) {
                selected.extend(set.iter());
            }
        }
        selected.sort_by_key(|r| r.priority);
        selected
            .into_iter()
            .map(|r| Arc::clone(&r.middleware))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.global.len() + self.scoped.iter().map(|(_, set)| set.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn count_priority(count: usize) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn controller_scope(prefix: &str) -> String {
    let prefix = normalize_path(prefix);
    format!("{}/*", prefix.trim_end_matches('/'))
}

/// Collapse a generic route path to its static head plus `/*`.
/// Fixed paths are returned unchanged.
pub(crate) fn scope_key(full_path: &str) -> String {
    let Some(caps) = SCOPE_RE.captures(full_path) else {
        return full_path.to_string();
    };
    match caps.get(1) {
        None => "/*".to_string(),
        Some(head) if head.as_str() != full_path => format!("{}/*", head.as_str()),
        Some(_) => full_path.to_string(),
    }
}

fn scope_applies(key: &str, scope: &str) -> bool {
    if key == scope {
        return true;
    }
    match key.strip_suffix('*') {
        Some(head) if head.ends_with('/') => scope.starts_with(head),
        _ => false,
    }
}
