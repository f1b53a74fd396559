//! # Middleware Module
//!
//! Interceptors that run before an action, resolved per route at startup.
//!
//! Middlewares are registered globally, for a path, or for a controller prefix
//! (which covers `prefix/*`). When routes are built, each route's full path is
//! reduced to a scope key (generic paths collapse to their static head plus
//! `/*`) and every middleware whose key covers it is attached to the route,
//! sorted by ascending priority.
//!
//! ```rust
//! use std::sync::Arc;
//! use razor::dispatcher::{DispatchRequest, ResponseSink};
//! use razor::middleware::{CorsMiddleware, MiddlewareRegistry};
//!
//! let mut registry = MiddlewareRegistry::new();
//! registry.use_global(Arc::new(CorsMiddleware::new()));
//! registry.use_controller(
//!     "admin",
//!     Arc::new(|req: &DispatchRequest, res: &mut dyn ResponseSink| {
//!         if req.header("authorization").is_none() {
//!             res.write(401, Default::default(), Vec::new());
//!         }
//!     }),
//! );
//! assert_eq!(registry.collect("/admin/users/{int:id}").len(), 2);
//! assert_eq!(registry.collect("/shop").len(), 1);
//! ```

mod core;
mod cors;

pub use core::{Middleware, MiddlewareRegistry};
pub use cors::{CorsConfigError, CorsMiddleware};
