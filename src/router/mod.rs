//! # Router Module
//!
//! Route compilation, registration and resolution.
//!
//! ## Overview
//!
//! A route is declared as a *prefix* (usually the controller's) plus a *template*
//! relative to it. Templates mix literal text with typed placeholders and a
//! wildcard suffix:
//!
//! | Template fragment | Meaning | Compiled group |
//! |-------------------|---------|----------------|
//! | `books`           | literal | escaped text   |
//! | `{slug}`          | string parameter | `([0-9a-zA-Z\-_]+)` |
//! | `{int:id}`        | integer parameter | `([0-9]+)` |
//! | `*`               | wildcard | `(?:[0-9a-zA-Z\-_./]+)?` (not captured) |
//!
//! ## Architecture
//!
//! 1. **Compilation** ([`compile`]): prefix + template become an anchored regex
//!    together with an ordered list of [`ParamDescriptor`]s. Wildcards never
//!    capture, so capture group *i* always belongs to parameter *i*.
//!
//! 2. **Registration** ([`Router::register`]): fixed routes (no placeholder, no
//!    wildcard) go to a hash table keyed by `full_path::VERB`; generic routes go
//!    to an insertion-ordered list.
//!
//! 3. **Resolution** ([`Router::resolve`]): exact `path::VERB`, then exact
//!    `path::ALL`, then a first-match scan over generic routes.
//!
//! ## Example
//!
//! ```rust
//! use http::Method;
//! use razor::router::{compile, ParamValue, Route, Router, Verb};
//!
//! let mut router = Router::new();
//! let compiled = compile("shop", "books/{int:id}.html").unwrap();
//! router.register(Route::new(compiled, Verb::Get, "book_detail")).unwrap();
//!
//! let hit = router.resolve("/shop/books/42.html", &Method::GET).unwrap();
//! assert_eq!(*hit.route.target(), "book_detail");
//! assert_eq!(hit.get_param("id"), Some(&ParamValue::Int(42)));
//! ```

mod compiler;
mod core;
mod error;
mod route;
#[cfg(test)]
mod tests;

pub use compiler::{compile, CompiledRoute, ParamDescriptor, ParamKind};
pub use core::{RouteMatch, Router};
pub use error::{CompileError, RouteError};
pub use route::{ParamValue, ParamVec, Route, RouteParameter, Verb, MAX_INLINE_PARAMS};
