//! # Dispatcher Module
//!
//! Request dispatch for razor: from a [`DispatchRequest`] to an action result
//! written into a [`ResponseSink`].
//!
//! ## Request Flow
//!
//! 1. The router resolves method + path to an [`ActionBinding`]
//!    (no match → [`ActionOutcome::NotFound`])
//! 2. The route's middlewares run in ascending priority; the first one that
//!    writes the sink ends the request ([`ActionOutcome::Halted`])
//! 3. The controller is resolved from the container
//! 4. Arguments are bound positionally (route value, else query/body/files)
//! 5. The action is invoked; panics are caught and reported as
//!    [`ActionOutcome::InternalError`]
//! 6. Unless the action wrote the sink itself, its [`ActionResult`](crate::action::ActionResult)
//!    is serialised with a default status
//!
//! ## Error Handling
//!
//! Failures are outcomes, never panics: [`ActionOutcome::status`] maps them to
//! 404 / 400 / 500 for the transport, and
//! [`Dispatcher::dispatch_buffered`] writes a JSON error body for them.
//!
//! ## Concurrency
//!
//! A [`Dispatcher`] holds the router and container behind `Arc` and is shared
//! read-only; see [`worker_pool`](crate::worker_pool) for running dispatches
//! on `may` coroutines.

mod core;
mod request;

pub use core::{ActionBinding, ActionOutcome, DispatchError, Dispatcher};
pub(crate) use core::panic_message;
pub use request::{
    BufferedResponse, DispatchRequest, FormFile, HeaderVec, ResponseSink, MAX_INLINE_HEADERS,
};
