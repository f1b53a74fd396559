//! # razor
//!
//! **razor** is the core of an MVC-style web framework: a route compiler, a
//! dependency container and a controller dispatcher, driven by explicit
//! controller and service declarations.
//!
//! ## Architecture
//!
//! - **[`router`]** - Route template compilation, registration and resolution
//! - **[`ioc`]** - Type catalog, registration walk and dependency container
//! - **[`action`]** - Controller/action metadata and positional argument binding
//! - **[`middleware`]** - Scoped, prioritised request interceptors (CORS included)
//! - **[`dispatcher`]** - Request dispatch from route match to written response
//! - **[`worker_pool`]** - Bounded dispatch on `may` coroutines with backpressure
//! - **[`app`]** - Startup wiring with aggregated route errors
//! - **[`manifest`]** / **[`cli`]** - YAML route manifests and the `razor` binary
//! - **[`runtime_config`]** / **[`otel`]** - Configuration and structured logging
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Host as Transport
//!     participant Dispatcher
//!     participant Router
//!     participant Middleware as Middleware Chain
//!     participant Container
//!     participant Action
//!
//!     Host->>Dispatcher: dispatch(request, sink)
//!     Dispatcher->>Router: resolve(path, method)
//!     alt No route
//!         Dispatcher-->>Host: NotFound (404)
//!     end
//!     Dispatcher->>Middleware: apply in priority order
//!     alt Middleware wrote the sink
//!         Dispatcher-->>Host: Halted
//!     end
//!     Dispatcher->>Container: resolve controller
//!     Dispatcher->>Dispatcher: bind arguments
//!     alt Binding failed
//!         Dispatcher-->>Host: BadRequest (400)
//!     end
//!     Dispatcher->>Action: invoke
//!     Action-->>Dispatcher: ActionResult / error / panic
//!     Dispatcher-->>Host: Completed or InternalError (500)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use http::Method;
//! use razor::action::{ActionDescriptor, ActionResult, ControllerDescriptor, ParamSource};
//! use razor::app::AppBuilder;
//! use razor::dispatcher::DispatchRequest;
//! use razor::ioc::Component;
//!
//! #[derive(Default)]
//! struct BookController;
//!
//! let app = AppBuilder::new()
//!     .controller(
//!         ControllerDescriptor::new("shop", Component::<BookController>::with_default()).action(
//!             ActionDescriptor::get("book_detail", "books/{int:id}.html")
//!                 .param(ParamSource::Route)
//!                 .handler(|_: &BookController, ctx| {
//!                     Ok(ActionResult::text(format!("book {}", ctx.int(0)?)))
//!                 }),
//!         ),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let request = DispatchRequest::new(Method::GET, "/shop/books/12.html");
//! let (outcome, response) = app.dispatcher().dispatch_buffered(&request);
//! assert_eq!(outcome.status(), Some(200));
//! assert_eq!(response.body_text(), "book 12");
//! ```
//!
//! ## Runtime Considerations
//!
//! razor uses the `may` coroutine runtime for its worker pool, not tokio.
//! Coroutine stack size is configurable via `RAZOR_STACK_SIZE`.

pub mod action;
pub mod app;
pub mod cli;
pub mod dispatcher;
pub mod ids;
pub mod ioc;
pub mod manifest;
pub mod middleware;
pub mod otel;
pub mod router;
pub mod runtime_config;
pub mod worker_pool;

pub use app::{AppBuilder, Application, StartupError};
pub use dispatcher::{ActionOutcome, DispatchRequest, Dispatcher};
pub use router::{compile, Router};
