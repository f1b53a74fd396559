//! # Action Module
//!
//! Controller and action metadata, and the positional argument binding the
//! dispatcher applies before invoking an action.
//!
//! ```rust
//! use razor::action::{ActionDescriptor, ActionResult, ControllerDescriptor, ParamSource};
//! use razor::ioc::Component;
//!
//! #[derive(Default)]
//! struct BookController;
//!
//! let controller = ControllerDescriptor::new("shop", Component::<BookController>::with_default())
//!     .action(
//!         ActionDescriptor::get("book_detail", "books/{int:id}.html")
//!             .param(ParamSource::Route)
//!             .handler(|_: &BookController, ctx| {
//!                 Ok(ActionResult::text(format!("book {}", ctx.int(0)?)))
//!             }),
//!     );
//! assert_eq!(controller.actions().len(), 1);
//! ```

mod binding;
mod metadata;

pub use binding::{bind_arguments, ActionArgs, ActionContext, ArgValue, BindError};
pub use metadata::{
    ActionDescriptor, ActionError, ActionFn, ActionResult, ControllerDescriptor, ParamSource,
    QueryKind,
};
pub(crate) use metadata::{short_type_name, ControllerRoutes};
