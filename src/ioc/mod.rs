//! # IoC Module
//!
//! Dependency container with explicit type declarations.
//!
//! ## Overview
//!
//! Types are declared in a [`TypeCatalog`] as [`Component`]s (constructors,
//! field injections, lifecycle, implemented interfaces). A
//! [`RegistrationBuilder`] walks the catalog from root types and produces a
//! [`Container`], which resolves wired instances on demand.
//!
//! ```rust
//! use std::sync::Arc;
//! use razor::ioc::{Component, Constructor, RegistrationBuilder, TypeCatalog};
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! struct English;
//! impl Greeter for English {
//!     fn greet(&self) -> String { "hello".into() }
//! }
//!
//! struct Front { greeter: Arc<dyn Greeter> }
//!
//! let mut catalog = TypeCatalog::new();
//! catalog
//!     .add(Component::<English>::new()
//!         .singleton()
//!         .constructor(Constructor::new(|| English))
//!         .implements::<dyn Greeter, _>(|e| e as Arc<dyn Greeter>))
//!     .add(Component::<Front>::new()
//!         .constructor(Constructor::with1(|greeter: Arc<dyn Greeter>| Front { greeter })));
//!
//! let mut builder = RegistrationBuilder::new(Arc::new(catalog));
//! builder.register_root_type::<Front>();
//! let container = builder.build();
//!
//! let front = container.resolve::<Front>().unwrap();
//! assert_eq!(front.greeter.greet(), "hello");
//! ```
//!
//! ## Lifecycles
//!
//! - [`Lifecycle::Singleton`]: constructed once per container, on first use.
//! - [`Lifecycle::PerRequest`] (default): constructed on every resolution.

mod builder;
mod catalog;
mod container;
mod error;

pub use builder::{RegistrationBuilder, RegistrationEntry, RegistrationHandle, ServiceKey};
pub use catalog::{
    downcast, wrap, Args, Component, ConcreteDescriptor, Constructor, Instance,
    InterfaceDescriptor, Lifecycle, ServiceDescriptor, TypeCatalog, TypeKey,
};
pub use container::Container;
pub use error::{RegisterError, ResolveError};
