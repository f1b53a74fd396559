//! # CLI Module
//!
//! The `razor` binary: offline checks of a YAML route manifest.
//!
//! ## Commands
//!
//! ```bash
//! # Compile every route; exits non-zero listing all compile errors and duplicates
//! razor --manifest routes.yaml check
//!
//! # Print the route table (fixed routes by key, then generic routes)
//! razor --manifest routes.yaml routes
//!
//! # Show which action a request resolves to, with extracted parameters
//! razor --manifest routes.yaml match GET /shop/books/12.html
//! ```
//!
//! The manifest path may also come from `RAZOR_MANIFEST`; `--verbose` turns
//! on debug logging.

mod commands;

#[cfg(test)]
mod tests;

pub use commands::{execute, run_cli, Cli, Commands};
