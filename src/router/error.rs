use std::fmt;

/// Errors raised while turning a prefix + template into a [`CompiledRoute`](super::CompiledRoute).
///
/// Every variant carries the full offending path so startup logs can point at
/// the exact declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Prefix does not match `^/([0-9a-zA-Z\-_/]+)?$` after normalisation.
    InvalidPrefix { prefix: String },
    /// A `{` was opened and never closed.
    UnclosedPlaceholder { template: String },
    /// A brace appeared where none is allowed (nested `{` or stray `}`).
    UnexpectedBrace { template: String, position: usize },
    /// `{}` or `{int:}`.
    EmptyParamName { template: String },
    /// Parameter names must be `[A-Za-z0-9_]+`.
    InvalidParamName { template: String, name: String },
    /// The same parameter name appears twice in one template.
    DuplicateParam { template: String, name: String },
    /// Template text outside placeholders is not route-safe.
    InvalidTemplate { template: String, reason: String },
    /// The regex engine rejected the generated pattern.
    Pattern { template: String, message: String },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::InvalidPrefix { prefix } => {
                write!(f, "invalid route prefix '{prefix}'")
            }
            CompileError::UnclosedPlaceholder { template } => {
                write!(f, "unclosed placeholder in route template '{template}'")
            }
            CompileError::UnexpectedBrace { template, position } => write!(
                f,
                "unexpected brace at position {position} in route template '{template}'"
            ),
            CompileError::EmptyParamName { template } => {
                write!(f, "empty parameter name in route template '{template}'")
            }
            CompileError::InvalidParamName { template, name } => write!(
                f,
                "invalid parameter name '{name}' in route template '{template}'"
            ),
            CompileError::DuplicateParam { template, name } => write!(
                f,
                "parameter '{name}' declared more than once in route template '{template}'"
            ),
            CompileError::InvalidTemplate { template, reason } => {
                write!(f, "invalid route template '{template}': {reason}")
            }
            CompileError::Pattern { template, message } => write!(
                f,
                "route template '{template}' produced an invalid pattern: {message}"
            ),
        }
    }
}

impl std::error::Error for CompileError {}

/// Errors raised by [`Router::register`](super::Router::register).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// A fixed route with the same `full_path::VERB` key is already registered.
    DuplicateRoute { hash_key: String },
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::DuplicateRoute { hash_key } => {
                write!(f, "duplicate fixed route '{hash_key}'")
            }
        }
    }
}

impl std::error::Error for RouteError {}
