use std::fmt;
use std::sync::Arc;

use http::Method;
use smallvec::SmallVec;

use super::compiler::CompiledRoute;

/// Maximum number of route parameters before heap allocation.
/// Controller routes rarely carry more than two or three placeholders.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Typed value extracted from a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Int(i64),
    Str(String),
}

impl ParamValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(v) => Some(v),
            ParamValue::Int(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Str(v) => f.write_str(v),
        }
    }
}

/// One extracted parameter. Names are shared with the compiled route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteParameter {
    pub name: Arc<str>,
    pub value: ParamValue,
}

/// Inline parameter storage for the resolve path, in placeholder order.
pub type ParamVec = SmallVec<[RouteParameter; MAX_INLINE_PARAMS]>;

/// HTTP verb a route is declared for. `All` accepts any method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
    All,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
            Verb::All => "ALL",
        }
    }

    /// Case-insensitive parse of a declared verb.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(Verb::Get),
            "POST" => Some(Verb::Post),
            "PUT" => Some(Verb::Put),
            "DELETE" => Some(Verb::Delete),
            "ALL" | "*" => Some(Verb::All),
            _ => None,
        }
    }

    pub fn accepts(&self, method: &Method) -> bool {
        match self {
            Verb::All => true,
            _ => method.as_str() == self.as_str(),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compiled route bound to a verb and a dispatch target.
///
/// `hash_key` (`full_path::VERB`) is computed once here because the compiler
/// does not know the verb.
#[derive(Debug, Clone)]
pub struct Route<T> {
    compiled: CompiledRoute,
    verb: Verb,
    hash_key: String,
    target: T,
}

impl<T> Route<T> {
    pub fn new(compiled: CompiledRoute, verb: Verb, target: T) -> Self {
        let hash_key = route_key(compiled.full_path(), verb.as_str());
        Self {
            compiled,
            verb,
            hash_key,
            target,
        }
    }

    pub fn compiled(&self) -> &CompiledRoute {
        &self.compiled
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn hash_key(&self) -> &str {
        &self.hash_key
    }

    pub fn full_path(&self) -> &str {
        self.compiled.full_path()
    }

    pub fn is_generic(&self) -> bool {
        self.compiled.is_generic()
    }

    pub fn target(&self) -> &T {
        &self.target
    }
}

pub(crate) fn route_key(path: &str, verb: &str) -> String {
    let mut key = String::with_capacity(path.len() + verb.len() + 2);
    key.push_str(path);
    key.push_str("::");
    key.push_str(verb);
    key
}
