use std::fmt;

/// Startup-time registration failures. Collected by the
/// [`RegistrationBuilder`](super::RegistrationBuilder), logged, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterError {
    /// `register_type` was called with an interface key.
    InterfaceRegistration { ty: &'static str },
    /// The type has no catalog entry.
    UnknownType { ty: &'static str },
    /// No designated constructor could be chosen.
    ConstructorSelection {
        ty: &'static str,
        constructors: usize,
        marked: usize,
    },
    /// The registration walk re-entered a type that is still being visited.
    CircularDependency { cycle: Vec<&'static str> },
    /// `as_type::<I>()` on a type the catalog does not list as an implementer of `I`.
    NotAnImplementer {
        interface: &'static str,
        implementation: &'static str,
    },
}

impl fmt::Display for RegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterError::InterfaceRegistration { ty } => {
                write!(f, "cannot register interface type '{ty}' directly")
            }
            RegisterError::UnknownType { ty } => {
                write!(f, "type '{ty}' is not declared in the type catalog")
            }
            RegisterError::ConstructorSelection {
                ty,
                constructors,
                marked,
            } => write!(
                f,
                "cannot select a constructor for '{ty}': {constructors} declared, \
                 {marked} marked for injection"
            ),
            RegisterError::CircularDependency { cycle } => {
                write!(f, "circular dependency detected: {}", cycle.join(" -> "))
            }
            RegisterError::NotAnImplementer {
                interface,
                implementation,
            } => write!(
                f,
                "'{implementation}' is not a declared implementer of '{interface}'"
            ),
        }
    }
}

impl std::error::Error for RegisterError {}

/// Resolution failures. Nested failures are wrapped in
/// [`ResolveError::Dependency`] so the chain ends at the root cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Nothing registered for the requested type (or name/key).
    Unregistered { ty: &'static str },
    /// Registered, but the catalog holds no constructor for it.
    NoConstructor { ty: &'static str },
    ConstructorSelection {
        ty: &'static str,
        constructors: usize,
        marked: usize,
    },
    /// No implementer of the interface could be resolved. `causes` holds the
    /// failure of each implementer tried, in discovery order.
    NoImplementation {
        interface: &'static str,
        causes: Vec<ResolveError>,
    },
    /// The type is already on the current resolution stack.
    Circular { cycle: Vec<&'static str> },
    /// Resolving `dependency` for `ty` failed.
    Dependency {
        ty: &'static str,
        dependency: &'static str,
        source: Box<ResolveError>,
    },
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    /// A constructor asked for more arguments than it declared.
    ArgumentCount {
        ty: &'static str,
        declared: usize,
        requested: usize,
    },
    NotAnImplementer {
        interface: &'static str,
        implementation: &'static str,
    },
}

impl ResolveError {
    /// Innermost error of a [`ResolveError::Dependency`] chain.
    pub fn root_cause(&self) -> &ResolveError {
        let mut current = self;
        while let ResolveError::Dependency { source, .. } = current {
            current = source.as_ref();
        }
        current
    }

    pub fn is_unregistered(&self) -> bool {
        matches!(self, ResolveError::Unregistered { .. })
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::Unregistered { ty } => write!(f, "type '{ty}' is not registered"),
            ResolveError::NoConstructor { ty } => {
                write!(f, "type '{ty}' has no constructor in the type catalog")
            }
            ResolveError::ConstructorSelection {
                ty,
                constructors,
                marked,
            } => write!(
                f,
                "cannot select a constructor for '{ty}': {constructors} declared, \
                 {marked} marked for injection"
            ),
            ResolveError::NoImplementation { interface, causes } => {
                write!(f, "no implementation of '{interface}' could be resolved")?;
                if !causes.is_empty() {
                    write!(f, " (tried {}", causes.len())?;
                    for cause in causes {
                        write!(f, "; {}", cause.root_cause())?;
                    }
                    write!(f, ")")?;
                }
                Ok(())
            }
            ResolveError::Circular { cycle } => {
                write!(f, "circular dependency at resolve time: {}", cycle.join(" -> "))
            }
            ResolveError::Dependency {
                ty,
                dependency,
                source,
            } => write!(f, "failed to resolve '{dependency}' for '{ty}': {source}"),
            ResolveError::TypeMismatch { expected, found } => {
                write!(f, "type mismatch: expected '{expected}', found '{found}'")
            }
            ResolveError::ArgumentCount {
                ty,
                declared,
                requested,
            } => write!(
                f,
                "constructor of '{ty}' requested argument {requested} but declares {declared}"
            ),
            ResolveError::NotAnImplementer {
                interface,
                implementation,
            } => write!(
                f,
                "'{implementation}' is not a declared implementer of '{interface}'"
            ),
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResolveError::Dependency { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
