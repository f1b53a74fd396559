//! Registration walk.
//!
//! Starting from root types (controllers, explicitly added services), the
//! builder follows constructor parameters, field injections and interface
//! implementers through the [`TypeCatalog`] and records one entry per
//! reachable concrete type. Visit state is tri-state: absent (unvisited),
//! [`VisitState::Visiting`] while the type's dependencies are being walked,
//! [`VisitState::Registered`] once done. Hitting a `Visiting` type is a cycle.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::catalog::{wrap, Instance, Lifecycle, TypeCatalog, TypeKey};
use super::container::Container;
use super::error::RegisterError;

/// Key for keyed registrations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceKey(String);

impl ServiceKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ServiceKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ServiceKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One registration, consumed by [`RegistrationBuilder::build`].
#[derive(Clone)]
pub struct RegistrationEntry {
    pub declared: TypeKey,
    pub implementation: TypeKey,
    pub lifecycle: Lifecycle,
    pub name: Option<String>,
    pub key: Option<ServiceKey>,
    pub instance: Option<Instance>,
    /// Made through `register_type`/`register_instance` rather than the walk.
    pub explicit: bool,
    rejected: bool,
}

impl RegistrationEntry {
    fn new(key: TypeKey, lifecycle: Lifecycle, explicit: bool) -> Self {
        Self {
            declared: key,
            implementation: key,
            lifecycle,
            name: None,
            key: None,
            instance: None,
            explicit,
            rejected: false,
        }
    }

    fn is_default(&self) -> bool {
        self.name.is_none() && self.key.is_none()
    }
}

impl fmt::Debug for RegistrationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationEntry")
            .field("declared", &self.declared)
            .field("implementation", &self.implementation)
            .field("lifecycle", &self.lifecycle)
            .field("name", &self.name)
            .field("key", &self.key)
            .field("has_instance", &self.instance.is_some())
            .field("explicit", &self.explicit)
            .finish()
    }
}

/// Fluent modifiers for an explicit registration.
pub struct RegistrationHandle<'a> {
    entry: &'a mut RegistrationEntry,
    catalog: &'a TypeCatalog,
    errors: &'a mut Vec<RegisterError>,
}

impl RegistrationHandle<'_> {
    /// Expose the registration under interface `I` instead of its own type.
    pub fn as_type<I: ?Sized + 'static>(self) -> Self {
        let interface = TypeKey::of::<I>();
        if interface == self.entry.implementation {
            return self;
        }
        if self.catalog.is_implementer(interface, self.entry.implementation) {
            self.entry.declared = interface;
        } else {
            let err = RegisterError::NotAnImplementer {
                interface: interface.name(),
                implementation: self.entry.implementation.name(),
            };
            error!(error = %err, "Registration rejected");
            self.entry.rejected = true;
            self.errors.push(err);
        }
        self
    }

    pub fn named(self, name: impl Into<String>) -> Self {
        if let Some(key) = &self.entry.key {
            warn!(
                ty = %self.entry.implementation,
                key = %key,
                "Registration already keyed, name ignored"
            );
        } else {
            self.entry.name = Some(name.into());
        }
        self
    }

    pub fn keyed(self, key: impl Into<ServiceKey>) -> Self {
        if let Some(name) = &self.entry.name {
            warn!(
                ty = %self.entry.implementation,
                name = %name,
                "Registration already named, key ignored"
            );
        } else {
            self.entry.key = Some(key.into());
        }
        self
    }

    pub fn single_instance(self) -> Self {
        self.entry.lifecycle = Lifecycle::Singleton;
        self
    }

    pub fn instance_per_dependency(self) -> Self {
        if self.entry.instance.is_some() {
            warn!(
                ty = %self.entry.implementation,
                "Pre-built instance is always a singleton, lifecycle unchanged"
            );
        } else {
            self.entry.lifecycle = Lifecycle::PerRequest;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Visiting,
    Registered,
}

/// Collects registrations and produces a [`Container`].
pub struct RegistrationBuilder {
    catalog: Arc<TypeCatalog>,
    entries: Vec<RegistrationEntry>,
    states: HashMap<TypeKey, VisitState>,
    walk: Vec<TypeKey>,
    poisoned: HashSet<TypeKey>,
    errors: Vec<RegisterError>,
}

impl RegistrationBuilder {
    pub fn new(catalog: Arc<TypeCatalog>) -> Self {
        Self {
            catalog,
            entries: Vec::new(),
            states: HashMap::new(),
            walk: Vec::new(),
            poisoned: HashSet::new(),
            errors: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &Arc<TypeCatalog> {
        &self.catalog
    }

    /// Seed a root type and walk everything it needs.
    pub fn register_root(&mut self, key: TypeKey) {
        self.recursive_register(key);
    }

    pub fn register_root_type<T: ?Sized + 'static>(&mut self) {
        self.recursive_register(TypeKey::of::<T>());
    }

    /// Explicit registration of a concrete type.
    ///
    /// # Errors
    ///
    /// [`RegisterError::InterfaceRegistration`] for interface keys and
    /// [`RegisterError::UnknownType`] for keys missing from the catalog. Both are
    /// also kept in [`errors`](Self::errors).
    pub fn register_type<T: ?Sized + 'static>(
        &mut self,
    ) -> Result<RegistrationHandle<'_>, RegisterError> {
        self.register_key(TypeKey::of::<T>())
    }

    pub fn register_key(&mut self, key: TypeKey) -> Result<RegistrationHandle<'_>, RegisterError> {
        if self.catalog.is_interface(key) {
            return Err(self.record(RegisterError::InterfaceRegistration { ty: key.name() }));
        }
        let Some(lifecycle) = self.catalog.concrete(key).map(|d| d.lifecycle()) else {
            return Err(self.record(RegisterError::UnknownType { ty: key.name() }));
        };
        debug!(ty = %key, lifecycle = ?lifecycle, "Explicit registration");
        Ok(self.push_handle(RegistrationEntry::new(key, lifecycle, true)))
    }

    /// Register a pre-built instance. It is always a singleton.
    pub fn register_instance<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        value: Arc<T>,
    ) -> RegistrationHandle<'_> {
        let key = TypeKey::of::<T>();
        let mut entry = RegistrationEntry::new(key, Lifecycle::Singleton, true);
        entry.instance = Some(wrap(value));
        debug!(ty = %key, "Instance registration");
        self.push_handle(entry)
    }

    fn push_handle(&mut self, entry: RegistrationEntry) -> RegistrationHandle<'_> {
        let index = self.entries.len();
        self.entries.push(entry);
        RegistrationHandle {
            entry: &mut self.entries[index],
            catalog: &self.catalog,
            errors: &mut self.errors,
        }
    }

    fn record(&mut self, err: RegisterError) -> RegisterError {
        error!(error = %err, "Type registration failed");
        self.errors.push(err.clone());
        err
    }

    /// Dependencies of the explicit default registration for `key`, if any.
    /// A pre-built instance has none.
    fn explicit_default_dependencies(&self, key: TypeKey) -> Option<Vec<TypeKey>> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.explicit && !e.rejected && e.declared == key && e.is_default())?;
        if entry.instance.is_some() {
            return Some(Vec::new());
        }
        Some(
            self.catalog
                .concrete(entry.implementation)
                .map_or_else(Vec::new, |desc| desc.dependencies()),
        )
    }

    /// Walk `key` and everything reachable from it. Idempotent per type.
    pub fn recursive_register(&mut self, key: TypeKey) {
        match self.states.get(&key) {
            Some(VisitState::Registered) => return,
            Some(VisitState::Visiting) => {
                self.report_cycle(key);
                return;
            }
            None => {}
        }

        if let Some(deps) = self.explicit_default_dependencies(key) {
            // explicit defaults still get a walk frame for cycle detection
            self.states.insert(key, VisitState::Visiting);
            self.walk.push(key);
            for dep in deps {
                self.recursive_register(dep);
            }
            self.walk.pop();
            self.states.insert(key, VisitState::Registered);
            return;
        }

        let catalog = Arc::clone(&self.catalog);
        if !catalog.contains(key) {
            self.states.insert(key, VisitState::Registered);
            self.record(RegisterError::UnknownType { ty: key.name() });
            return;
        }

        self.states.insert(key, VisitState::Visiting);
        self.walk.push(key);

        if let Some(desc) = catalog.concrete(key) {
            match desc.designated_constructor() {
                Ok(ctor) => {
                    debug!(
                        ty = %key,
                        lifecycle = ?desc.lifecycle(),
                        params = ctor.params.len(),
                        fields = desc.fields.len(),
                        "Type registered"
                    );
                    self.entries
                        .push(RegistrationEntry::new(key, desc.lifecycle(), false));
                    for dep in &ctor.params {
                        self.recursive_register(*dep);
                    }
                    for field in &desc.fields {
                        self.recursive_register(field.ty);
                    }
                }
                Err((constructors, marked)) => {
                    self.record(RegisterError::ConstructorSelection {
                        ty: key.name(),
                        constructors,
                        marked,
                    });
                }
            }
        } else {
            for implementer in catalog.implementers(key) {
                self.recursive_register(implementer);
            }
        }

        self.walk.pop();
        self.states.insert(key, VisitState::Registered);
    }

    fn report_cycle(&mut self, key: TypeKey) {
        let start = self.walk.iter().position(|k| *k == key).unwrap_or(0);
        let members: Vec<TypeKey> = self.walk[start..].to_vec();
        let mut cycle: Vec<&'static str> = members.iter().map(|k| k.name()).collect();
        cycle.push(key.name());
        self.poisoned.extend(members);
        self.record(RegisterError::CircularDependency { cycle });
    }

    pub fn entries(&self) -> &[RegistrationEntry] {
        &self.entries
    }

    /// Registration errors recorded so far.
    pub fn errors(&self) -> &[RegisterError] {
        &self.errors
    }

    /// Build the container, discarding the error list (errors are logged as
    /// they occur).
    pub fn build(self) -> Container {
        self.finish().0
    }

    /// Build the container and hand back every registration error.
    pub fn finish(mut self) -> (Container, Vec<RegisterError>) {
        let explicit: Vec<(TypeKey, TypeKey, bool)> = self
            .entries
            .iter()
            .filter(|e| e.explicit && e.instance.is_none() && !e.rejected)
            .map(|e| (e.declared, e.implementation, e.is_default()))
            .collect();
        let catalog = Arc::clone(&self.catalog);
        for (declared, implementation, is_default) in explicit {
            if is_default {
                self.recursive_register(declared);
            } else if let Some(desc) = catalog.concrete(implementation) {
                for dep in desc.dependencies() {
                    self.recursive_register(dep);
                }
            }
        }

        let poisoned = &self.poisoned;
        let before = self.entries.len();
        let entries: Vec<RegistrationEntry> = self
            .entries
            .into_iter()
            .filter(|e| {
                !e.rejected
                    && (e.instance.is_some()
                        || !(poisoned.contains(&e.implementation)
                            || poisoned.contains(&e.declared)))
            })
            .collect();

        info!(
            entries = entries.len(),
            dropped = before - entries.len(),
            errors = self.errors.len(),
            catalog_types = catalog.len(),
            "Registration complete"
        );
        (Container::new(catalog, entries), self.errors)
    }
}
