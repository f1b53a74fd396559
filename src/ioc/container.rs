//! Dependency container.
//!
//! Holds one bean per registration. Resolution is depth-first through the
//! designated constructor, then field injections. Singletons are created inside
//! a per-bean [`OnceCell`], so concurrent first access constructs once; all
//! other state is read-only after build. Each top-level call carries its own
//! resolution stack for cycle detection.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, error, warn};

use super::builder::{RegistrationEntry, ServiceKey};
use super::catalog::{downcast, Args, Instance, Lifecycle, TypeCatalog, TypeKey};
use super::error::ResolveError;

struct ServiceBean {
    entry: RegistrationEntry,
    cached: OnceCell<Instance>,
}

#[derive(Clone, Copy)]
enum Lookup<'a> {
    Default,
    Named(&'a str),
    Keyed(&'a ServiceKey),
}

pub struct Container {
    catalog: Arc<TypeCatalog>,
    beans: Vec<ServiceBean>,
    by_type: HashMap<TypeKey, usize>,
    named: HashMap<TypeKey, HashMap<String, usize>>,
    keyed: HashMap<TypeKey, HashMap<ServiceKey, usize>>,
}

impl Container {
    pub(crate) fn new(catalog: Arc<TypeCatalog>, entries: Vec<RegistrationEntry>) -> Self {
        let mut container = Container {
            catalog,
            beans: Vec::with_capacity(entries.len()),
            by_type: HashMap::new(),
            named: HashMap::new(),
            keyed: HashMap::new(),
        };
        for entry in entries {
            container.insert(entry);
        }
        container
    }

    fn insert(&mut self, entry: RegistrationEntry) {
        let cached = match &entry.instance {
            None => OnceCell::new(),
            Some(instance) => {
                let declared_form = if entry.declared == entry.implementation {
                    Some(Arc::clone(instance))
                } else {
                    self.catalog
                        .cast(entry.declared, entry.implementation, instance)
                };
                let Some(value) = declared_form else {
                    error!(
                        declared = %entry.declared,
                        implementation = %entry.implementation,
                        "Pre-built instance cannot be exposed as declared type, skipped"
                    );
                    return;
                };
                OnceCell::with_value(value)
            }
        };

        let index = self.beans.len();
        let declared = entry.declared;
        let explicit = entry.explicit;
        let name = entry.name.clone();
        let key = entry.key.clone();
        self.beans.push(ServiceBean { entry, cached });

        if let Some(name) = name {
            let previous = self.named.entry(declared).or_default().insert(name, index);
            if previous.is_some() {
                warn!(ty = %declared, "Named registration replaced");
            }
        } else if let Some(key) = key {
            let previous = self.keyed.entry(declared).or_default().insert(key, index);
            if previous.is_some() {
                warn!(ty = %declared, "Keyed registration replaced");
            }
        } else {
            match self.by_type.get(&declared) {
                // explicit registrations outrank ones found by the walk
                Some(&existing) if self.beans[existing].entry.explicit && !explicit => {}
                Some(_) => {
                    warn!(ty = %declared, "Registration replaced by a later one");
                    self.by_type.insert(declared, index);
                }
                None => {
                    self.by_type.insert(declared, index);
                }
            }
        }
    }

    pub fn catalog(&self) -> &Arc<TypeCatalog> {
        &self.catalog
    }

    /// Resolve the default registration of `T`.
    ///
    /// Returns `None` when `T` is not registered or when construction failed;
    /// failures other than "not registered" are logged at error level.
    pub fn resolve<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        report(TypeKey::of::<T>(), self.try_resolve::<T>())
    }

    pub fn resolve_named<T: ?Sized + 'static>(&self, name: &str) -> Option<Arc<T>> {
        report(TypeKey::of::<T>(), self.try_resolve_named::<T>(name))
    }

    pub fn resolve_keyed<T: ?Sized + 'static>(&self, key: &ServiceKey) -> Option<Arc<T>> {
        report(TypeKey::of::<T>(), self.try_resolve_keyed::<T>(key))
    }

    pub fn try_resolve<T: ?Sized + 'static>(&self) -> Result<Arc<T>, ResolveError> {
        let instance = self.resolve_instance(TypeKey::of::<T>())?;
        typed::<T>(&instance)
    }

    pub fn try_resolve_named<T: ?Sized + 'static>(
        &self,
        name: &str,
    ) -> Result<Arc<T>, ResolveError> {
        let mut stack = Vec::new();
        let instance = self.resolve_lookup(TypeKey::of::<T>(), Lookup::Named(name), &mut stack)?;
        typed::<T>(&instance)
    }

    pub fn try_resolve_keyed<T: ?Sized + 'static>(
        &self,
        key: &ServiceKey,
    ) -> Result<Arc<T>, ResolveError> {
        let mut stack = Vec::new();
        let instance = self.resolve_lookup(TypeKey::of::<T>(), Lookup::Keyed(key), &mut stack)?;
        typed::<T>(&instance)
    }

    /// Type-erased resolution of the default registration for `key`.
    pub fn resolve_instance(&self, key: TypeKey) -> Result<Instance, ResolveError> {
        let mut stack = Vec::new();
        self.resolve_lookup(key, Lookup::Default, &mut stack)
    }

    fn find_bean(&self, key: TypeKey, lookup: Lookup<'_>) -> Option<&ServiceBean> {
        let index = match lookup {
            Lookup::Default => self.by_type.get(&key),
            Lookup::Named(name) => self.named.get(&key).and_then(|m| m.get(name)),
            Lookup::Keyed(service_key) => self.keyed.get(&key).and_then(|m| m.get(service_key)),
        }?;
        self.beans.get(*index)
    }

    fn resolve_lookup(
        &self,
        key: TypeKey,
        lookup: Lookup<'_>,
        stack: &mut Vec<TypeKey>,
    ) -> Result<Instance, ResolveError> {
        if let Some(bean) = self.find_bean(key, lookup) {
            return self.resolve_bean(bean, stack);
        }
        if self.catalog.is_interface(key) {
            return self.resolve_implementers(key, lookup, stack);
        }
        Err(ResolveError::Unregistered { ty: key.name() })
    }

    /// Try each implementer in discovery order; the first that resolves wins.
    fn resolve_implementers(
        &self,
        interface: TypeKey,
        lookup: Lookup<'_>,
        stack: &mut Vec<TypeKey>,
    ) -> Result<Instance, ResolveError> {
        let mut causes = Vec::new();
        for implementer in self.catalog.implementer_entries(interface) {
            match self.resolve_lookup(implementer.ty, lookup, stack) {
                Ok(instance) => match (implementer.cast)(&instance) {
                    Some(cast) => {
                        debug!(
                            interface = %interface,
                            implementer = %implementer.ty,
                            "Interface resolved"
                        );
                        return Ok(cast);
                    }
                    None => causes.push(ResolveError::TypeMismatch {
                        expected: interface.name(),
                        found: implementer.ty.name(),
                    }),
                },
                Err(err) => {
                    debug!(
                        interface = %interface,
                        implementer = %implementer.ty,
                        error = %err,
                        "Implementer skipped"
                    );
                    causes.push(err);
                }
            }
        }
        Err(ResolveError::NoImplementation {
            interface: interface.name(),
            causes,
        })
    }

    fn resolve_bean(
        &self,
        bean: &ServiceBean,
        stack: &mut Vec<TypeKey>,
    ) -> Result<Instance, ResolveError> {
        if let Some(instance) = bean.cached.get() {
            return Ok(Arc::clone(instance));
        }

        let implementation = bean.entry.implementation;
        if let Some(start) = stack.iter().position(|k| *k == implementation) {
            let mut cycle: Vec<&'static str> = stack[start..].iter().map(|k| k.name()).collect();
            cycle.push(implementation.name());
            return Err(ResolveError::Circular { cycle });
        }

        stack.push(implementation);
        let result = match bean.entry.lifecycle {
            Lifecycle::Singleton => bean
                .cached
                .get_or_try_init(|| self.construct(bean, stack))
                .map(Arc::clone),
            Lifecycle::PerRequest => self.construct(bean, stack),
        };
        stack.pop();
        result
    }

    fn construct(
        &self,
        bean: &ServiceBean,
        stack: &mut Vec<TypeKey>,
    ) -> Result<Instance, ResolveError> {
        let entry = &bean.entry;
        let instance = self.construct_concrete(entry.implementation, stack)?;
        if entry.declared == entry.implementation {
            return Ok(instance);
        }
        self.catalog
            .cast(entry.declared, entry.implementation, &instance)
            .ok_or(ResolveError::NotAnImplementer {
                interface: entry.declared.name(),
                implementation: entry.implementation.name(),
            })
    }

    fn construct_concrete(
        &self,
        key: TypeKey,
        stack: &mut Vec<TypeKey>,
    ) -> Result<Instance, ResolveError> {
        let desc = self
            .catalog
            .concrete(key)
            .ok_or(ResolveError::NoConstructor { ty: key.name() })?;
        let ctor = desc
            .designated_constructor()
            .map_err(|(constructors, marked)| ResolveError::ConstructorSelection {
                ty: key.name(),
                constructors,
                marked,
            })?;

        let mut values = Vec::with_capacity(ctor.params.len());
        for dep in &ctor.params {
            let value = self
                .resolve_lookup(*dep, Lookup::Default, stack)
                .map_err(|source| ResolveError::Dependency {
                    ty: key.name(),
                    dependency: dep.name(),
                    source: Box::new(source),
                })?;
            values.push(value);
        }

        let mut args = Args::new(key, &ctor.params, values);
        let mut object = (ctor.build)(&mut args)?;

        for field in &desc.fields {
            let value = self
                .resolve_lookup(field.ty, Lookup::Default, stack)
                .map_err(|source| ResolveError::Dependency {
                    ty: key.name(),
                    dependency: field.ty.name(),
                    source: Box::new(source),
                })?;
            (field.assign)(&mut *object, &value)?;
            debug!(ty = %key, field = field.name, "Field injected");
        }

        debug!(ty = %key, lifecycle = ?desc.lifecycle(), "Instance constructed");
        (desc.seal)(object).ok_or(ResolveError::TypeMismatch {
            expected: key.name(),
            found: "<constructed value>",
        })
    }

    /// True when `T` has a default registration, or is an interface with at
    /// least one registered implementer.
    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.contains_key(TypeKey::of::<T>())
    }

    pub fn contains_key(&self, key: TypeKey) -> bool {
        self.by_type.contains_key(&key)
            || self
                .catalog
                .implementers(key)
                .iter()
                .any(|k| self.by_type.contains_key(k))
    }

    /// Declared types of every bean, in registration order, without repeats.
    pub fn registered_types(&self) -> Vec<TypeKey> {
        let mut out: Vec<TypeKey> = Vec::with_capacity(self.beans.len());
        for bean in &self.beans {
            if !out.contains(&bean.entry.declared) {
                out.push(bean.entry.declared);
            }
        }
        out
    }

    /// Number of beans (registrations), including named and keyed ones.
    pub fn len(&self) -> usize {
        self.beans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beans.is_empty()
    }
}

fn typed<T: ?Sized + 'static>(instance: &Instance) -> Result<Arc<T>, ResolveError> {
    downcast::<T>(instance).ok_or(ResolveError::TypeMismatch {
        expected: std::any::type_name::<T>(),
        found: "<registered instance>",
    })
}

fn report<T: ?Sized>(key: TypeKey, result: Result<Arc<T>, ResolveError>) -> Option<Arc<T>> {
    match result {
        Ok(value) => Some(value),
        Err(err) if err.is_unregistered() => {
            debug!(ty = %key, "Type not registered");
            None
        }
        Err(err) => {
            error!(ty = %key, error = %err, root_cause = %err.root_cause(), "Resolution failed");
            None
        }
    }
}
