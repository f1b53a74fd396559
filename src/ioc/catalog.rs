//! Explicit type universe.
//!
//! Every constructible type is declared once as a [`Component`]: its
//! constructors, its field injections, its lifecycle and the interfaces it
//! implements. The catalog is the only place the registration walk and the
//! container look for constructors or implementers, so the set of types a
//! container can build is fixed at startup.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, warn};

use super::error::ResolveError;

/// Type-erased shared instance. Always wraps an `Arc<T>` (where `T` may be a
/// `dyn Trait`), so [`downcast`] yields the `Arc<T>` back.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Runtime identity of a type, sized or `dyn Trait`.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn id(&self) -> TypeId {
        self.id
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// How long a resolved instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    /// One instance per container, created on first resolution.
    Singleton,
    /// A fresh instance on every resolution.
    #[default]
    PerRequest,
}

pub fn wrap<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Instance {
    Arc::new(value)
}

pub fn downcast<T: ?Sized + 'static>(instance: &Instance) -> Option<Arc<T>> {
    instance.downcast_ref::<Arc<T>>().cloned()
}

/// Resolved constructor arguments, consumed in declaration order.
pub struct Args<'a> {
    owner: TypeKey,
    params: &'a [TypeKey],
    values: Vec<Instance>,
    cursor: usize,
}

impl<'a> Args<'a> {
    pub(crate) fn new(owner: TypeKey, params: &'a [TypeKey], values: Vec<Instance>) -> Self {
        Self {
            owner,
            params,
            values,
            cursor: 0,
        }
    }

    /// Take the next argument as an `Arc<A>`.
    pub fn take<A: ?Sized + 'static>(&mut self) -> Result<Arc<A>, ResolveError> {
        let index = self.cursor;
        let value = self.values.get(index).ok_or(ResolveError::ArgumentCount {
            ty: self.owner.name(),
            declared: self.params.len(),
            requested: index + 1,
        })?;
        self.cursor += 1;
        downcast::<A>(value).ok_or_else(|| ResolveError::TypeMismatch {
            expected: std::any::type_name::<A>(),
            found: self.params.get(index).map_or("<undeclared>", |k| k.name()),
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

type BuildFn<T> = Box<dyn Fn(&mut Args<'_>) -> Result<T, ResolveError> + Send + Sync>;
type ErasedBuildFn =
    Box<dyn Fn(&mut Args<'_>) -> Result<Box<dyn Any + Send + Sync>, ResolveError> + Send + Sync>;
type AssignFn = Box<
    dyn Fn(&mut (dyn Any + Send + Sync), &Instance) -> Result<(), ResolveError> + Send + Sync,
>;
type SealFn = Box<dyn Fn(Box<dyn Any + Send + Sync>) -> Option<Instance> + Send + Sync>;
type CastFn = Arc<dyn Fn(&Instance) -> Option<Instance> + Send + Sync>;

/// A typed constructor with its dependency list.
pub struct Constructor<T> {
    params: Vec<TypeKey>,
    inject: bool,
    build: BuildFn<T>,
}

impl<T: Send + Sync + 'static> Constructor<T> {
    /// Constructor without dependencies.
    pub fn new<F>(build: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::from_args(Vec::new(), move |_| Ok(build()))
    }

    /// Constructor over an explicit parameter list; `build` pulls each argument
    /// with [`Args::take`] in the same order.
    pub fn from_args<F>(params: Vec<TypeKey>, build: F) -> Self
    where
        F: Fn(&mut Args<'_>) -> Result<T, ResolveError> + Send + Sync + 'static,
    {
        Self {
            params,
            inject: false,
            build: Box::new(build),
        }
    }

    pub fn with1<A, F>(build: F) -> Self
    where
        A: ?Sized + 'static,
        F: Fn(Arc<A>) -> T + Send + Sync + 'static,
    {
        Self::from_args(vec![TypeKey::of::<A>()], move |args| {
            Ok(build(args.take::<A>()?))
        })
    }

    pub fn with2<A, B, F>(build: F) -> Self
    where
        A: ?Sized + 'static,
        B: ?Sized + 'static,
        F: Fn(Arc<A>, Arc<B>) -> T + Send + Sync + 'static,
    {
        Self::from_args(vec![TypeKey::of::<A>(), TypeKey::of::<B>()], move |args| {
            let a = args.take::<A>()?;
            let b = args.take::<B>()?;
            Ok(build(a, b))
        })
    }

    pub fn with3<A, B, C, F>(build: F) -> Self
    where
        A: ?Sized + 'static,
        B: ?Sized + 'static,
        C: ?Sized + 'static,
        F: Fn(Arc<A>, Arc<B>, Arc<C>) -> T + Send + Sync + 'static,
    {
        Self::from_args(
            vec![TypeKey::of::<A>(), TypeKey::of::<B>(), TypeKey::of::<C>()],
            move |args| {
                let a = args.take::<A>()?;
                let b = args.take::<B>()?;
                let c = args.take::<C>()?;
                Ok(build(a, b, c))
            },
        )
    }

    /// Mark this constructor as the one to use when a type declares several.
    pub fn inject(mut self) -> Self {
        self.inject = true;
        self
    }

    fn erase(self) -> ErasedConstructor {
        let build = self.build;
        ErasedConstructor {
            params: self.params,
            inject: self.inject,
            build: Box::new(move |args: &mut Args<'_>| {
                build(args).map(|value| Box::new(value) as Box<dyn Any + Send + Sync>)
            }),
        }
    }
}

pub(crate) struct ErasedConstructor {
    pub(crate) params: Vec<TypeKey>,
    pub(crate) inject: bool,
    pub(crate) build: ErasedBuildFn,
}

pub(crate) struct FieldInjection {
    pub(crate) name: &'static str,
    pub(crate) ty: TypeKey,
    pub(crate) assign: AssignFn,
}

#[derive(Clone)]
pub(crate) struct Implementer {
    pub(crate) ty: TypeKey,
    pub(crate) cast: CastFn,
}

/// Erased form of a [`Component`], as stored in the catalog.
pub struct ConcreteDescriptor {
    key: TypeKey,
    lifecycle: Lifecycle,
    pub(crate) constructors: Vec<ErasedConstructor>,
    pub(crate) fields: Vec<FieldInjection>,
    pub(crate) seal: SealFn,
}

impl ConcreteDescriptor {
    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// The designated constructor: the only one, or the single one marked with
    /// [`Constructor::inject`] when several exist.
    pub(crate) fn designated_constructor(&self) -> Result<&ErasedConstructor, (usize, usize)> {
        match self.constructors.as_slice() {
            [only] => Ok(only),
            all => {
                let mut marked = all.iter().filter(|c| c.inject);
                match (marked.next(), marked.next()) {
                    (Some(ctor), None) => Ok(ctor),
                    _ => Err((all.len(), all.iter().filter(|c| c.inject).count())),
                }
            }
        }
    }

    /// Every type this descriptor's designated constructor and fields depend on.
    pub fn dependencies(&self) -> Vec<TypeKey> {
        let mut deps: Vec<TypeKey> = self
            .designated_constructor()
            .map(|c| c.params.clone())
            .unwrap_or_default();
        deps.extend(self.fields.iter().map(|f| f.ty));
        deps
    }
}

/// Declaration of a concrete, constructible type.
///
/// ```rust
/// use std::sync::Arc;
/// use razor::ioc::{Component, Constructor};
///
/// trait Clock: Send + Sync {}
/// struct SystemClock;
/// impl Clock for SystemClock {}
///
/// struct Billing { clock: Arc<dyn Clock> }
///
/// let clock = Component::<SystemClock>::new()
///     .singleton()
///     .constructor(Constructor::new(|| SystemClock))
///     .implements::<dyn Clock, _>(|c| c as Arc<dyn Clock>);
/// let billing = Component::<Billing>::new()
///     .constructor(Constructor::with1(|clock: Arc<dyn Clock>| Billing { clock }));
/// # let _ = (clock, billing);
/// ```
pub struct Component<T> {
    lifecycle: Lifecycle,
    constructors: Vec<ErasedConstructor>,
    fields: Vec<FieldInjection>,
    implements: Vec<(TypeKey, Implementer)>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Default for Component<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> Component<T> {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::PerRequest,
            constructors: Vec::new(),
            fields: Vec::new(),
            implements: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Shorthand for a component built with `T::default()`.
    pub fn with_default() -> Self
    where
        T: Default,
    {
        Self::new().constructor(Constructor::new(T::default))
    }

    pub fn singleton(self) -> Self {
        self.lifecycle(Lifecycle::Singleton)
    }

    pub fn lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn constructor(mut self, constructor: Constructor<T>) -> Self {
        self.constructors.push(constructor.erase());
        self
    }

    /// Field dependency assigned after construction.
    pub fn field<D, F>(mut self, name: &'static str, assign: F) -> Self
    where
        D: ?Sized + 'static,
        F: Fn(&mut T, Arc<D>) + Send + Sync + 'static,
    {
        let owner = TypeKey::of::<T>();
        self.fields.push(FieldInjection {
            name,
            ty: TypeKey::of::<D>(),
            assign: Box::new(move |target: &mut (dyn Any + Send + Sync), dep: &Instance| {
                let target = target
                    .downcast_mut::<T>()
                    .ok_or(ResolveError::TypeMismatch {
                        expected: owner.name(),
                        found: "<erased field target>",
                    })?;
                let dep = downcast::<D>(dep).ok_or(ResolveError::TypeMismatch {
                    expected: std::any::type_name::<D>(),
                    found: "<erased field value>",
                })?;
                assign(target, dep);
                Ok(())
            }),
        });
        self
    }

    /// Declare that `T` implements interface `I`. `cast` performs the unsizing,
    /// typically `|c| c as Arc<dyn I>`.
    pub fn implements<I, F>(mut self, cast: F) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<T>) -> Arc<I> + Send + Sync + 'static,
    {
        let implementer = Implementer {
            ty: TypeKey::of::<T>(),
            cast: Arc::new(move |instance: &Instance| {
                downcast::<T>(instance).map(|c| wrap(cast(c)))
            }),
        };
        self.implements.push((TypeKey::of::<I>(), implementer));
        self
    }

    pub fn key(&self) -> TypeKey {
        TypeKey::of::<T>()
    }
}

/// Erased [`Component`], ready to be added to a [`TypeCatalog`].
pub struct ServiceDescriptor {
    descriptor: ConcreteDescriptor,
    implements: Vec<(TypeKey, Implementer)>,
}

impl ServiceDescriptor {
    pub fn key(&self) -> TypeKey {
        self.descriptor.key
    }
}

impl<T: Send + Sync + 'static> From<Component<T>> for ServiceDescriptor {
    fn from(component: Component<T>) -> Self {
        ServiceDescriptor {
            descriptor: ConcreteDescriptor {
                key: TypeKey::of::<T>(),
                lifecycle: component.lifecycle,
                constructors: component.constructors,
                fields: component.fields,
                seal: Box::new(|object: Box<dyn Any + Send + Sync>| {
                    object
                        .downcast::<T>()
                        .ok()
                        .map(|value| wrap(Arc::new(*value)))
                }),
            },
            implements: component.implements,
        }
    }
}

/// Interface entry: implementers in discovery (declaration) order.
pub struct InterfaceDescriptor {
    key: TypeKey,
    implementers: Vec<Implementer>,
}

impl InterfaceDescriptor {
    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn implementer_types(&self) -> Vec<TypeKey> {
        self.implementers.iter().map(|i| i.ty).collect()
    }
}

enum CatalogEntry {
    Concrete(ConcreteDescriptor),
    Interface(InterfaceDescriptor),
}

/// The set of types the container may construct.
#[derive(Default)]
pub struct TypeCatalog {
    entries: HashMap<TypeKey, CatalogEntry>,
    order: Vec<TypeKey>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a concrete type. Re-adding a type replaces its descriptor.
    pub fn add(&mut self, service: impl Into<ServiceDescriptor>) -> &mut Self {
        let ServiceDescriptor {
            descriptor,
            implements,
        } = service.into();
        let key = descriptor.key;

        match self.entries.get(&key) {
            Some(CatalogEntry::Interface(_)) => {
                warn!(ty = %key, "Type already declared as an interface, descriptor ignored");
                return self;
            }
            Some(CatalogEntry::Concrete(_)) => {
                warn!(ty = %key, "Type declared twice, later descriptor replaces earlier");
            }
            None => self.order.push(key),
        }
        debug!(
            ty = %key,
            lifecycle = ?descriptor.lifecycle,
            constructors = descriptor.constructors.len(),
            fields = descriptor.fields.len(),
            "Type added to catalog"
        );
        self.entries.insert(key, CatalogEntry::Concrete(descriptor));

        for (interface, implementer) in implements {
            self.add_implementer(interface, implementer);
        }
        self
    }

    /// Declare an interface with no implementers yet.
    pub fn add_interface<I: ?Sized + 'static>(&mut self) -> &mut Self {
        self.ensure_interface(TypeKey::of::<I>());
        self
    }

    fn ensure_interface(&mut self, key: TypeKey) -> Option<&mut InterfaceDescriptor> {
        if !self.entries.contains_key(&key) {
            self.order.push(key);
            self.entries.insert(
                key,
                CatalogEntry::Interface(InterfaceDescriptor {
                    key,
                    implementers: Vec::new(),
                }),
            );
        }
        match self.entries.get_mut(&key) {
            Some(CatalogEntry::Interface(desc)) => Some(desc),
            _ => None,
        }
    }

    fn add_implementer(&mut self, interface: TypeKey, implementer: Implementer) {
        let Some(desc) = self.ensure_interface(interface) else {
            warn!(
                interface = %interface,
                implementer = %implementer.ty,
                "Interface key is a concrete type, implementer ignored"
            );
            return;
        };
        if desc.implementers.iter().any(|i| i.ty == implementer.ty) {
            return;
        }
        debug!(interface = %interface, implementer = %implementer.ty, "Implementer discovered");
        desc.implementers.push(implementer);
    }

    pub fn contains(&self, key: TypeKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn is_interface(&self, key: TypeKey) -> bool {
        matches!(self.entries.get(&key), Some(CatalogEntry::Interface(_)))
    }

    pub fn concrete(&self, key: TypeKey) -> Option<&ConcreteDescriptor> {
        match self.entries.get(&key) {
            Some(CatalogEntry::Concrete(desc)) => Some(desc),
            _ => None,
        }
    }

    pub fn interface(&self, key: TypeKey) -> Option<&InterfaceDescriptor> {
        match self.entries.get(&key) {
            Some(CatalogEntry::Interface(desc)) => Some(desc),
            _ => None,
        }
    }

    /// Implementers of `interface` in discovery order. Empty for unknown keys.
    pub fn implementers(&self, interface: TypeKey) -> Vec<TypeKey> {
        self.interface(interface)
            .map(InterfaceDescriptor::implementer_types)
            .unwrap_or_default()
    }

    pub(crate) fn implementer_entries(&self, interface: TypeKey) -> &[Implementer] {
        match self.interface(interface) {
            Some(desc) => &desc.implementers,
            None => &[],
        }
    }

    /// Re-wrap a concrete instance as its interface form.
    pub fn cast(
        &self,
        interface: TypeKey,
        implementation: TypeKey,
        instance: &Instance,
    ) -> Option<Instance> {
        self.implementer_entries(interface)
            .iter()
            .find(|i| i.ty == implementation)
            .and_then(|i| (i.cast)(instance))
    }

    pub fn is_implementer(&self, interface: TypeKey, implementation: TypeKey) -> bool {
        self.implementer_entries(interface)
            .iter()
            .any(|i| i.ty == implementation)
    }

    /// Declared keys in declaration order.
    pub fn types(&self) -> &[TypeKey] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
