#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use razor::ioc::{
    Component, Constructor, Lifecycle, RegistrationBuilder, ResolveError, TypeCatalog, TypeKey,
};

trait Clock: Send + Sync {
    fn source(&self) -> &'static str;
}

struct SystemClock;

impl Clock for SystemClock {
    fn source(&self) -> &'static str {
        "system"
    }
}

struct FrozenClock;

impl Clock for FrozenClock {
    fn source(&self) -> &'static str {
        "frozen"
    }
}

trait Mailer: Send + Sync {}

struct ReportController {
    _mailer: Arc<dyn Mailer>,
}

#[test]
fn test_singleton_constructed_once_under_concurrency() {
    static BUILT: AtomicUsize = AtomicUsize::new(0);

    struct Expensive;

    let mut catalog = TypeCatalog::new();
    catalog.add(
        Component::<Expensive>::new()
            .singleton()
            .constructor(Constructor::new(|| {
                BUILT.fetch_add(1, Ordering::SeqCst);
                thread::sleep(std::time::Duration::from_millis(5));
                Expensive
            })),
    );
    let mut builder = RegistrationBuilder::new(Arc::new(catalog));
    builder.register_root_type::<Expensive>();
    let container = Arc::new(builder.build());

    const THREADS: usize = 16;
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let container = Arc::clone(&container);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                container.resolve::<Expensive>().unwrap()
            })
        })
        .collect();
    let instances: Vec<Arc<Expensive>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(BUILT.load(Ordering::SeqCst), 1);
    assert_eq!(instances.len(), THREADS);
    assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
}

#[test]
fn test_repeated_registration_is_idempotent() {
    struct Leaf;
    struct Branch {
        _leaf: Arc<Leaf>,
    }

    let mut catalog = TypeCatalog::new();
    catalog
        .add(Component::<Leaf>::new().constructor(Constructor::new(|| Leaf)))
        .add(
            Component::<Branch>::new()
                .constructor(Constructor::with1(|leaf: Arc<Leaf>| Branch { _leaf: leaf })),
        );
    let mut builder = RegistrationBuilder::new(Arc::new(catalog));
    for _ in 0..3 {
        builder.register_root_type::<Branch>();
        builder.register_root_type::<Leaf>();
    }
    assert_eq!(builder.entries().len(), 2);
    assert!(builder.entries().iter().all(|e| e.lifecycle == Lifecycle::PerRequest));

    let (container, errors) = builder.finish();
    assert!(errors.is_empty());
    assert_eq!(container.len(), 2);
    assert!(container.resolve::<Branch>().is_some());
}

#[test]
fn test_first_discovered_implementer_wins() {
    struct Scheduler {
        clock: Arc<dyn Clock>,
    }

    let mut catalog = TypeCatalog::new();
    catalog
        .add(
            Component::<Scheduler>::new()
                .constructor(Constructor::with1(|clock: Arc<dyn Clock>| Scheduler { clock })),
        )
        .add(
            Component::<FrozenClock>::new()
                .singleton()
                .constructor(Constructor::new(|| FrozenClock))
                .implements::<dyn Clock, _>(|c| c as Arc<dyn Clock>),
        )
        .add(
            Component::<SystemClock>::new()
                .singleton()
                .constructor(Constructor::new(|| SystemClock))
                .implements::<dyn Clock, _>(|c| c as Arc<dyn Clock>),
        );
    let catalog = Arc::new(catalog);
    assert_eq!(
        catalog.implementers(TypeKey::of::<dyn Clock>()),
        vec![TypeKey::of::<FrozenClock>(), TypeKey::of::<SystemClock>()]
    );

    for _ in 0..5 {
        let mut builder = RegistrationBuilder::new(Arc::clone(&catalog));
        builder.register_root_type::<Scheduler>();
        let container = builder.build();
        let scheduler = container.resolve::<Scheduler>().unwrap();
        assert_eq!(scheduler.clock.source(), "frozen");
        assert_eq!(container.resolve::<dyn Clock>().unwrap().source(), "frozen");
    }
}

#[test]
fn test_interface_without_implementers_fails_resolution() {
    let mut catalog = TypeCatalog::new();
    catalog.add_interface::<dyn Mailer>().add(
        Component::<ReportController>::new().constructor(Constructor::with1(
            |mailer: Arc<dyn Mailer>| ReportController { _mailer: mailer },
        )),
    );
    let mut builder = RegistrationBuilder::new(Arc::new(catalog));
    builder.register_root_type::<ReportController>();
    let (container, _) = builder.finish();

    // the typed entry point returns "nothing" at the top level
    assert!(container.resolve::<ReportController>().is_none());

    let err = container.try_resolve::<ReportController>().err().unwrap();
    assert!(matches!(
        err,
        ResolveError::Dependency { ty, .. } if ty.ends_with("ReportController")
    ));
    assert!(matches!(
        err.root_cause(),
        ResolveError::NoImplementation { causes, .. } if causes.is_empty()
    ));
    assert!(!container.contains::<dyn Mailer>());
}

#[test]
fn test_container_shared_between_threads_builds_per_request_instances() {
    static BUILT: AtomicUsize = AtomicUsize::new(0);

    struct Handler;

    let mut catalog = TypeCatalog::new();
    catalog.add(Component::<Handler>::new().constructor(Constructor::new(|| {
        BUILT.fetch_add(1, Ordering::SeqCst);
        Handler
    })));
    let mut builder = RegistrationBuilder::new(Arc::new(catalog));
    builder.register_root_type::<Handler>();
    let container = Arc::new(builder.build());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let container = Arc::clone(&container);
            thread::spawn(move || {
                for _ in 0..10 {
                    assert!(container.resolve::<Handler>().is_some());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(BUILT.load(Ordering::SeqCst), 40);
}
