//! # App Module
//!
//! Startup wiring: catalog + controllers + middlewares in, a ready
//! [`Dispatcher`] out.
//!
//! [`AppBuilder::build`] runs in this order:
//!
//! 1. every controller's component is added to the type catalog
//! 2. `configure` callbacks run their explicit registrations
//! 3. each controller is walked as a registration root, pulling in its
//!    dependencies
//! 4. every action is compiled under its controller prefix and registered in
//!    the router together with the middlewares collected for its full path
//!
//! Route problems (compile errors, duplicate fixed routes, actions without a
//! handler) are gathered across all controllers and returned together as
//! [`StartupError::Routes`]. Registration errors are not fatal: they are
//! logged and kept in [`Application::registration_errors`].

use std::fmt;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::action::{short_type_name, ControllerDescriptor, ControllerRoutes};
use crate::dispatcher::{ActionBinding, Dispatcher};
use crate::ioc::{
    Container, RegisterError, RegistrationBuilder, ServiceDescriptor, TypeCatalog, TypeKey,
};
use crate::middleware::{Middleware, MiddlewareRegistry};
use crate::router::{compile, CompileError, Route, RouteError, Router};
use crate::runtime_config::RuntimeConfig;
use crate::worker_pool::DispatchPool;

/// What is wrong with one action's route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteProblem {
    Compile(CompileError),
    Duplicate(RouteError),
    MissingHandler,
    /// The handler was written for another controller type.
    ControllerMismatch { handler_for: &'static str },
}

impl fmt::Display for RouteProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteProblem::Compile(e) => write!(f, "{e}"),
            RouteProblem::Duplicate(e) => write!(f, "{e}"),
            RouteProblem::MissingHandler => write!(f, "no handler set"),
            RouteProblem::ControllerMismatch { handler_for } => {
                write!(f, "handler is written for controller '{handler_for}'")
            }
        }
    }
}

/// A route problem, located by controller and action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteIssue {
    pub controller: &'static str,
    pub action: String,
    pub template: String,
    pub problem: RouteProblem,
}

impl fmt::Display for RouteIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{} ('{}'): {}",
            self.controller, self.action, self.template, self.problem
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupError {
    Routes(Vec<RouteIssue>),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::Routes(issues) => {
                write!(f, "{} route error(s):", issues.len())?;
                for issue in issues {
                    write!(f, "\n  {issue}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for StartupError {}

type ConfigureFn = Box<dyn FnOnce(&mut RegistrationBuilder)>;

/// Collects everything an application is made of.
pub struct AppBuilder {
    catalog: TypeCatalog,
    controllers: Vec<ControllerDescriptor>,
    middlewares: MiddlewareRegistry,
    configure: Vec<ConfigureFn>,
    runtime: RuntimeConfig,
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            catalog: TypeCatalog::new(),
            controllers: Vec::new(),
            middlewares: MiddlewareRegistry::new(),
            configure: Vec::new(),
            runtime: RuntimeConfig::default(),
        }
    }

    /// Declare a service in the type catalog.
    pub fn service(mut self, service: impl Into<ServiceDescriptor>) -> Self {
        self.catalog.add(service);
        self
    }

    /// Declare an interface (`dyn Trait`) in the type catalog.
    pub fn interface<I: ?Sized + 'static>(mut self) -> Self {
        self.catalog.add_interface::<I>();
        self
    }

    pub fn controller(mut self, controller: ControllerDescriptor) -> Self {
        self.controllers.push(controller);
        self
    }

    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.use_global(middleware);
        self
    }

    pub fn middleware_with_priority(
        mut self,
        middleware: Arc<dyn Middleware>,
        priority: i32,
    ) -> Self {
        self.middlewares.use_global_with_priority(middleware, priority);
        self
    }

    pub fn middleware_at(mut self, path: &str, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.use_path(path, middleware);
        self
    }

    pub fn middleware_for_controller(
        mut self,
        prefix: &str,
        middleware: Arc<dyn Middleware>,
    ) -> Self {
        self.middlewares.use_controller(prefix, middleware);
        self
    }

    /// Run explicit registrations (`register_type`, `register_instance`, ...)
    /// before controllers are walked.
    pub fn configure<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(&mut RegistrationBuilder) + 'static,
    {
        self.configure.push(Box::new(configure));
        self
    }

    pub fn runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn build(self) -> Result<Application, StartupError> {
        let AppBuilder {
            mut catalog,
            controllers,
            middlewares,
            configure,
            runtime,
        } = self;

        let mut routes: Vec<ControllerRoutes> = Vec::with_capacity(controllers.len());
        for controller in controllers {
            let (service, controller_routes) = controller.into_parts();
            catalog.add(service);
            routes.push(controller_routes);
        }

        let mut builder = RegistrationBuilder::new(Arc::new(catalog));
        for configure in configure {
            configure(&mut builder);
        }
        for controller in &routes {
            builder.register_root(controller.key);
        }
        let (container, registration_errors) = builder.finish();
        if !registration_errors.is_empty() {
            warn!(
                errors = registration_errors.len(),
                "Registration finished with errors"
            );
        }

        let (router, issues) = build_router(routes, &middlewares);
        if !issues.is_empty() {
            for issue in &issues {
                error!(issue = %issue, "Route rejected");
            }
            return Err(StartupError::Routes(issues));
        }

        info!(
            routes = router.len(),
            generic_routes = router.generic_len(),
            beans = container.len(),
            middlewares = middlewares.len(),
            "Application built"
        );

        Ok(Application {
            dispatcher: Dispatcher::new(Arc::new(router), Arc::new(container)),
            registration_errors,
            runtime,
        })
    }
}

fn build_router(
    routes: Vec<ControllerRoutes>,
    middlewares: &MiddlewareRegistry,
) -> (Router<ActionBinding>, Vec<RouteIssue>) {
    let mut router = Router::new();
    let mut issues = Vec::new();

    for controller in routes {
        let controller_name = short_type_name(controller.key.name());
        for action in controller.actions {
            let action_name = action.name().to_string();
            let template = action.template().to_string();
            let issue = |problem: RouteProblem| RouteIssue {
                controller: controller_name,
                action: action_name.clone(),
                template: template.clone(),
                problem,
            };

            match action.controller() {
                None => {
                    issues.push(issue(RouteProblem::MissingHandler));
                    continue;
                }
                Some(handler_for) if handler_for != controller.key => {
                    issues.push(issue(RouteProblem::ControllerMismatch {
                        handler_for: short_type_name(handler_for.name()),
                    }));
                    continue;
                }
                Some(_) => {}
            }

            let compiled = match compile(&controller.prefix, action.template()) {
                Ok(compiled) => compiled,
                Err(e) => {
                    issues.push(issue(RouteProblem::Compile(e)));
                    continue;
                }
            };

            let chain = middlewares.collect(compiled.full_path());
            let verb = action.verb();
            let binding = ActionBinding::new(controller.key, Arc::new(action), chain);
            if let Err(e) = router.register(Route::new(compiled, verb, binding)) {
                issues.push(issue(RouteProblem::Duplicate(e)));
            }
        }
    }
    (router, issues)
}

/// A built application.
pub struct Application {
    dispatcher: Dispatcher,
    registration_errors: Vec<RegisterError>,
    runtime: RuntimeConfig,
}

impl Application {
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn router(&self) -> &Arc<Router<ActionBinding>> {
        self.dispatcher.router()
    }

    pub fn container(&self) -> &Arc<Container> {
        self.dispatcher.container()
    }

    pub fn registration_errors(&self) -> &[RegisterError] {
        &self.registration_errors
    }

    pub fn runtime(&self) -> &RuntimeConfig {
        &self.runtime
    }

    /// Whether `key` resolves, for startup health checks.
    pub fn can_resolve(&self, key: TypeKey) -> bool {
        self.container().resolve_instance(key).is_ok()
    }

    /// Start a dispatch pool with the configured worker settings.
    ///
    /// # Safety
    ///
    /// See [`DispatchPool::new`].
    pub unsafe fn start_pool(&self) -> DispatchPool {
        DispatchPool::new(self.dispatcher.clone(), self.runtime.pool.clone())
    }
}
