use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::request::{BufferedResponse, DispatchRequest, HeaderVec, ResponseSink};
use crate::action::{bind_arguments, ActionContext, ActionDescriptor, ActionError, BindError};
use crate::ioc::{Container, ResolveError, TypeKey};
use crate::middleware::Middleware;
use crate::router::{RouteMatch, Router};

/// Route payload: which controller and action a route invokes, and the
/// middlewares resolved for its path at startup.
#[derive(Clone)]
pub struct ActionBinding {
    controller: TypeKey,
    action: Arc<ActionDescriptor>,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl ActionBinding {
    pub fn new(
        controller: TypeKey,
        action: Arc<ActionDescriptor>,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> Self {
        Self {
            controller,
            action,
            middlewares,
        }
    }

    pub fn controller(&self) -> TypeKey {
        self.controller
    }

    pub fn action(&self) -> &ActionDescriptor {
        &self.action
    }

    pub fn middlewares(&self) -> &[Arc<dyn Middleware>] {
        &self.middlewares
    }
}

impl fmt::Debug for ActionBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionBinding")
            .field("controller", &self.controller)
            .field("action", &self.action.name())
            .field(
                "middlewares",
                &self.middlewares.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Failures after a route matched that are not the client's fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    ControllerUnavailable {
        controller: &'static str,
        cause: ResolveError,
    },
    Action { action: String, source: ActionError },
    Panicked { action: String, message: String },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::ControllerUnavailable { controller, cause } => {
                write!(f, "controller '{controller}' could not be resolved: {cause}")
            }
            DispatchError::Action { action, source } => {
                write!(f, "action '{action}' failed: {source}")
            }
            DispatchError::Panicked { action, message } => {
                write!(f, "dispatch of '{action}' panicked: {message}")
            }
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::ControllerUnavailable { cause, .. } => Some(cause),
            DispatchError::Action { source, .. } => Some(source),
            DispatchError::Panicked { .. } => None,
        }
    }
}

/// How a dispatch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The action ran. `status` is `None` when the action wrote the sink itself.
    Completed { status: Option<u16> },
    /// A middleware wrote the response and stopped the chain.
    Halted { middleware: &'static str },
    NotFound,
    BadRequest(BindError),
    InternalError(DispatchError),
}

impl ActionOutcome {
    /// HTTP status for the transport; `None` when the response was written by
    /// a middleware or the action itself.
    pub fn status(&self) -> Option<u16> {
        match self {
            ActionOutcome::Completed { status } => *status,
            ActionOutcome::Halted { .. } => None,
            ActionOutcome::NotFound => Some(404),
            ActionOutcome::BadRequest(_) => Some(400),
            ActionOutcome::InternalError(_) => Some(500),
        }
    }

    /// Whether the sink already holds the response.
    pub fn is_written(&self) -> bool {
        matches!(
            self,
            ActionOutcome::Completed { .. } | ActionOutcome::Halted { .. }
        )
    }

    /// Write a `{"error": ...}` body for failure outcomes, unless the sink was
    /// already flushed.
    pub fn write_error_response(&self, res: &mut dyn ResponseSink) {
        if self.is_written() || res.flushed() {
            return;
        }
        let (status, message) = match self {
            ActionOutcome::NotFound => (404, "not found".to_string()),
            ActionOutcome::BadRequest(e) => (400, e.to_string()),
            ActionOutcome::InternalError(e) => (500, e.to_string()),
            ActionOutcome::Completed { .. } | ActionOutcome::Halted { .. } => return,
        };
        let mut headers = HeaderVec::new();
        headers.push((Arc::from("content-type"), "application/json".to_string()));
        let body = serde_json::json!({ "error": message }).to_string().into_bytes();
        res.write(status, headers, body);
    }
}

/// Routes a request to its action: middlewares, controller resolution,
/// argument binding, invocation and default result serialisation.
///
/// Cheap to clone; router and container are shared read-only.
#[derive(Clone)]
pub struct Dispatcher {
    router: Arc<Router<ActionBinding>>,
    container: Arc<Container>,
}

impl Dispatcher {
    pub fn new(router: Arc<Router<ActionBinding>>, container: Arc<Container>) -> Self {
        Self { router, container }
    }

    pub fn router(&self) -> &Arc<Router<ActionBinding>> {
        &self.router
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// Dispatch `req`, writing into `res`.
    ///
    /// Middlewares, controller constructors and the action all run under one
    /// `catch_unwind`; a panic in any of them becomes
    /// [`DispatchError::Panicked`] and never escapes to the caller.
    #[must_use]
    pub fn dispatch(&self, req: &DispatchRequest, res: &mut dyn ResponseSink) -> ActionOutcome {
        let Some(matched) = self.router.resolve(&req.path, &req.method) else {
            info!(
                request_id = %req.request_id,
                method = %req.method,
                path = %req.path,
                "No route for request"
            );
            return ActionOutcome::NotFound;
        };

        let result =
            panic::catch_unwind(AssertUnwindSafe(|| self.run(req, &matched, &mut *res)));
        match result {
            Ok(outcome) => outcome,
            Err(payload) => {
                let action_name = matched.target().action.name();
                let message = panic_message(payload.as_ref());
                error!(
                    request_id = %req.request_id,
                    action = %action_name,
                    panic_message = %message,
                    "Dispatch panicked"
                );
                ActionOutcome::InternalError(DispatchError::Panicked {
                    action: action_name.to_string(),
                    message,
                })
            }
        }
    }

    fn run(
        &self,
        req: &DispatchRequest,
        matched: &RouteMatch<ActionBinding>,
        res: &mut dyn ResponseSink,
    ) -> ActionOutcome {
        let start = Instant::now();
        let binding = matched.target();
        let action_name = binding.action.name();

        // D1: middleware chain
        debug!(
            request_id = %req.request_id,
            action = %action_name,
            middleware_count = binding.middlewares.len(),
            "Middleware chain start"
        );
        for middleware in &binding.middlewares {
            middleware.apply(req, res);
            if res.flushed() {
                info!(
                    request_id = %req.request_id,
                    action = %action_name,
                    middleware = middleware.name(),
                    "Middleware ended request"
                );
                return ActionOutcome::Halted {
                    middleware: middleware.name(),
                };
            }
        }

        // D2: controller resolution
        let controller = match self.container.resolve_instance(binding.controller) {
            Ok(controller) => controller,
            Err(cause) => {
                error!(
                    request_id = %req.request_id,
                    controller = %binding.controller,
                    action = %action_name,
                    error = %cause,
                    "Controller resolution failed"
                );
                return ActionOutcome::InternalError(DispatchError::ControllerUnavailable {
                    controller: binding.controller.name(),
                    cause,
                });
            }
        };

        // D3: argument binding
        let args = match bind_arguments(binding.action.params(), &matched.params, req) {
            Ok(args) => args,
            Err(e) => {
                warn!(
                    request_id = %req.request_id,
                    action = %action_name,
                    error = %e,
                    "Argument binding failed"
                );
                return ActionOutcome::BadRequest(e);
            }
        };

        // D4: invocation
        let result = {
            let mut ctx = ActionContext::new(req, &matched.params, args, &mut *res);
            binding.action.invoke(&controller, &mut ctx)
        };
        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Err(source) => {
                error!(
                    request_id = %req.request_id,
                    action = %action_name,
                    error = %source,
                    latency_ms,
                    "Action failed"
                );
                ActionOutcome::InternalError(DispatchError::Action {
                    action: action_name.to_string(),
                    source,
                })
            }
            Ok(_) if res.flushed() => {
                info!(
                    request_id = %req.request_id,
                    action = %action_name,
                    latency_ms,
                    "Action wrote response"
                );
                ActionOutcome::Completed { status: None }
            }
            Ok(value) => {
                let (status, content_type, body) = value.into_parts();
                let mut headers = HeaderVec::new();
                if let Some(content_type) = content_type {
                    headers.push((Arc::from("content-type"), content_type.to_string()));
                }
                res.write(status, headers, body);
                info!(
                    request_id = %req.request_id,
                    action = %action_name,
                    status,
                    latency_ms,
                    "Action complete"
                );
                ActionOutcome::Completed {
                    status: Some(status),
                }
            }
        }
    }

    /// Dispatch into a fresh [`BufferedResponse`]; failure outcomes get a JSON
    /// error body.
    pub fn dispatch_buffered(&self, req: &DispatchRequest) -> (ActionOutcome, BufferedResponse) {
        let mut res = BufferedResponse::new();
        let outcome = self.dispatch(req, &mut res);
        outcome.write_error_response(&mut res);
        (outcome, res)
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionResult, ParamSource};
    use crate::ioc::{Component, RegistrationBuilder, TypeCatalog};
    use crate::router::{compile, Route, Verb};
    use http::Method;

    #[derive(Default)]
    struct Echo;

    fn dispatcher(actions: Vec<(&str, ActionDescriptor)>) -> Dispatcher {
        let mut catalog = TypeCatalog::new();
        catalog.add(Component::<Echo>::with_default());
        let mut builder = RegistrationBuilder::new(Arc::new(catalog));
        builder.register_type::<Echo>().unwrap();
        let container = Arc::new(builder.build());

        let mut router = Router::new();
        for (template, action) in actions {
            let verb = action.verb();
            let binding = ActionBinding::new(TypeKey::of::<Echo>(), Arc::new(action), Vec::new());
            router
                .register(Route::new(compile("/", template).unwrap(), verb, binding))
                .unwrap();
        }
        Dispatcher::new(Arc::new(router), container)
    }

    #[test]
    fn test_not_found() {
        let d = dispatcher(Vec::new());
        let (outcome, res) = d.dispatch_buffered(&DispatchRequest::new(Method::GET, "/none"));
        assert_eq!(outcome, ActionOutcome::NotFound);
        assert_eq!(outcome.status(), Some(404));
        assert_eq!(res.status, 404);
    }

    #[test]
    fn test_result_is_serialised() {
        let d = dispatcher(vec![(
            "echo/{int:n}",
            ActionDescriptor::get("echo", "echo/{int:n}")
                .param(ParamSource::Route)
                .handler(|_: &Echo, ctx| {
                    ActionResult::json(&serde_json::json!({ "n": ctx.int(0)? }))
                }),
        )]);
        let (outcome, res) = d.dispatch_buffered(&DispatchRequest::new(Method::GET, "/echo/7"));
        assert_eq!(outcome, ActionOutcome::Completed { status: Some(200) });
        assert_eq!(res.get_header("content-type"), Some("application/json"));
        assert_eq!(res.body_json(), Some(serde_json::json!({ "n": 7 })));
    }

    #[test]
    fn test_panic_is_internal_error() {
        let d = dispatcher(vec![(
            "boom",
            ActionDescriptor::get("boom", "boom").handler(
                |_: &Echo, _| -> Result<ActionResult, ActionError> { panic!("kaboom") },
            ),
        )]);
        let (outcome, res) = d.dispatch_buffered(&DispatchRequest::new(Method::GET, "/boom"));
        match outcome {
            ActionOutcome::InternalError(DispatchError::Panicked { message, .. }) => {
                assert_eq!(message, "kaboom");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(res.status, 500);
    }
}
