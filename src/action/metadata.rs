use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::binding::ActionContext;
use crate::ioc::{downcast, Component, Instance, ServiceDescriptor, TypeKey};
use crate::router::Verb;

/// How a `from query` parameter is converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// First value, or `""` when absent.
    Str,
    /// First value parsed as an integer, or `0` when absent.
    Int,
    /// Every value in order.
    List,
}

/// Declared source of one positional action parameter.
///
/// A route value at the same position always takes precedence; the source only
/// applies when the route has no value there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamSource {
    Route,
    Query { name: String, kind: QueryKind },
    Body,
    Files,
}

impl ParamSource {
    pub fn query(name: impl Into<String>) -> Self {
        ParamSource::Query {
            name: name.into(),
            kind: QueryKind::Str,
        }
    }

    pub fn query_int(name: impl Into<String>) -> Self {
        ParamSource::Query {
            name: name.into(),
            kind: QueryKind::Int,
        }
    }

    pub fn query_list(name: impl Into<String>) -> Self {
        ParamSource::Query {
            name: name.into(),
            kind: QueryKind::List,
        }
    }
}

/// Value an action returns when it does not write the response itself.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult {
    Json(Value),
    Text(String),
    Empty,
}

impl ActionResult {
    pub fn json<T: Serialize>(value: &T) -> Result<Self, ActionError> {
        serde_json::to_value(value)
            .map(ActionResult::Json)
            .map_err(|e| ActionError::Serialize {
                message: e.to_string(),
            })
    }

    pub fn text(value: impl Into<String>) -> Self {
        ActionResult::Text(value.into())
    }

    /// Status, content type and body for default serialisation.
    pub fn into_parts(self) -> (u16, Option<&'static str>, Vec<u8>) {
        match self {
            ActionResult::Json(value) => {
                (200, Some("application/json"), value.to_string().into_bytes())
            }
            ActionResult::Text(text) => (200, Some("text/plain; charset=utf-8"), text.into_bytes()),
            ActionResult::Empty => (204, None, Vec::new()),
        }
    }
}

/// Errors raised by an action or by argument access inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// Argument `index` is absent or of another kind.
    Argument {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },
    /// The bound body could not be deserialised into the requested type.
    Body { index: usize, message: String },
    Serialize { message: String },
    /// The action was declared without a handler.
    NoHandler { action: String },
    /// The container returned an instance of another type than the handler expects.
    ControllerMismatch { expected: &'static str },
    /// Application failure reported by the action.
    Failed { message: String },
}

impl ActionError {
    pub fn failed(message: impl Into<String>) -> Self {
        ActionError::Failed {
            message: message.into(),
        }
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionError::Argument {
                index,
                expected,
                found,
            } => write!(f, "argument {index}: expected {expected}, found {found}"),
            ActionError::Body { index, message } => {
                write!(f, "argument {index}: body does not deserialize: {message}")
            }
            ActionError::Serialize { message } => {
                write!(f, "action result does not serialize: {message}")
            }
            ActionError::NoHandler { action } => write!(f, "action '{action}' has no handler"),
            ActionError::ControllerMismatch { expected } => {
                write!(f, "controller instance is not a '{expected}'")
            }
            ActionError::Failed { message } => f.write_str(message),
        }
    }
}

impl std::error::Error for ActionError {}

/// Type-erased action entry point.
pub type ActionFn = Arc<
    dyn Fn(&Instance, &mut ActionContext<'_>) -> Result<ActionResult, ActionError> + Send + Sync,
>;

/// One routable action of a controller.
#[derive(Clone)]
pub struct ActionDescriptor {
    name: String,
    verb: Verb,
    template: String,
    params: Vec<ParamSource>,
    controller: Option<TypeKey>,
    invoke: Option<ActionFn>,
}

impl ActionDescriptor {
    pub fn new(verb: Verb, name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            verb,
            template: template.into(),
            params: Vec::new(),
            controller: None,
            invoke: None,
        }
    }

    pub fn get(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self::new(Verb::Get, name, template)
    }

    pub fn post(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self::new(Verb::Post, name, template)
    }

    pub fn put(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self::new(Verb::Put, name, template)
    }

    pub fn delete(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self::new(Verb::Delete, name, template)
    }

    pub fn all(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self::new(Verb::All, name, template)
    }

    /// Declare the next positional parameter.
    pub fn param(mut self, source: ParamSource) -> Self {
        self.params.push(source);
        self
    }

    /// Set the handler. The controller type is taken from its first argument.
    pub fn handler<C, F>(mut self, handler: F) -> Self
    where
        C: Send + Sync + 'static,
        F: Fn(&C, &mut ActionContext<'_>) -> Result<ActionResult, ActionError>
            + Send
            + Sync
            + 'static,
    {
        self.controller = Some(TypeKey::of::<C>());
        self.invoke = Some(Arc::new(
            move |instance: &Instance, ctx: &mut ActionContext<'_>| {
                let controller = downcast::<C>(instance).ok_or(ActionError::ControllerMismatch {
                    expected: std::any::type_name::<C>(),
                })?;
                handler(&controller, ctx)
            },
        ));
        self
    }

    pub fn invoke(
        &self,
        controller: &Instance,
        ctx: &mut ActionContext<'_>,
    ) -> Result<ActionResult, ActionError> {
        match &self.invoke {
            Some(invoke) => invoke(controller, ctx),
            None => Err(ActionError::NoHandler {
                action: self.name.clone(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn params(&self) -> &[ParamSource] {
        &self.params
    }

    /// Controller type the handler was written for, once a handler is set.
    pub fn controller(&self) -> Option<TypeKey> {
        self.controller
    }

    pub fn has_handler(&self) -> bool {
        self.invoke.is_some()
    }
}

impl fmt::Debug for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDescriptor")
            .field("name", &self.name)
            .field("verb", &self.verb)
            .field("template", &self.template)
            .field("params", &self.params)
            .field("controller", &self.controller)
            .field("has_handler", &self.invoke.is_some())
            .finish()
    }
}

/// A controller: its construction, its route prefix and its actions.
pub struct ControllerDescriptor {
    key: TypeKey,
    prefix: String,
    service: ServiceDescriptor,
    actions: Vec<ActionDescriptor>,
}

impl ControllerDescriptor {
    pub fn new<C: Send + Sync + 'static>(
        prefix: impl Into<String>,
        component: Component<C>,
    ) -> Self {
        Self {
            key: TypeKey::of::<C>(),
            prefix: prefix.into(),
            service: component.into(),
            actions: Vec::new(),
        }
    }

    pub fn action(mut self, action: ActionDescriptor) -> Self {
        self.actions.push(action);
        self
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// Short type name, used in logs and startup errors.
    pub fn name(&self) -> &'static str {
        short_type_name(self.key.name())
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn actions(&self) -> &[ActionDescriptor] {
        &self.actions
    }

    pub(crate) fn into_parts(self) -> (ServiceDescriptor, ControllerRoutes) {
        (
            self.service,
            ControllerRoutes {
                key: self.key,
                prefix: self.prefix,
                actions: self.actions,
            },
        )
    }
}

pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    full.rsplit("::").next().unwrap_or(full)
}

pub(crate) struct ControllerRoutes {
    pub(crate) key: TypeKey,
    pub(crate) prefix: String,
    pub(crate) actions: Vec<ActionDescriptor>,
}
