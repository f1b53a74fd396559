//! Positional argument binding.
//!
//! Parameter *i* takes the route value at position *i* when there is one;
//! otherwise its declared [`ParamSource`] decides. OPTIONS requests are not
//! bound: every argument is [`ArgValue::Missing`].

use std::fmt;

use http::Method;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::metadata::{ActionError, ParamSource, QueryKind};
use crate::dispatcher::{DispatchRequest, FormFile, ResponseSink};
use crate::router::{ParamValue, ParamVec};

/// A bound argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Int(i64),
    Str(String),
    List(Vec<String>),
    Json(Value),
    Files(Vec<FormFile>),
    Missing,
}

impl ArgValue {
    pub fn kind(&self) -> &'static str {
        match self {
            ArgValue::Int(_) => "int",
            ArgValue::Str(_) => "string",
            ArgValue::List(_) => "list",
            ArgValue::Json(_) => "json",
            ArgValue::Files(_) => "files",
            ArgValue::Missing => "missing",
        }
    }
}

impl From<&ParamValue> for ArgValue {
    fn from(value: &ParamValue) -> Self {
        match value {
            ParamValue::Int(v) => ArgValue::Int(*v),
            ParamValue::Str(v) => ArgValue::Str(v.clone()),
        }
    }
}

/// Request data that cannot be bound to the declared parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    InvalidQueryInt { name: String, value: String },
    MalformedJson { message: String },
    UnsupportedContentType { content_type: String },
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindError::InvalidQueryInt { name, value } => {
                write!(f, "query parameter '{name}' is not an integer: '{value}'")
            }
            BindError::MalformedJson { message } => write!(f, "malformed JSON body: {message}"),
            BindError::UnsupportedContentType { content_type } => {
                write!(f, "unsupported content type '{content_type}' for body binding")
            }
        }
    }
}

impl std::error::Error for BindError {}

/// Bound arguments of one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionArgs {
    values: Vec<ArgValue>,
}

impl ActionArgs {
    pub fn new(values: Vec<ArgValue>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> Option<&ArgValue> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_missing(&self, index: usize) -> bool {
        matches!(self.values.get(index), None | Some(ArgValue::Missing))
    }

    fn mismatch(&self, index: usize, expected: &'static str) -> ActionError {
        ActionError::Argument {
            index,
            expected,
            found: self.values.get(index).map_or("nothing", ArgValue::kind),
        }
    }

    pub fn int(&self, index: usize) -> Result<i64, ActionError> {
        match self.values.get(index) {
            Some(ArgValue::Int(v)) => Ok(*v),
            _ => Err(self.mismatch(index, "int")),
        }
    }

    pub fn str(&self, index: usize) -> Result<&str, ActionError> {
        match self.values.get(index) {
            Some(ArgValue::Str(v)) => Ok(v),
            _ => Err(self.mismatch(index, "string")),
        }
    }

    pub fn list(&self, index: usize) -> Result<&[String], ActionError> {
        match self.values.get(index) {
            Some(ArgValue::List(v)) => Ok(v),
            _ => Err(self.mismatch(index, "list")),
        }
    }

    pub fn json(&self, index: usize) -> Result<&Value, ActionError> {
        match self.values.get(index) {
            Some(ArgValue::Json(v)) => Ok(v),
            _ => Err(self.mismatch(index, "json")),
        }
    }

    /// Deserialise a `from body` argument.
    pub fn body<T: DeserializeOwned>(&self, index: usize) -> Result<T, ActionError> {
        let value = self.json(index)?;
        T::deserialize(value).map_err(|e| ActionError::Body {
            index,
            message: e.to_string(),
        })
    }

    pub fn files(&self, index: usize) -> Result<&[FormFile], ActionError> {
        match self.values.get(index) {
            Some(ArgValue::Files(v)) => Ok(v),
            _ => Err(self.mismatch(index, "files")),
        }
    }
}

/// What an action sees while it runs.
pub struct ActionContext<'a> {
    request: &'a DispatchRequest,
    route_params: &'a ParamVec,
    args: ActionArgs,
    response: &'a mut dyn ResponseSink,
}

impl<'a> ActionContext<'a> {
    pub fn new(
        request: &'a DispatchRequest,
        route_params: &'a ParamVec,
        args: ActionArgs,
        response: &'a mut dyn ResponseSink,
    ) -> Self {
        Self {
            request,
            route_params,
            args,
            response,
        }
    }

    pub fn request(&self) -> &DispatchRequest {
        self.request
    }

    pub fn route_params(&self) -> &ParamVec {
        self.route_params
    }

    pub fn args(&self) -> &ActionArgs {
        &self.args
    }

    /// Direct access to the sink. Writing to it replaces default serialisation.
    pub fn response(&mut self) -> &mut dyn ResponseSink {
        &mut *self.response
    }

    pub fn int(&self, index: usize) -> Result<i64, ActionError> {
        self.args.int(index)
    }

    pub fn str(&self, index: usize) -> Result<&str, ActionError> {
        self.args.str(index)
    }

    pub fn body<T: DeserializeOwned>(&self, index: usize) -> Result<T, ActionError> {
        self.args.body(index)
    }
}

/// Bind `params` for `request` given the route-extracted values.
pub fn bind_arguments(
    params: &[ParamSource],
    route_params: &ParamVec,
    request: &DispatchRequest,
) -> Result<ActionArgs, BindError> {
    if request.method == Method::OPTIONS {
        return Ok(ActionArgs::new(vec![ArgValue::Missing; params.len()]));
    }

    let mut values = Vec::with_capacity(params.len());
    for (index, source) in params.iter().enumerate() {
        if let Some(param) = route_params.get(index) {
            values.push(ArgValue::from(&param.value));
            continue;
        }
        let value = match source {
            ParamSource::Route => ArgValue::Missing,
            ParamSource::Query { name, kind } => bind_query(request, name, *kind)?,
            ParamSource::Body => ArgValue::Json(parse_body(request)?),
            ParamSource::Files => ArgValue::Files(request.files.clone()),
        };
        values.push(value);
    }
    Ok(ActionArgs::new(values))
}

fn bind_query(
    request: &DispatchRequest,
    name: &str,
    kind: QueryKind,
) -> Result<ArgValue, BindError> {
    let values = request.query_values(name);
    Ok(match kind {
        QueryKind::Str => {
            ArgValue::Str(values.first().map(|v| (*v).to_string()).unwrap_or_default())
        }
        QueryKind::Int => match values.first() {
            None => ArgValue::Int(0),
            Some(raw) => ArgValue::Int(raw.trim().parse::<i64>().map_err(|_| {
                BindError::InvalidQueryInt {
                    name: name.to_string(),
                    value: (*raw).to_string(),
                }
            })?),
        },
        QueryKind::List => ArgValue::List(values.into_iter().map(str::to_string).collect()),
    })
}

/// Body as JSON: JSON bodies are parsed, form bodies become an object
/// (single values as strings, repeated names as arrays).
fn parse_body(request: &DispatchRequest) -> Result<Value, BindError> {
    let body = match &request.body {
        Some(body) if !body.is_empty() => body,
        _ => return Ok(Value::Null),
    };
    let content_type = request.content_type().unwrap_or("");
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "" | "application/json" => parse_json(body),
        ct if ct.ends_with("+json") => parse_json(body),
        "application/x-www-form-urlencoded" => Ok(form_to_json(body)),
        _ => Err(BindError::UnsupportedContentType {
            content_type: content_type.to_string(),
        }),
    }
}

fn parse_json(body: &[u8]) -> Result<Value, BindError> {
    serde_json::from_slice(body).map_err(|e| BindError::MalformedJson {
        message: e.to_string(),
    })
}

fn form_to_json(body: &[u8]) -> Value {
    let mut object = Map::new();
    for (name, value) in url::form_urlencoded::parse(body).into_owned() {
        match object.get_mut(&name) {
            None => {
                object.insert(name, Value::String(value));
            }
            Some(Value::Array(items)) => items.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
        }
    }
    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::compile;

    fn route_params(template: &str, path: &str) -> ParamVec {
        compile("/", template).unwrap().captures(path).unwrap()
    }

    #[test]
    fn test_route_value_wins_over_declared_source() {
        let params = [ParamSource::query("id"), ParamSource::query("q")];
        let request = DispatchRequest::from_uri(Method::GET, "/items/5?id=9&q=x");
        let route = route_params("items/{int:id}", "/items/5");
        let args = bind_arguments(&params, &route, &request).unwrap();
        assert_eq!(args.int(0).unwrap(), 5);
        assert_eq!(args.str(1).unwrap(), "x");
    }

    #[test]
    fn test_query_kinds() {
        let params = [
            ParamSource::query("missing"),
            ParamSource::query_int("page"),
            ParamSource::query_list("tag"),
            ParamSource::query_int("absent"),
        ];
        let request = DispatchRequest::from_uri(Method::GET, "/?page=3&tag=a&tag=b");
        let args = bind_arguments(&params, &ParamVec::new(), &request).unwrap();
        assert_eq!(args.str(0).unwrap(), "");
        assert_eq!(args.int(1).unwrap(), 3);
        assert_eq!(args.list(2).unwrap(), ["a".to_string(), "b".to_string()]);
        assert_eq!(args.int(3).unwrap(), 0);
    }

    #[test]
    fn test_invalid_query_int_is_bind_error() {
        let request = DispatchRequest::from_uri(Method::GET, "/?page=x");
        let err = bind_arguments(&[ParamSource::query_int("page")], &ParamVec::new(), &request)
            .unwrap_err();
        assert!(matches!(err, BindError::InvalidQueryInt { .. }));
    }

    #[test]
    fn test_form_body_becomes_object() {
        let request = DispatchRequest::new(Method::POST, "/")
            .with_body("application/x-www-form-urlencoded", "a=1&b=x&b=y");
        let args = bind_arguments(&[ParamSource::Body], &ParamVec::new(), &request).unwrap();
        assert_eq!(
            args.json(0).unwrap(),
            &serde_json::json!({"a": "1", "b": ["x", "y"]})
        );
    }

    #[test]
    fn test_malformed_json_body() {
        let request = DispatchRequest::new(Method::POST, "/").with_body("application/json", "{");
        let err = bind_arguments(&[ParamSource::Body], &ParamVec::new(), &request).unwrap_err();
        assert!(matches!(err, BindError::MalformedJson { .. }));
    }

    #[test]
    fn test_options_skips_binding() {
        let request = DispatchRequest::new(Method::OPTIONS, "/").with_body("application/json", "{");
        let params = [ParamSource::Body, ParamSource::Route];
        let args = bind_arguments(&params, &ParamVec::new(), &request).unwrap();
        assert!(args.is_missing(0));
        assert!(args.is_missing(1));
    }

    #[test]
    fn test_missing_route_position() {
        let request = DispatchRequest::new(Method::GET, "/");
        let args = bind_arguments(&[ParamSource::Route], &ParamVec::new(), &request).unwrap();
        assert_eq!(args.get(0), Some(&ArgValue::Missing));
        assert!(matches!(
            args.int(0),
            Err(ActionError::Argument { found: "missing", .. })
        ));
    }
}
