use std::sync::Arc;

use http::Method;
use serde_json::Value;
use smallvec::SmallVec;

use crate::ids::{RequestId, REQUEST_ID_HEADER};

/// Maximum inline headers before heap allocation.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Header storage; names are shared `Arc<str>`, values are per request.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// An uploaded file, already parsed out of a multipart body by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormFile {
    pub field_name: String,
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Request as seen by the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub request_id: RequestId,
    pub method: Method,
    /// Path without query string.
    pub path: String,
    /// Query pairs in order of appearance; names may repeat.
    pub query: Vec<(String, String)>,
    pub headers: HeaderVec,
    pub body: Option<Vec<u8>>,
    pub files: Vec<FormFile>,
}

impl DispatchRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            request_id: RequestId::new(),
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderVec::new(),
            body: None,
            files: Vec::new(),
        }
    }

    /// Split `uri` into path and query string; the query is form-decoded.
    pub fn from_uri(method: Method, uri: &str) -> Self {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (uri, None),
        };
        let mut request = Self::new(method, path);
        if let Some(query) = query {
            request.query = url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect();
        }
        request
    }

    /// Add a header. An `x-request-id` header also replaces the request id
    /// when it holds a valid ULID.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if name.eq_ignore_ascii_case(REQUEST_ID_HEADER) {
            self.request_id = RequestId::from_header_or_new(Some(&value));
        }
        self.headers.push((Arc::from(name), value));
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Set the body and its `content-type`.
    pub fn with_body(self, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        let mut request = self.with_header("content-type", content_type);
        request.body = Some(body.into());
        request
    }

    /// Shorthand for a JSON body.
    pub fn with_json(self, body: &Value) -> Self {
        self.with_body("application/json", body.to_string())
    }

    pub fn with_files(mut self, files: Vec<FormFile>) -> Self {
        self.files = files;
        self
    }

    /// Header lookup, case-insensitive per RFC 7230.
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value of query parameter `name`, in order.
    pub fn query_values(&self, name: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

/// Where a dispatch writes its response.
///
/// A middleware or action that calls [`write`](ResponseSink::write) takes over
/// the response: the dispatcher then stops the middleware chain, or skips
/// default serialisation of the action result.
pub trait ResponseSink: Send {
    /// Set a header for the response that will be written.
    fn set_header(&mut self, name: &str, value: String);
    /// Write the full response and mark the sink flushed.
    fn write(&mut self, status: u16, headers: HeaderVec, body: Vec<u8>);
    fn flushed(&self) -> bool;
}

/// In-memory [`ResponseSink`].
#[derive(Debug, Clone, Default)]
pub struct BufferedResponse {
    pub status: u16,
    pub headers: HeaderVec,
    pub body: Vec<u8>,
    flushed: bool,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body parsed as JSON, if it is JSON.
    pub fn body_json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    /// Write `{"error": message}` with the given status.
    pub fn write_error(&mut self, status: u16, message: &str) {
        let mut headers = HeaderVec::new();
        headers.push((Arc::from("content-type"), "application/json".to_string()));
        let body = serde_json::json!({ "error": message }).to_string().into_bytes();
        self.write(status, headers, body);
    }
}

impl ResponseSink for BufferedResponse {
    fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value));
    }

    fn write(&mut self, status: u16, headers: HeaderVec, body: Vec<u8>) {
        self.status = status;
        for (name, value) in headers {
            self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
            self.headers.push((name, value));
        }
        self.body = body;
        self.flushed = true;
    }

    fn flushed(&self) -> bool {
        self.flushed
    }
}
