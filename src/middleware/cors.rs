//! Origin whitelist CORS middleware.
//!
//! Allowed origins get `Vary`, `Access-Control-Allow-*` headers; preflight
//! (`OPTIONS`) requests are answered directly with `ok`. A cross-origin request
//! from an origin outside the whitelist is answered with 405. Requests without
//! an `Origin` header pass through untouched.

use std::fmt;

use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ORIGIN, VARY,
};
use http::Method;
use tracing::{debug, warn};

use super::Middleware;
use crate::dispatcher::{DispatchRequest, HeaderVec, ResponseSink};

const DEFAULT_METHODS: &str = "GET, POST, PUT, DELETE";
const DEFAULT_HEADERS: &str = "X-Requested-With, X-CSRF-Token, Authorization, Content-Type, Ajax";

/// CORS configuration error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsConfigError {
    /// A whitelist must name at least one origin.
    EmptyWhitelist,
    /// Origins must look like `scheme://host[:port]`.
    InvalidOriginFormat { origin: String },
}

impl fmt::Display for CorsConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorsConfigError::EmptyWhitelist => {
                write!(f, "CORS configuration error: origin whitelist is empty")
            }
            CorsConfigError::InvalidOriginFormat { origin } => write!(
                f,
                "CORS configuration error: invalid origin '{origin}', expected scheme://host[:port]"
            ),
        }
    }
}

impl std::error::Error for CorsConfigError {}

#[derive(Debug, Clone)]
enum Origins {
    Any,
    Whitelist(Vec<String>),
}

/// Answers preflights and stamps CORS headers for whitelisted origins.
///
/// Requests without an `Origin` header are not cross-origin and pass through
/// untouched, `OPTIONS` included: such a request reaches the routed action.
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    origins: Origins,
    allowed_methods: String,
    allowed_headers: String,
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl CorsMiddleware {
    /// Allow any origin. No credentials header is sent with a wildcard origin.
    pub fn new() -> Self {
        Self {
            origins: Origins::Any,
            allowed_methods: DEFAULT_METHODS.to_string(),
            allowed_headers: DEFAULT_HEADERS.to_string(),
        }
    }

    /// Allow only the listed origins (a `*` entry allows any origin).
    /// Credentials are allowed for whitelisted origins.
    pub fn with_whitelist<I, S>(origins: I) -> Result<Self, CorsConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let origins: Vec<String> = origins.into_iter().map(Into::into).collect();
        if origins.is_empty() {
            return Err(CorsConfigError::EmptyWhitelist);
        }
        if origins.iter().any(|o| o == "*") {
            return Ok(Self::new());
        }
        for origin in &origins {
            validate_origin(origin)?;
        }
        Ok(Self {
            origins: Origins::Whitelist(origins),
            ..Self::new()
        })
    }

    pub fn allowed_methods(mut self, methods: &[Method]) -> Self {
        self.allowed_methods = methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        self
    }

    pub fn allowed_headers(mut self, headers: &[&str]) -> Self {
        self.allowed_headers = headers.join(", ");
        self
    }

    fn allow_origin<'a>(&'a self, origin: &'a str) -> Option<&'a str> {
        match &self.origins {
            Origins::Any => Some("*"),
            Origins::Whitelist(list) => list.iter().any(|o| o == origin).then_some(origin),
        }
    }
}

fn validate_origin(origin: &str) -> Result<(), CorsConfigError> {
    let valid = origin
        .split_once("://")
        .is_some_and(|(scheme, host)| {
            !scheme.is_empty()
                && scheme.chars().all(|c| c.is_ascii_alphabetic())
                && !host.is_empty()
                && !host.contains('/')
        });
    if valid {
        Ok(())
    } else {
        Err(CorsConfigError::InvalidOriginFormat {
            origin: origin.to_string(),
        })
    }
}

impl Middleware for CorsMiddleware {
    fn apply(&self, req: &DispatchRequest, res: &mut dyn ResponseSink) {
        let Some(origin) = req.header(ORIGIN.as_str()) else {
            return;
        };

        let Some(allowed) = self.allow_origin(origin) else {
            warn!(
                request_id = %req.request_id,
                origin = %origin,
                "CORS origin rejected"
            );
            res.write(405, HeaderVec::new(), Vec::new());
            return;
        };

        res.set_header(VARY.as_str(), "Origin".to_string());
        if matches!(self.origins, Origins::Whitelist(_)) {
            res.set_header(ACCESS_CONTROL_ALLOW_CREDENTIALS.as_str(), "true".to_string());
        }
        res.set_header(ACCESS_CONTROL_ALLOW_ORIGIN.as_str(), allowed.to_string());
        res.set_header(ACCESS_CONTROL_ALLOW_METHODS.as_str(), self.allowed_methods.clone());
        res.set_header(ACCESS_CONTROL_ALLOW_HEADERS.as_str(), self.allowed_headers.clone());

        if req.method == Method::OPTIONS {
            debug!(request_id = %req.request_id, origin = %origin, "CORS preflight answered");
            res.write(200, HeaderVec::new(), b"ok".to_vec());
        }
    }

    fn name(&self) -> &'static str {
        "cors"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::BufferedResponse;

    #[test]
    fn test_wildcard_sets_headers_without_credentials() {
        let cors = CorsMiddleware::new();
        let req = DispatchRequest::new(Method::GET, "/x").with_header("Origin", "https://a.test");
        let mut res = BufferedResponse::new();
        cors.apply(&req, &mut res);
        assert!(!res.flushed());
        assert_eq!(res.get_header("access-control-allow-origin"), Some("*"));
        assert_eq!(res.get_header("vary"), Some("Origin"));
        assert_eq!(res.get_header("access-control-allow-credentials"), None);
    }

    #[test]
    fn test_preflight_is_answered() {
        let cors = CorsMiddleware::with_whitelist(["https://a.test"]).unwrap();
        let req =
            DispatchRequest::new(Method::OPTIONS, "/x").with_header("Origin", "https://a.test");
        let mut res = BufferedResponse::new();
        cors.apply(&req, &mut res);
        assert!(res.flushed());
        assert_eq!(res.status, 200);
        assert_eq!(res.body_text(), "ok");
        assert_eq!(res.get_header("access-control-allow-origin"), Some("https://a.test"));
        assert_eq!(res.get_header("access-control-allow-credentials"), Some("true"));
    }

    #[test]
    fn test_unlisted_origin_is_rejected() {
        let cors = CorsMiddleware::with_whitelist(["https://a.test"]).unwrap();
        let req =
            DispatchRequest::new(Method::GET, "/x").with_header("Origin", "https://evil.test");
        let mut res = BufferedResponse::new();
        cors.apply(&req, &mut res);
        assert!(res.flushed());
        assert_eq!(res.status, 405);
    }

    #[test]
    fn test_whitelist_validation() {
        assert_eq!(
            CorsMiddleware::with_whitelist(Vec::<String>::new()).unwrap_err(),
            CorsConfigError::EmptyWhitelist
        );
        assert!(matches!(
            CorsMiddleware::with_whitelist(["a.test"]),
            Err(CorsConfigError::InvalidOriginFormat { .. })
        ));
    }
}
