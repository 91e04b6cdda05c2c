use crate::server::RecordedRequest;
use http::Method;
use serde_json::Value;

/// Criteria a received request must satisfy for an expectation to answer it
///
/// All configured criteria must hold; a matcher with none matches everything.
#[derive(Debug, Clone, Default)]
pub struct RequestMatcher {
    pub(crate) method: Option<Method>,
    pub(crate) path: Option<String>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) present_headers: Vec<String>,
    pub(crate) body_json: Option<Value>,
    pub(crate) json_fields: Vec<(String, Value)>,
}

impl RequestMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require this HTTP method
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Require this exact path (case-sensitive, query excluded)
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Require a header with exactly this value
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Require a header to be present with any value
    pub fn header_present(mut self, name: impl Into<String>) -> Self {
        self.present_headers.push(name.into());
        self
    }

    /// Require the body to be JSON equal to `body`
    ///
    /// # Panics
    ///
    /// Panics if `body` cannot be represented as JSON.
    pub fn body_json(mut self, body: impl serde::Serialize) -> Self {
        self.body_json =
            Some(serde_json::to_value(body).expect("matcher body must serialize to JSON"));
        self
    }

    /// Require the JSON body to hold `value` at the RFC 6901 `pointer`
    ///
    /// ```rust,ignore
    /// RequestMatcher::new().json_field("/log/status_code", 500);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `value` cannot be represented as JSON.
    pub fn json_field(mut self, pointer: impl Into<String>, value: impl serde::Serialize) -> Self {
        let value = serde_json::to_value(value).expect("matcher field must serialize to JSON");
        self.json_fields.push((pointer.into(), value));
        self
    }

    /// Check whether `request` satisfies every criterion
    pub fn matches(&self, request: &RecordedRequest) -> bool {
        if let Some(method) = &self.method {
            if *method != request.method {
                return false;
            }
        }

        if let Some(path) = &self.path {
            if path != &request.path {
                return false;
            }
        }

        let headers_ok = self
            .headers
            .iter()
            .all(|(name, value)| request.headers.get(name).is_some_and(|v| v == value.as_str()));
        if !headers_ok {
            return false;
        }

        if !self
            .present_headers
            .iter()
            .all(|name| request.headers.contains_key(name.as_str()))
        {
            return false;
        }

        if self.body_json.is_none() && self.json_fields.is_empty() {
            return true;
        }

        let Some(actual) = request.json() else {
            return false;
        };

        if let Some(expected) = &self.body_json {
            if &actual != expected {
                return false;
            }
        }

        self.json_fields
            .iter()
            .all(|(pointer, expected)| actual.pointer(pointer) == Some(expected))
    }
}
