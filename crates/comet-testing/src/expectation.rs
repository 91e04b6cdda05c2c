use super::matcher::RequestMatcher;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use std::time::Duration;

/// A canned answer for requests that satisfy a matcher
#[derive(Debug, Clone)]
pub struct Expectation {
    pub(crate) matcher: RequestMatcher,
    pub(crate) response: MockResponse,
    pub(crate) times: Times,
    pub(crate) call_count: usize,
}

impl Expectation {
    pub fn new(matcher: RequestMatcher) -> Self {
        Self {
            matcher,
            response: MockResponse::default(),
            times: Times::Any,
            call_count: 0,
        }
    }

    pub fn respond_with(mut self, response: MockResponse) -> Self {
        self.response = response;
        self
    }

    pub fn times(mut self, times: Times) -> Self {
        self.times = times;
        self
    }

    /// Number of requests this expectation has answered so far
    pub fn call_count(&self) -> usize {
        self.call_count
    }

    /// Describe why the call count violates `times`, if it does
    pub(crate) fn violation(&self) -> Option<String> {
        let n = self.call_count;
        let ok = match self.times {
            Times::Once => n == 1,
            Times::Exactly(expected) => n == expected,
            Times::AtLeast(min) => n >= min,
            Times::AtMost(max) => n <= max,
            Times::Any => true,
        };

        (!ok).then(|| format!("{:?} expected {:?} calls, got {}", self.matcher, self.times, n))
    }
}

/// How many matching requests an expectation should see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Times {
    Once,
    Exactly(usize),
    AtLeast(usize),
    AtMost(usize),
    Any,
}

/// The response a mock expectation sends back
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) delay: Option<Duration>,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            delay: None,
        }
    }
}

impl MockResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// # Panics
    ///
    /// Panics if `name` or `value` is not a legal header.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(
            HeaderName::from_bytes(name.as_bytes()).expect("invalid mock header name"),
            HeaderValue::from_str(value).expect("invalid mock header value"),
        );
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// # Panics
    ///
    /// Panics if `body` cannot be serialized.
    pub fn json(mut self, body: impl serde::Serialize) -> Self {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = serde_json::to_vec(&body)
            .expect("mock JSON body must serialize")
            .into();
        self
    }

    /// Hold the response back for `delay` after the request body is read
    ///
    /// Useful for exercising client-side timeouts.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_reports_unmet_counts() {
        let mut exp = Expectation::new(RequestMatcher::new()).times(Times::Once);
        assert!(exp.violation().is_some());
        exp.call_count = 1;
        assert!(exp.violation().is_none());
        exp.call_count = 2;
        assert!(exp.violation().unwrap().contains("got 2"));
    }

    #[test]
    fn test_any_accepts_zero_calls() {
        let exp = Expectation::new(RequestMatcher::new());
        assert_eq!(exp.times, Times::Any);
        assert!(exp.violation().is_none());
    }

    #[test]
    fn test_json_response_sets_content_type() {
        let resp = MockResponse::new().json(serde_json::json!({"accepted": true}));
        assert_eq!(resp.headers[CONTENT_TYPE], "application/json");
        assert_eq!(&resp.body[..], br#"{"accepted":true}"#);
    }
}
