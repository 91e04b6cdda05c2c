//! The per-request telemetry record and its incremental builder.

use chrono::{DateTime, Utc};
use comet_core::Request;
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

/// Status recorded when the request is dropped before the downstream stage finishes.
pub const CANCELLED_STATUS: u16 = 499;

/// Message recorded for a cancelled request.
pub const CANCELLED_MESSAGE: &str = "request cancelled before the downstream stage completed";

/// Placeholder for redacted header values.
pub const REDACTED: &str = "[REDACTED]";

/// Everything forwarded about one intercepted request.
///
/// Field names are the wire contract; timestamps serialize as RFC 3339 in UTC.
///
/// ```json
/// {
///   "project_id": "storefront",
///   "request_time": "2024-05-01T12:00:00.000120Z",
///   "response_time": "2024-05-01T12:00:00.004810Z",
///   "method": "GET",
///   "path": "/api/products",
///   "query_string": "page=2",
///   "request_headers": {"accept": "application/json"},
///   "raw_request": "",
///   "raw_response": "{\"items\":[]}",
///   "status_code": 200
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub project_id: String,
    pub request_time: DateTime<Utc>,
    pub response_time: DateTime<Utc>,
    pub method: String,
    pub path: String,
    /// Raw query without the leading `?`; empty when the URI has none
    pub query_string: String,
    /// Lowercase header name to its values joined with `", "`
    pub request_headers: BTreeMap<String, String>,
    pub raw_request: String,
    pub raw_response: String,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

impl TelemetryRecord {
    /// JSON body for the ingestion endpoint, nested under `envelope` when given
    pub fn to_payload(&self, envelope: Option<&str>) -> Result<Value, serde_json::Error> {
        let record = serde_json::to_value(self)?;
        Ok(match envelope {
            Some(key) => {
                let mut wrapper = Map::with_capacity(1);
                wrapper.insert(key.to_string(), record);
                Value::Object(wrapper)
            }
            None => record,
        })
    }

    /// Whether the downstream stage failed, panicked or was cancelled
    pub fn is_failure(&self) -> bool {
        self.exception_message.is_some()
    }
}

/// Flatten a header map into the record's `name -> "v1, v2"` form.
///
/// Names listed in `redacted` (lowercase) keep their key but lose their value.
pub fn serialize_headers(headers: &HeaderMap, redacted: &HashSet<String>) -> BTreeMap<String, String> {
    let mut flat = BTreeMap::new();
    for name in headers.keys() {
        let key = name.as_str();
        let value = if redacted.contains(key) {
            REDACTED.to_string()
        } else {
            headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(", ")
        };
        flat.insert(key.to_string(), value);
    }
    flat
}

/// Accumulates a [`TelemetryRecord`] across the request lifecycle.
///
/// Timing starts when the builder is created. `finish` stamps the response
/// time from a monotonic clock, so it never precedes the request time even
/// if the wall clock steps backwards mid-request.
#[derive(Debug)]
pub struct RecordBuilder {
    record: TelemetryRecord,
    started: Instant,
}

impl RecordBuilder {
    /// Start a record from the request head
    pub fn begin(project_id: &str, req: &Request, redacted: &HashSet<String>) -> Self {
        let now = Utc::now();
        Self {
            record: TelemetryRecord {
                project_id: project_id.to_string(),
                request_time: now,
                response_time: now,
                method: req.method().to_string(),
                path: req.path().to_string(),
                query_string: req.query_string().unwrap_or_default().to_string(),
                request_headers: serialize_headers(req.headers(), redacted),
                raw_request: String::new(),
                raw_response: String::new(),
                status_code: StatusCode::OK.as_u16(),
                exception_message: None,
                traceback: None,
            },
            started: Instant::now(),
        }
    }

    pub fn request_body(&mut self, text: String) {
        self.record.raw_request = text;
    }

    /// Record what was sent to the client
    pub fn response(&mut self, status: StatusCode, body: String) {
        self.record.status_code = status.as_u16();
        self.record.raw_response = body;
    }

    /// Record a downstream failure
    pub fn failure(&mut self, message: String, traceback: Option<String>) {
        self.record.exception_message = Some(message);
        self.record.traceback = traceback;
    }

    /// Mark the request as dropped before the downstream stage finished
    pub fn cancelled(&mut self) {
        self.record.status_code = CANCELLED_STATUS;
        self.record.raw_response.clear();
        self.record.exception_message = Some(CANCELLED_MESSAGE.to_string());
        self.record.traceback = None;
    }

    /// Stamp the response time and hand over the finished record
    pub fn finish(mut self) -> TelemetryRecord {
        let elapsed = chrono::Duration::from_std(self.started.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.record.response_time = self.record.request_time + elapsed;
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn request(method: &str, uri: &str, headers: &[(&str, &str)]) -> Request {
        let mut builder = http::Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        Request::from_bytes(parts, "")
    }

    #[test]
    fn test_begin_captures_request_head() {
        let req = request(
            "GET",
            "/api/products?page=2&sort=asc",
            &[("Accept", "application/json"), ("X-Tag", "a"), ("x-tag", "b")],
        );
        let record = RecordBuilder::begin("storefront", &req, &HashSet::new()).finish();

        assert_eq!(record.project_id, "storefront");
        assert_eq!(record.method, "GET");
        assert_eq!(record.path, "/api/products");
        assert_eq!(record.query_string, "page=2&sort=asc");
        assert_eq!(record.request_headers["accept"], "application/json");
        assert_eq!(record.request_headers["x-tag"], "a, b");
        assert!(record.response_time >= record.request_time);
    }

    #[test]
    fn test_missing_query_is_empty_string() {
        let req = request("GET", "/api/products", &[]);
        let record = RecordBuilder::begin("p", &req, &HashSet::new()).finish();
        assert_eq!(record.query_string, "");
    }

    #[test]
    fn test_redacted_headers_keep_their_key() {
        let req = request("GET", "/", &[("Authorization", "Bearer s3cret"), ("Accept", "*/*")]);
        let redacted = HashSet::from(["authorization".to_string()]);
        let record = RecordBuilder::begin("p", &req, &redacted).finish();

        assert_eq!(record.request_headers["authorization"], REDACTED);
        assert_eq!(record.request_headers["accept"], "*/*");
    }

    #[test]
    fn test_failure_fields_are_omitted_when_absent() {
        let req = request("GET", "/api/products", &[]);
        let mut builder = RecordBuilder::begin("p", &req, &HashSet::new());
        builder.response(StatusCode::OK, r#"{"items":[]}"#.to_string());
        let value = serde_json::to_value(builder.finish()).unwrap();

        assert_eq!(value["status_code"], 200);
        assert_eq!(value["raw_response"], r#"{"items":[]}"#);
        assert!(value.get("exception_message").is_none());
        assert!(value.get("traceback").is_none());
    }

    #[test]
    fn test_failure_is_recorded() {
        let req = request("GET", "/api/fail", &[]);
        let mut builder = RecordBuilder::begin("p", &req, &HashSet::new());
        builder.response(StatusCode::INTERNAL_SERVER_ERROR, String::new());
        builder.failure("db timeout".to_string(), Some("0: db timeout\n".to_string()));
        let record = builder.finish();

        assert!(record.is_failure());
        assert_eq!(record.status_code, 500);
        assert_eq!(record.exception_message.as_deref(), Some("db timeout"));
    }

    #[test]
    fn test_cancelled_overrides_partial_state() {
        let req = request("POST", "/api/cart", &[]);
        let mut builder = RecordBuilder::begin("p", &req, &HashSet::new());
        builder.request_body("{}".to_string());
        builder.cancelled();
        let record = builder.finish();

        assert_eq!(record.status_code, CANCELLED_STATUS);
        assert_eq!(record.raw_request, "{}");
        assert_eq!(record.exception_message.as_deref(), Some(CANCELLED_MESSAGE));
    }

    #[test]
    fn test_payload_envelope() {
        let req = request("GET", "/", &[]);
        let record = RecordBuilder::begin("p", &req, &HashSet::new()).finish();

        let wrapped = record.to_payload(Some("log")).unwrap();
        assert_eq!(wrapped["log"]["project_id"], "p");
        assert_eq!(wrapped.as_object().unwrap().len(), 1);

        let flat = record.to_payload(None).unwrap();
        assert_eq!(flat["project_id"], json!("p"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_header_values_join_in_order(
            values in prop::collection::vec("[a-zA-Z0-9=;/ ]{1,12}", 1..5),
        ) {
            let mut headers = HeaderMap::new();
            for value in &values {
                headers.append("x-multi", value.trim().parse().unwrap());
            }
            let flat = serialize_headers(&headers, &HashSet::new());
            let expected = values.iter().map(|v| v.trim()).collect::<Vec<_>>().join(", ");
            prop_assert_eq!(&flat["x-multi"], &expected);
        }
    }
}
