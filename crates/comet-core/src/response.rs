//! Response types for Comet
//!
//! The core trait is [`IntoResponse`], which lets a handler return plain
//! values and have them turned into an HTTP response.
//!
//! | Type | Status | Content-Type |
//! |------|--------|--------------|
//! | `&'static str` / `String` | 200 | text/plain |
//! | `Bytes` | 200 | application/octet-stream |
//! | `()` | 200 | - |
//! | `StatusCode` | given | - |
//! | [`Json<T>`] | 200 | application/json |
//! | `(StatusCode, R)` | given | from `R` |

use crate::body::{self, Body};
use crate::error::PipelineError;
use bytes::Bytes;
use http::{header, HeaderValue, StatusCode};
use serde::Serialize;

/// HTTP Response type
///
/// The body may stream; middleware that needs the bytes drains it and
/// hands on a replay.
pub type Response = http::Response<Body>;

/// Trait for types that can be converted into an HTTP response
pub trait IntoResponse {
    /// Convert self into a Response
    fn into_response(self) -> Response;
}

fn with_content_type(body: Body, content_type: &'static str) -> Response {
    let mut response = Response::new(body);
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

impl IntoResponse for Response {
    fn into_response(self) -> Response {
        self
    }
}

impl IntoResponse for () {
    fn into_response(self) -> Response {
        Response::new(body::empty())
    }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response {
        with_content_type(body::full(self), "text/plain; charset=utf-8")
    }
}

impl IntoResponse for String {
    fn into_response(self) -> Response {
        with_content_type(body::full(self), "text/plain; charset=utf-8")
    }
}

impl IntoResponse for Bytes {
    fn into_response(self) -> Response {
        with_content_type(body::full(self), "application/octet-stream")
    }
}

impl IntoResponse for StatusCode {
    fn into_response(self) -> Response {
        let mut response = Response::new(body::empty());
        *response.status_mut() = self;
        response
    }
}

impl<R: IntoResponse> IntoResponse for (StatusCode, R) {
    fn into_response(self) -> Response {
        let mut response = self.1.into_response();
        *response.status_mut() = self.0;
        response
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        PipelineError::into_response(self)
    }
}

/// JSON response body
///
/// Serialization failures turn into a `500` with an empty body.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(bytes) => with_content_type(body::full(bytes), "application/json"),
            Err(err) => {
                tracing::error!(error = %err, "Failed to serialize JSON response");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::json;

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_str_response() {
        let response = "hello".into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_text(response).await, "hello");
    }

    #[tokio::test]
    async fn test_json_response() {
        let response = Json(json!({"items": []})).into_response();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(body_text(response).await, r#"{"items":[]}"#);
    }

    #[tokio::test]
    async fn test_status_tuple_overrides_status() {
        let response = (StatusCode::CREATED, String::from("made")).into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_text(response).await, "made");
    }

    #[test]
    fn test_status_code_response() {
        let response = StatusCode::NO_CONTENT.into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
