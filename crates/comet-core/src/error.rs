//! Error types for Comet

use crate::body::{self, BoxError};
use crate::response::Response;
use http::{header, StatusCode};
use serde::Serialize;
use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error as StdError;
use std::fmt::{self, Write as _};

/// Result type alias for pipeline stages
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// A failure raised by a pipeline stage.
///
/// The wrapped error is kept exactly as the stage produced it, so layers
/// further up can still downcast it or render it. Alongside it travels the
/// response status the stage had committed before failing (if any) and a
/// backtrace captured when the error entered the pipeline (subject to
/// `RUST_BACKTRACE`).
#[derive(Debug)]
pub struct PipelineError {
    source: BoxError,
    status: Option<StatusCode>,
    backtrace: Backtrace,
}

impl PipelineError {
    /// Wrap an error raised by a stage
    pub fn new(error: impl Into<BoxError>) -> Self {
        Self {
            source: error.into(),
            status: None,
            backtrace: Backtrace::capture(),
        }
    }

    /// Create an error from a plain message
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(message.into())
    }

    /// Record the status the stage had already set on its response
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// The committed response status, if the stage set one
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Settle the status a client will observe for this failure.
    ///
    /// An unset status, or the default `200 OK`, becomes
    /// `500 Internal Server Error`; any other status is kept.
    pub fn normalize_status(&mut self) -> StatusCode {
        let status = match self.status {
            Some(status) if status != StatusCode::OK => status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        self.status = Some(status);
        status
    }

    /// The original error's message
    pub fn message(&self) -> String {
        self.source.to_string()
    }

    /// The error's source chain, followed by the backtrace when one was captured
    pub fn trace(&self) -> String {
        let mut trace = String::new();
        let root: &(dyn StdError + 'static) = self.source.as_ref();
        let mut current = Some(root);
        let mut depth = 0usize;
        while let Some(err) = current {
            let _ = writeln!(trace, "{depth}: {err}");
            current = err.source();
            depth += 1;
        }
        if self.backtrace.status() == BacktraceStatus::Captured {
            let _ = write!(trace, "\n{}", self.backtrace);
        }
        trace
    }

    /// Downcast the original error to a concrete type
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.source.downcast_ref::<E>()
    }

    /// Unwrap the original error
    pub fn into_inner(self) -> BoxError {
        self.source
    }

    /// Render this failure for a client that no layer handled it for.
    ///
    /// Server errors hide the message; client errors carry it.
    pub fn into_response(self) -> Response {
        let status = self.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = if status.is_server_error() {
            status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string()
        } else {
            self.message()
        };
        let payload = ErrorResponse {
            error: ErrorBody {
                error_type: error_type_for(status),
                message,
            },
        };
        let bytes = serde_json::to_vec(&payload).unwrap_or_default();

        let mut response = Response::new(body::full(bytes));
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        response
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.source, f)
    }
}

impl StdError for PipelineError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.source()
    }
}

impl From<BodyError> for PipelineError {
    fn from(err: BodyError) -> Self {
        let status = match err {
            BodyError::Read(_) => StatusCode::BAD_REQUEST,
            BodyError::Consumed => StatusCode::INTERNAL_SERVER_ERROR,
        };
        PipelineError::new(err).with_status(status)
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::new(err).with_status(StatusCode::BAD_REQUEST)
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::new(err)
    }
}

/// Failure to read a request body
#[derive(Debug, Clone, thiserror::Error)]
pub enum BodyError {
    /// The transport failed while the body was being read
    #[error("failed to read request body: {0}")]
    Read(String),

    /// The body was already handed to another reader
    #[error("request body already consumed")]
    Consumed,
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

fn error_type_for(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "bad_request",
        StatusCode::UNAUTHORIZED => "unauthorized",
        StatusCode::FORBIDDEN => "forbidden",
        StatusCode::NOT_FOUND => "not_found",
        StatusCode::CONFLICT => "conflict",
        StatusCode::SERVICE_UNAVAILABLE => "service_unavailable",
        s if s.is_client_error() => "client_error",
        _ => "internal_error",
    }
}

/// JSON representation of an unhandled pipeline error
#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    error_type: &'static str,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[derive(Debug, thiserror::Error)]
    #[error("db timeout")]
    struct DbTimeout {
        #[source]
        cause: std::io::Error,
    }

    #[test]
    fn test_unset_status_normalizes_to_500() {
        let mut err = PipelineError::msg("boom");
        assert_eq!(err.status(), None);
        assert_eq!(err.normalize_status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn test_default_ok_status_normalizes_to_500() {
        let mut err = PipelineError::msg("boom").with_status(StatusCode::OK);
        assert_eq!(err.normalize_status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_committed_status_is_preserved() {
        let mut err = PipelineError::msg("conflict").with_status(StatusCode::CONFLICT);
        assert_eq!(err.normalize_status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_original_error_is_untouched() {
        let cause = std::io::Error::new(std::io::ErrorKind::TimedOut, "socket timed out");
        let err = PipelineError::new(DbTimeout { cause });

        assert_eq!(err.message(), "db timeout");
        assert!(err.downcast_ref::<DbTimeout>().is_some());
        assert_eq!(err.to_string(), "db timeout");
        assert_eq!(err.source().unwrap().to_string(), "socket timed out");
    }

    #[test]
    fn test_trace_lists_source_chain() {
        let cause = std::io::Error::new(std::io::ErrorKind::TimedOut, "socket timed out");
        let err = PipelineError::new(DbTimeout { cause });
        let trace = err.trace();

        assert!(trace.starts_with("0: db timeout\n1: socket timed out\n"));
    }

    #[tokio::test]
    async fn test_server_error_response_hides_message() {
        let response = PipelineError::msg("secret detail").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["type"], "internal_error");
        assert_eq!(body["error"]["message"], "Internal Server Error");
    }

    #[tokio::test]
    async fn test_client_error_response_carries_message() {
        let response = PipelineError::msg("sku missing")
            .with_status(StatusCode::NOT_FOUND)
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["type"], "not_found");
        assert_eq!(body["error"]["message"], "sku missing");
    }

    #[test]
    fn test_panic_message_payloads() {
        let static_str: Box<dyn Any + Send> = Box::new("static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(7u8);

        assert_eq!(panic_message(static_str.as_ref()), "static");
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(other.as_ref()), "Box<dyn Any>");
    }
}
