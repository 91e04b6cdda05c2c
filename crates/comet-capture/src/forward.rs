//! Shipping finished records to the ingestion endpoint.
//!
//! Delivery is best effort and at most once: a record gets a single attempt,
//! and every failure is logged and dropped. Nothing here can fail or delay
//! the client response beyond the configured timeout.

use crate::config::{CaptureConfig, ConfigError, CredentialStyle};
use crate::record::TelemetryRecord;
use async_trait::async_trait;
use comet_core::panic_message;
use futures_util::FutureExt;
use http::header::{HeaderName, HeaderValue, AUTHORIZATION};
use http::StatusCode;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Error type for a failed delivery.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// The record could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The endpoint did not answer in time.
    #[error("Ingestion request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection, DNS or protocol failure.
    #[error("Transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("Ingestion endpoint rejected the record with status {status}")]
    Rejected { status: StatusCode, body: String },
}

/// Destination for finished records.
///
/// Implement this trait to send records somewhere other than an HTTP endpoint.
#[async_trait]
pub trait RecordSink: Send + Sync + 'static {
    /// Deliver one record
    async fn send(&self, record: &TelemetryRecord) -> Result<(), ForwardError>;
}

/// Posts records as JSON to the configured ingestion endpoint.
///
/// The underlying client is built once and shared by every request; clones
/// share its connection pool.
#[derive(Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
    credential: (HeaderName, HeaderValue),
    envelope: Option<String>,
    timeout: Duration,
}

impl HttpSink {
    /// Build a sink with its own client
    pub fn new(config: &CaptureConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Self::with_client(client, config)
    }

    /// Build a sink on an existing client
    pub fn with_client(client: reqwest::Client, config: &CaptureConfig) -> Result<Self, ConfigError> {
        let mut credential = match &config.credential_style {
            CredentialStyle::Bearer => (
                AUTHORIZATION,
                HeaderValue::try_from(format!("Bearer {}", config.api_key))
                    .map_err(|_| ConfigError::InvalidApiKey)?,
            ),
            CredentialStyle::Header(name) => (
                HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_| ConfigError::InvalidHeaderName(name.clone()))?,
                HeaderValue::try_from(config.api_key.as_str())
                    .map_err(|_| ConfigError::InvalidApiKey)?,
            ),
        };
        credential.1.set_sensitive(true);

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            credential,
            envelope: config.envelope.clone(),
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl RecordSink for HttpSink {
    async fn send(&self, record: &TelemetryRecord) -> Result<(), ForwardError> {
        let payload = record.to_payload(self.envelope.as_deref())?;
        let (name, value) = &self.credential;

        let response = self
            .client
            .post(&self.endpoint)
            .header(name.clone(), value.clone())
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ForwardError::Timeout(self.timeout)
                } else {
                    ForwardError::Transport(err)
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ForwardError::Rejected { status, body })
    }
}

/// Keeps records in memory.
///
/// Handy for tests and for hosts that drain records themselves.
#[derive(Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<TelemetryRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records received so far
    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn send(&self, record: &TelemetryRecord) -> Result<(), ForwardError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

/// When the forwarding attempt runs relative to the response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Await delivery before the layer returns; request latency includes the send
    #[default]
    Inline,
    /// Spawn delivery on the runtime and return immediately
    Detached,
}

/// Hands records to a [`RecordSink`] and absorbs every failure.
#[derive(Clone)]
pub struct Forwarder {
    sink: Arc<dyn RecordSink>,
    mode: DeliveryMode,
}

impl Forwarder {
    pub fn new(sink: Arc<dyn RecordSink>, mode: DeliveryMode) -> Self {
        Self { sink, mode }
    }

    /// Make the single delivery attempt for `record`. Never fails.
    pub async fn forward(&self, record: TelemetryRecord) {
        match self.mode {
            DeliveryMode::Inline => deliver(self.sink.clone(), record).await,
            DeliveryMode::Detached => self.forward_detached(record),
        }
    }

    /// Spawn the delivery attempt on the current runtime.
    ///
    /// Usable from synchronous code such as `Drop`. Without a runtime the
    /// record is dropped with a warning.
    pub fn forward_detached(&self, record: TelemetryRecord) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(deliver(self.sink.clone(), record));
            }
            Err(_) => warn!(
                method = %record.method,
                path = %record.path,
                "No async runtime available, telemetry record dropped"
            ),
        }
    }
}

async fn deliver(sink: Arc<dyn RecordSink>, record: TelemetryRecord) {
    let outcome = AssertUnwindSafe(sink.send(&record)).catch_unwind().await;

    match outcome {
        Ok(Ok(())) => debug!(
            method = %record.method,
            path = %record.path,
            status = record.status_code,
            "Telemetry record forwarded"
        ),
        Ok(Err(err)) => warn!(
            method = %record.method,
            path = %record.path,
            error = %err,
            "Telemetry record could not be forwarded"
        ),
        Err(panic) => warn!(
            method = %record.method,
            path = %record.path,
            panic = %panic_message(panic.as_ref()),
            "Telemetry sink panicked"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordBuilder;
    use comet_core::Request;
    use std::collections::HashSet;

    fn record(path: &str) -> TelemetryRecord {
        let (parts, _) = http::Request::builder()
            .uri(path)
            .body(())
            .unwrap()
            .into_parts();
        RecordBuilder::begin("p", &Request::from_bytes(parts, ""), &HashSet::new()).finish()
    }

    struct PanickingSink;

    #[async_trait]
    impl RecordSink for PanickingSink {
        async fn send(&self, _record: &TelemetryRecord) -> Result<(), ForwardError> {
            panic!("sink exploded");
        }
    }

    struct RejectingSink;

    #[async_trait]
    impl RecordSink for RejectingSink {
        async fn send(&self, _record: &TelemetryRecord) -> Result<(), ForwardError> {
            Err(ForwardError::Rejected {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_inline_forward_delivers_before_returning() {
        let sink = MemorySink::new();
        let forwarder = Forwarder::new(Arc::new(sink.clone()), DeliveryMode::Inline);

        forwarder.forward(record("/api/products")).await;

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.records()[0].path, "/api/products");
    }

    #[tokio::test]
    async fn test_detached_forward_delivers_eventually() {
        let sink = MemorySink::new();
        let forwarder = Forwarder::new(Arc::new(sink.clone()), DeliveryMode::Detached);

        forwarder.forward(record("/api/products")).await;

        for _ in 0..100 {
            if !sink.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_sink_errors_are_absorbed() {
        let forwarder = Forwarder::new(Arc::new(RejectingSink), DeliveryMode::Inline);
        forwarder.forward(record("/")).await;
    }

    #[tokio::test]
    async fn test_sink_panics_are_absorbed() {
        let forwarder = Forwarder::new(Arc::new(PanickingSink), DeliveryMode::Inline);
        forwarder.forward(record("/")).await;
    }

    #[test]
    fn test_detached_without_runtime_drops_quietly() {
        let sink = MemorySink::new();
        let forwarder = Forwarder::new(Arc::new(sink.clone()), DeliveryMode::Detached);
        forwarder.forward_detached(record("/"));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_http_sink_credential_styles() {
        let config = CaptureConfig::new("key-123", "p", "https://ingest.example.com/logs");
        let sink = HttpSink::new(&config).unwrap();
        assert_eq!(sink.credential.0, AUTHORIZATION);
        assert_eq!(sink.credential.1, "Bearer key-123");
        assert!(sink.credential.1.is_sensitive());

        let config = config.credential_style(CredentialStyle::Header("x-api-key".into()));
        let sink = HttpSink::new(&config).unwrap();
        assert_eq!(sink.credential.0.as_str(), "x-api-key");
        assert_eq!(sink.credential.1, "key-123");
    }

    #[test]
    fn test_http_sink_rejects_unsendable_key() {
        let config = CaptureConfig::new("key\nwith newline", "p", "https://ingest.example.com/logs");
        assert!(matches!(HttpSink::new(&config), Err(ConfigError::InvalidApiKey)));
    }

    #[test]
    fn test_rejected_error_names_status() {
        let err = ForwardError::Rejected {
            status: StatusCode::UNAUTHORIZED,
            body: "bad key".into(),
        };
        assert_eq!(
            err.to_string(),
            "Ingestion endpoint rejected the record with status 401 Unauthorized"
        );
    }
}
