//! CaptureLayer middleware: the orchestrator tying filter, capture, record and
//! forwarder together.

use crate::capture::{capture_request, capture_response};
use crate::config::{CaptureConfig, ConfigError};
use crate::forward::{Forwarder, HttpSink, RecordSink};
use crate::lifecycle::{CapturePhase, Lifecycle};
use crate::record::RecordBuilder;
use comet_core::middleware::{BoxFuture, BoxedNext, HandlerResult, MiddlewareLayer};
use comet_core::{panic_message, Request};
use futures_util::FutureExt;
use http::StatusCode;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::debug;

/// Request/response capture middleware layer.
///
/// For every request that is not a static asset, captures the request and
/// response bodies without altering either, and forwards one
/// [`TelemetryRecord`](crate::TelemetryRecord) describing the exchange. A
/// failure raised downstream is recorded and then returned unchanged; a
/// panic is recorded and then resumed.
///
/// # Example
///
/// ```ignore
/// use comet_capture::{CaptureConfig, CaptureLayer};
/// use comet_core::{handler_fn, Pipeline};
///
/// let capture = CaptureLayer::new(CaptureConfig::from_env()?)?;
/// let pipeline = Pipeline::new(handler_fn(storefront)).layer(capture);
/// ```
#[derive(Clone)]
pub struct CaptureLayer {
    config: Arc<CaptureConfig>,
    forwarder: Forwarder,
}

impl CaptureLayer {
    /// Validate `config` and forward to its HTTP endpoint.
    pub fn new(config: CaptureConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let sink = HttpSink::new(&config)?;
        Ok(Self::with_shared_sink(config, Arc::new(sink)))
    }

    /// Forward to a custom sink instead of the configured endpoint.
    ///
    /// The endpoint and credential in `config` are not used or validated.
    pub fn with_sink<S: RecordSink>(config: CaptureConfig, sink: S) -> Self {
        Self::with_shared_sink(config, Arc::new(sink))
    }

    /// Forward to a sink shared with other owners.
    pub fn with_shared_sink(config: CaptureConfig, sink: Arc<dyn RecordSink>) -> Self {
        let forwarder = Forwarder::new(sink, config.delivery_mode);
        Self {
            config: Arc::new(config),
            forwarder,
        }
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}

/// The record of a request whose downstream stage has not finished.
///
/// Forwarded exactly once: explicitly through [`forward`](Self::forward), or
/// as a cancelled record if the request future is dropped first.
struct InFlightRecord {
    builder: Option<RecordBuilder>,
    forwarder: Forwarder,
}

impl InFlightRecord {
    fn new(builder: RecordBuilder, forwarder: Forwarder) -> Self {
        Self {
            builder: Some(builder),
            forwarder,
        }
    }

    fn with(&mut self, f: impl FnOnce(&mut RecordBuilder)) {
        if let Some(builder) = self.builder.as_mut() {
            f(builder);
        }
    }

    async fn forward(mut self) {
        if let Some(builder) = self.builder.take() {
            self.forwarder.forward(builder.finish()).await;
        }
    }
}

impl Drop for InFlightRecord {
    fn drop(&mut self) {
        if let Some(mut builder) = self.builder.take() {
            builder.cancelled();
            let record = builder.finish();
            debug!(
                method = %record.method,
                path = %record.path,
                "Request dropped mid-flight, forwarding cancelled record"
            );
            self.forwarder.forward_detached(record);
        }
    }
}

impl MiddlewareLayer for CaptureLayer {
    fn call(&self, mut req: Request, next: BoxedNext) -> BoxFuture<HandlerResult> {
        let config = self.config.clone();
        let forwarder = self.forwarder.clone();

        Box::pin(async move {
            let mut lifecycle = Lifecycle::new();
            lifecycle.step(CapturePhase::FilterCheck);

            if !config.should_capture(req.path()) {
                lifecycle.step(CapturePhase::Bypass);
                debug!(path = %req.path(), "Static asset, capture bypassed");
                lifecycle.step(CapturePhase::InvokingNext);
                let result = next(req).await;
                lifecycle.step(CapturePhase::Done);
                return result;
            }

            lifecycle.step(CapturePhase::Capturing);
            let builder = RecordBuilder::begin(&config.project_id, &req, &config.redacted_headers);
            let mut in_flight = InFlightRecord::new(builder, forwarder);

            let request_text = capture_request(&mut req, config.max_body_size).await;
            in_flight.with(|record| record.request_body(request_text));

            lifecycle.step(CapturePhase::InvokingNext);
            let outcome = AssertUnwindSafe(next(req)).catch_unwind().await;

            match outcome {
                Ok(Ok(response)) => {
                    let status = response.status();
                    let drained =
                        AssertUnwindSafe(capture_response(response, config.max_body_size))
                            .catch_unwind()
                            .await;

                    let captured = match drained {
                        Ok(captured) => captured,
                        Err(panic) => {
                            lifecycle.step(CapturePhase::Faulted);
                            let message = panic_message(panic.as_ref());
                            debug!(panic = %message, "Response body panicked while being drained");

                            lifecycle.step(CapturePhase::FinalizingResponse);
                            in_flight.with(|record| {
                                record.response(StatusCode::INTERNAL_SERVER_ERROR, String::new());
                                record.failure(message, None);
                            });

                            lifecycle.step(CapturePhase::Forwarding);
                            in_flight.forward().await;
                            lifecycle.step(CapturePhase::Done);
                            std::panic::resume_unwind(panic)
                        }
                    };

                    // the client keeps the committed status; only the record is normalized
                    let status = match &captured.failure {
                        Some(message) => {
                            lifecycle.step(CapturePhase::Faulted);
                            debug!(error = %message, "Response body failed part way");
                            if status == StatusCode::OK {
                                StatusCode::INTERNAL_SERVER_ERROR
                            } else {
                                status
                            }
                        }
                        None => {
                            lifecycle.step(CapturePhase::Completed);
                            status
                        }
                    };
                    lifecycle.step(CapturePhase::FinalizingResponse);
                    in_flight.with(|record| {
                        record.response(status, captured.text);
                        if let Some(message) = captured.failure {
                            record.failure(message, None);
                        }
                    });

                    lifecycle.step(CapturePhase::Forwarding);
                    in_flight.forward().await;
                    lifecycle.step(CapturePhase::Done);
                    Ok(captured.response)
                }
                Ok(Err(mut err)) => {
                    lifecycle.step(CapturePhase::Faulted);
                    let status = err.normalize_status();
                    debug!(status = status.as_u16(), error = %err, "Downstream stage failed");

                    lifecycle.step(CapturePhase::FinalizingResponse);
                    in_flight.with(|record| {
                        record.response(status, String::new());
                        record.failure(err.message(), Some(err.trace()));
                    });

                    lifecycle.step(CapturePhase::Forwarding);
                    in_flight.forward().await;
                    lifecycle.step(CapturePhase::Done);
                    Err(err)
                }
                Err(panic) => {
                    lifecycle.step(CapturePhase::Faulted);
                    let message = panic_message(panic.as_ref());
                    debug!(panic = %message, "Downstream stage panicked");

                    lifecycle.step(CapturePhase::FinalizingResponse);
                    in_flight.with(|record| {
                        record.response(StatusCode::INTERNAL_SERVER_ERROR, String::new());
                        record.failure(message, None);
                    });

                    lifecycle.step(CapturePhase::Forwarding);
                    in_flight.forward().await;
                    lifecycle.step(CapturePhase::Done);
                    std::panic::resume_unwind(panic)
                }
            }
        })
    }

    fn clone_box(&self) -> Box<dyn MiddlewareLayer> {
        Box::new(self.clone())
    }
}
