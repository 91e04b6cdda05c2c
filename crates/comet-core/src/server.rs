//! Serving a [`Pipeline`](crate::Pipeline) over hyper HTTP/1 connections.

use crate::error::panic_message;
use crate::response::Response;
use crate::service::Pipeline;
use futures_util::FutureExt;
use http::StatusCode;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tracing::{debug, error, info, warn};

/// Serves a [`Pipeline`] over HTTP/1.
///
/// Failures nothing inside the pipeline handled become error responses
/// here: a [`PipelineError`](crate::PipelineError) is rendered with its
/// status (500 if unset), and a panic becomes a plain 500.
pub struct Server {
    pipeline: Pipeline,
}

impl Server {
    /// Create a server for the given pipeline
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    /// Bind `addr` and serve until the process exits
    pub async fn run(self, addr: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.run_until(addr, std::future::pending()).await
    }

    /// Bind `addr` and serve until `shutdown` resolves
    pub async fn run_until(
        self,
        addr: &str,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(addr.parse::<SocketAddr>()?).await?;
        self.serve(listener, shutdown).await?;
        Ok(())
    }

    /// Accept connections on an already bound listener until `shutdown` resolves
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> std::io::Result<()> {
        info!("Comet server running on http://{}", listener.local_addr()?);

        tokio::pin!(shutdown);
        loop {
            let (stream, remote_addr) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = &mut shutdown => {
                    info!("Shutdown signal received, no longer accepting connections");
                    return Ok(());
                }
            };

            let io = TokioIo::new(stream);
            let pipeline = self.pipeline.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: hyper::Request<Incoming>| {
                    let pipeline = pipeline.clone();
                    async move { Ok::<_, Infallible>(respond(pipeline, req).await) }
                });

                let connection = http1::Builder::new().serve_connection(io, service);
                if let Err(err) = connection.await {
                    debug!(%remote_addr, error = %err, "Connection closed with error");
                }
            });
        }
    }
}

/// Run one request through the pipeline and turn any escaped failure into a response
async fn respond(pipeline: Pipeline, req: hyper::Request<Incoming>) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let started = Instant::now();

    let response = match AssertUnwindSafe(pipeline.oneshot(req)).catch_unwind().await {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => {
            error!(%method, %path, error = %err, "Unhandled pipeline error");
            err.into_response()
        }
        Err(panic) => {
            error!(%method, %path, panic = %panic_message(panic.as_ref()), "Pipeline panicked");
            let mut response = Response::new(crate::body::empty());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    };

    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if response.status().is_server_error() {
        warn!(%method, %path, status, elapsed_ms, "Request failed");
    } else {
        info!(%method, %path, status, elapsed_ms, "Request served");
    }
    response
}
