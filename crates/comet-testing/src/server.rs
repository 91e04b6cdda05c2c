use super::expectation::{Expectation, MockResponse, Times};
use super::matcher::RequestMatcher;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;

type GenericError = Box<dyn std::error::Error + Send + Sync>;

/// A local HTTP server that plays the part of a remote ingestion service
///
/// Every request is recorded, matched or not. Requests that no expectation
/// answers receive a 404.
pub struct MockServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

struct Shared {
    state: Mutex<ServerState>,
    arrivals: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Default)]
struct ServerState {
    expectations: Vec<Expectation>,
    received: Vec<RecordedRequest>,
    unmatched: Vec<RecordedRequest>,
}

/// A request as the mock server saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: http::Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: http::HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    /// The body parsed as JSON, if it is JSON
    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    /// A header value, if present and visible ASCII
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl MockServer {
    /// Start a server on a random local port
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    pub async fn start() -> Self {
        Self::try_start()
            .await
            .expect("failed to bind mock server to a local port")
    }

    /// Start a server on a random local port, reporting bind failures
    pub async fn try_start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let shared = Arc::new(Shared {
            state: Mutex::new(ServerState::default()),
            arrivals: Notify::new(),
        });
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let accept_shared = shared.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let (stream, _) = match accepted {
                            Ok(conn) => conn,
                            Err(err) => {
                                tracing::debug!(error = %err, "mock server accept failed");
                                continue;
                            }
                        };
                        let shared = accept_shared.clone();
                        tokio::spawn(async move {
                            let service = service_fn(move |req| handle_request(req, shared.clone()));
                            if let Err(err) = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                                .serve_connection(TokioIo::new(stream), service)
                                .await
                            {
                                tracing::debug!(error = %err, "mock server connection closed with error");
                            }
                        });
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        Ok(Self {
            addr,
            shared,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Base URL, e.g. `http://127.0.0.1:49152`
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Absolute URL for `path` on this server
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    /// Every request received so far, in arrival order
    pub fn received_requests(&self) -> Vec<RecordedRequest> {
        self.shared.lock().received.clone()
    }

    /// Requests that no expectation answered
    pub fn unmatched_requests(&self) -> Vec<RecordedRequest> {
        self.shared.lock().unmatched.clone()
    }

    /// Wait until at least `count` requests have arrived or `timeout` passes
    ///
    /// Returns whatever has been received by then; callers assert on the length.
    pub async fn wait_for_requests(&self, count: usize, timeout: Duration) -> Vec<RecordedRequest> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.shared.arrivals.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let received = self.received_requests();
            if received.len() >= count {
                return received;
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.received_requests();
            }
        }
    }

    /// Register an expectation; it takes effect when the builder is dropped
    ///
    /// Later expectations take priority over earlier ones matching the same request.
    pub fn expect(&self, matcher: RequestMatcher) -> ExpectationBuilder {
        ExpectationBuilder {
            shared: self.shared.clone(),
            expectation: Some(Expectation::new(matcher)),
        }
    }

    /// Assert that every expectation saw the number of calls it asked for
    ///
    /// # Panics
    ///
    /// Panics listing every unmet expectation.
    pub fn verify(&self) {
        let state = self.shared.lock();
        let failures: Vec<String> = state
            .expectations
            .iter()
            .filter_map(Expectation::violation)
            .collect();

        assert!(failures.is_empty(), "unmet expectations:\n{}", failures.join("\n"));
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Configures an expectation before it is registered
pub struct ExpectationBuilder {
    shared: Arc<Shared>,
    expectation: Option<Expectation>,
}

impl ExpectationBuilder {
    fn update(mut self, f: impl FnOnce(Expectation) -> Expectation) -> Self {
        self.expectation = self.expectation.take().map(f);
        self
    }

    pub fn respond_with(self, response: MockResponse) -> Self {
        self.update(|exp| exp.respond_with(response))
    }

    pub fn times(self, n: usize) -> Self {
        self.update(|exp| exp.times(Times::Exactly(n)))
    }

    pub fn once(self) -> Self {
        self.update(|exp| exp.times(Times::Once))
    }

    pub fn at_least_once(self) -> Self {
        self.update(|exp| exp.times(Times::AtLeast(1)))
    }

    pub fn never(self) -> Self {
        self.update(|exp| exp.times(Times::Exactly(0)))
    }
}

impl Drop for ExpectationBuilder {
    fn drop(&mut self) {
        if let Some(exp) = self.expectation.take() {
            self.shared.lock().expectations.push(exp);
        }
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    shared: Arc<Shared>,
) -> Result<Response<Full<Bytes>>, GenericError> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();

    let recorded = RecordedRequest {
        method: parts.method,
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body,
    };

    let answer = {
        let mut state = shared.lock();
        state.received.push(recorded.clone());

        let answer = state
            .expectations
            .iter_mut()
            .rev()
            .find(|exp| exp.matcher.matches(&recorded))
            .map(|exp| {
                exp.call_count += 1;
                exp.response.clone()
            });

        if answer.is_none() {
            state.unmatched.push(recorded.clone());
        }
        answer
    };
    shared.arrivals.notify_waiters();

    tracing::debug!(
        method = %recorded.method,
        path = %recorded.path,
        matched = answer.is_some(),
        "mock server received request"
    );

    let Some(answer) = answer else {
        return Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from_static(b"No expectation matched")))?);
    };

    if let Some(delay) = answer.delay {
        tokio::time::sleep(delay).await;
    }

    let mut response = Response::builder().status(answer.status);
    for (name, value) in &answer.headers {
        response = response.header(name, value);
    }
    Ok(response.body(Full::new(answer.body))?)
}
