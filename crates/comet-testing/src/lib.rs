//! Test support for Comet
//!
//! # Mock ingestion endpoint
//!
//! [`MockServer`] stands in for the remote telemetry service. It answers
//! according to registered expectations and records every request it
//! receives, so tests can assert on the exact payloads a forwarder posted.
//!
//! ```rust,ignore
//! let ingest = MockServer::start().await;
//! ingest
//!     .expect(RequestMatcher::new().method(Method::POST).path("/ingest"))
//!     .respond_with(MockResponse::new().status(StatusCode::ACCEPTED));
//!
//! // ... drive the code under test ...
//!
//! let posted = ingest.wait_for_requests(1, Duration::from_secs(2)).await;
//! assert_eq!(posted[0].json().unwrap()["log"]["status_code"], 200);
//! ingest.verify();
//! ```

pub mod expectation;
pub mod matcher;
pub mod server;

pub use expectation::{Expectation, MockResponse, Times};
pub use matcher::RequestMatcher;
pub use server::{ExpectationBuilder, MockServer, RecordedRequest};
