//! # Comet Capture
//!
//! Middleware that records every request passing through a Comet pipeline
//! and forwards one structured telemetry record per request to an external
//! ingestion endpoint.
//!
//! Capture is transparent: the downstream stage reads the request body as it
//! arrived, the client receives exactly the bytes the downstream stage
//! produced, and a failure raised downstream still reaches the caller
//! unchanged after it has been recorded. Forwarding is best effort, so an
//! unreachable ingestion endpoint is logged and otherwise ignored.
//!
//! Static assets (scripts, stylesheets, images, icons, fonts) are skipped
//! unless `send_all_traffic` is enabled.
//!
//! ## Example
//!
//! ```rust,ignore
//! use comet_capture::{CaptureConfig, CaptureLayer};
//! use comet_core::{handler_fn, Pipeline, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let capture = CaptureLayer::new(CaptureConfig::from_env()?)?;
//!     let pipeline = Pipeline::new(handler_fn(storefront)).layer(capture);
//!     Server::new(pipeline).run("127.0.0.1:8080").await
//! }
//! ```

pub mod capture;
pub mod config;
pub mod filter;
pub mod forward;
mod layer;
pub mod lifecycle;
pub mod record;
pub mod settings;

pub use config::{CaptureConfig, ConfigError, CredentialStyle};
pub use filter::StaticAssetFilter;
pub use forward::{DeliveryMode, ForwardError, Forwarder, HttpSink, MemorySink, RecordSink};
pub use layer::CaptureLayer;
pub use lifecycle::{CapturePhase, InvalidTransition, Lifecycle};
pub use record::{RecordBuilder, TelemetryRecord};
pub use settings::{load_dotenv, CaptureSettings};
