//! # Comet Core
//!
//! The pipeline contract the capture middleware is inserted into.
//!
//! Everything the middleware needs from the surrounding application is
//! expressed here: a [`Request`] whose body can be buffered and read again,
//! a [`Response`] whose body may stream, a [`PipelineError`] for failures
//! raised by a downstream stage, and a [`MiddlewareLayer`] chain that hands
//! each layer a [`BoxedNext`] to invoke the rest of the pipeline.
//!
//! The crate also ships a small hyper-based [`Server`] so a pipeline can be
//! served directly; routing, persistence and rendering are left to the
//! handler.

pub mod body;
mod error;
mod handler;
pub mod middleware;
mod request;
mod response;
mod server;
mod service;

// Public API
pub use body::{Body, BoxError};
pub use error::{panic_message, BodyError, PipelineError, Result};
pub use handler::handler_fn;
pub use middleware::{BoxFuture, BoxedNext, HandlerResult, LayerStack, MiddlewareLayer};
pub use request::Request;
pub use response::{IntoResponse, Json, Response};
pub use server::Server;
pub use service::Pipeline;
