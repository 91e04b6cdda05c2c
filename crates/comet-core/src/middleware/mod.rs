//! Middleware infrastructure for Comet
//!
//! A middleware receives the request together with a [`BoxedNext`] that
//! invokes the rest of the pipeline. The next stage may fail with a
//! [`PipelineError`](crate::PipelineError); a middleware decides whether
//! to handle that failure or hand it further up.
//!
//! # Example
//!
//! ```rust,ignore
//! use comet_core::{handler_fn, Pipeline};
//!
//! let pipeline = Pipeline::new(handler_fn(storefront)).layer(capture_layer);
//! ```

mod layer;

pub use layer::{BoxFuture, BoxedNext, HandlerResult, LayerStack, MiddlewareLayer};
