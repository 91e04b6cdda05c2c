//! The middleware trait and the ordered stack of layers around a handler.

use crate::error::PipelineError;
use crate::request::Request;
use crate::response::Response;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed, sendable future
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// What a pipeline stage produces: a response, or the failure it raised
pub type HandlerResult = Result<Response, PipelineError>;

/// Invokes the remainder of the pipeline
pub type BoxedNext = Arc<dyn Fn(Request) -> BoxFuture<HandlerResult> + Send + Sync>;

/// A stage wrapped around the rest of the pipeline.
///
/// `call` receives the request and a [`BoxedNext`] for everything behind this
/// layer. A layer may call `next` once, skip it and answer itself, or observe
/// the [`PipelineError`] it returns before passing it on.
pub trait MiddlewareLayer: Send + Sync + 'static {
    fn call(&self, req: Request, next: BoxedNext) -> BoxFuture<HandlerResult>;

    /// Clone into a trait object so stacks can be cloned
    fn clone_box(&self) -> Box<dyn MiddlewareLayer>;
}

impl Clone for Box<dyn MiddlewareLayer> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Layers in outermost-first order
#[derive(Clone, Default)]
pub struct LayerStack {
    layers: Vec<Arc<dyn MiddlewareLayer>>,
}

impl LayerStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer inside the ones already present
    pub fn push(&mut self, layer: Box<dyn MiddlewareLayer>) {
        self.layers.push(Arc::from(layer));
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Run `req` through every layer and finally `handler`
    pub fn execute(&self, req: Request, handler: BoxedNext) -> BoxFuture<HandlerResult> {
        let chain = self.layers.iter().rev().fold(handler, |inner, layer| {
            let layer = Arc::clone(layer);
            Arc::new(move |req: Request| layer.call(req, inner.clone())) as BoxedNext
        });
        chain(req)
    }
}
