//! A complete pipeline (layers plus final handler) exposed as a tower `Service`.

use crate::body::BoxError;
use crate::error::PipelineError;
use crate::middleware::{BoxFuture, BoxedNext, HandlerResult, LayerStack, MiddlewareLayer};
use crate::request::Request;
use crate::response::Response;
use bytes::Bytes;
use hyper::body::Body as HttpBody;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

/// Middleware layers wrapped around a final handler
///
/// Cloning is cheap; all clones share the same layers and handler.
#[derive(Clone)]
pub struct Pipeline {
    layers: Arc<LayerStack>,
    handler: BoxedNext,
}

impl Pipeline {
    /// Create a pipeline with no layers around `handler`
    pub fn new(handler: BoxedNext) -> Self {
        Self {
            layers: Arc::new(LayerStack::new()),
            handler,
        }
    }

    /// Add a layer; the first layer added is the outermost
    pub fn layer<L: MiddlewareLayer>(mut self, layer: L) -> Self {
        Arc::make_mut(&mut self.layers).push(Box::new(layer));
        self
    }

    /// Number of layers around the handler
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Run one request through the layers and the handler
    pub fn dispatch(&self, req: Request) -> BoxFuture<HandlerResult> {
        self.layers.execute(req, self.handler.clone())
    }
}

impl<B> Service<http::Request<B>> for Pipeline
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    type Response = Response;
    type Error = PipelineError;
    type Future = BoxFuture<HandlerResult>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        self.dispatch(Request::from_http(req))
    }
}
