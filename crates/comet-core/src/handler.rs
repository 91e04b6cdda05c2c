//! Adapting plain async functions into the final pipeline stage.

use crate::error::PipelineError;
use crate::middleware::{BoxFuture, BoxedNext, HandlerResult};
use crate::request::Request;
use crate::response::IntoResponse;
use std::future::Future;
use std::sync::Arc;

/// Turn an async function into the innermost stage of a pipeline.
///
/// ```rust,ignore
/// async fn products(_req: Request) -> Result<Json<Catalog>, PipelineError> {
///     Ok(Json(Catalog::default()))
/// }
///
/// let handler = handler_fn(products);
/// ```
pub fn handler_fn<F, Fut, R>(f: F) -> BoxedNext
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, PipelineError>> + Send + 'static,
    R: IntoResponse,
{
    Arc::new(move |req: Request| {
        let fut = f(req);
        Box::pin(async move { fut.await.map(IntoResponse::into_response) }) as BoxFuture<HandlerResult>
    })
}
