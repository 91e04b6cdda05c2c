//! Body types shared by requests and responses.
//!
//! Both directions use the same boxed body so a stage may stream, buffer or
//! replay without changing the types that flow through the chain.

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Body as HttpBody;

/// Boxed error type used by bodies and by failures raised inside the pipeline.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A type-erased, possibly streaming body of `Bytes` chunks.
pub type Body = UnsyncBoxBody<Bytes, BoxError>;

/// A body holding the given bytes in a single frame.
pub fn full(data: impl Into<Bytes>) -> Body {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// A body with no data.
pub fn empty() -> Body {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Erase the concrete type of any `Bytes` body.
pub fn boxed<B>(body: B) -> Body
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed_unsync()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_body_yields_its_bytes() {
        let collected = full("hello").collect().await.unwrap().to_bytes();
        assert_eq!(collected, Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_empty_body_is_end_of_stream() {
        let body = empty();
        assert!(body.is_end_stream());
        assert!(body.collect().await.unwrap().to_bytes().is_empty());
    }
}
