//! Request types for Comet

use crate::body::{self, Body, BoxError};
use crate::error::BodyError;
use bytes::Bytes;
use http::{request::Parts, Extensions, HeaderMap, Method, Uri};
use http_body_util::BodyExt;
use hyper::body::Body as HttpBody;

/// Where the request body currently lives.
enum RequestBody {
    /// Not read yet; can be consumed exactly once.
    Streaming(Body),
    /// Fully read into memory; every reader gets the same bytes.
    Buffered(Bytes),
    /// Reading the stream failed; later readers see the same failure.
    Failed(String),
    /// Handed out by [`Request::body_bytes`].
    Taken,
}

/// HTTP Request wrapper
///
/// The transport body is normally readable once. Calling
/// [`buffer_body`](Request::buffer_body) reads it into memory so that a
/// middleware can inspect it and the handler further down still receives
/// the full, unconsumed body.
pub struct Request {
    parts: Parts,
    body: RequestBody,
}

impl Request {
    /// Create a request from parts and a streaming body
    pub fn new(parts: Parts, body: Body) -> Self {
        Self {
            parts,
            body: RequestBody::Streaming(body),
        }
    }

    /// Create a request whose body is already in memory
    pub fn from_bytes(parts: Parts, body: impl Into<Bytes>) -> Self {
        Self {
            parts,
            body: RequestBody::Buffered(body.into()),
        }
    }

    /// Convert any `http::Request` with a `Bytes` body
    pub fn from_http<B>(req: http::Request<B>) -> Self
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        Self::new(parts, body::boxed(body))
    }

    /// Get the HTTP method
    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    /// Get the URI
    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    /// Get the headers
    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// Get mutable headers
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.parts.headers
    }

    /// Get request extensions
    pub fn extensions(&self) -> &Extensions {
        &self.parts.extensions
    }

    /// Get the request path
    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    /// Get the raw query string, without the leading `?`
    pub fn query_string(&self) -> Option<&str> {
        self.parts.uri.query()
    }

    /// Whether the body has been read into memory
    pub fn is_buffered(&self) -> bool {
        matches!(self.body, RequestBody::Buffered(_))
    }

    /// Read the whole body into memory and return a view of it.
    ///
    /// The body stays in the request: the next reader, including a later
    /// call to [`body_bytes`](Request::body_bytes), sees exactly the bytes
    /// that arrived. Calling this repeatedly returns the same bytes without
    /// touching the transport again.
    pub async fn buffer_body(&mut self) -> Result<Bytes, BodyError> {
        match std::mem::replace(&mut self.body, RequestBody::Taken) {
            RequestBody::Streaming(stream) => match stream.collect().await {
                Ok(collected) => {
                    let bytes = collected.to_bytes();
                    self.body = RequestBody::Buffered(bytes.clone());
                    Ok(bytes)
                }
                Err(err) => {
                    let message = err.to_string();
                    self.body = RequestBody::Failed(message.clone());
                    Err(BodyError::Read(message))
                }
            },
            RequestBody::Buffered(bytes) => {
                self.body = RequestBody::Buffered(bytes.clone());
                Ok(bytes)
            }
            RequestBody::Failed(message) => {
                self.body = RequestBody::Failed(message.clone());
                Err(BodyError::Read(message))
            }
            RequestBody::Taken => Err(BodyError::Consumed),
        }
    }

    /// Consume the body (can only succeed once)
    pub async fn body_bytes(&mut self) -> Result<Bytes, BodyError> {
        let bytes = self.buffer_body().await?;
        self.body = RequestBody::Taken;
        Ok(bytes)
    }

    /// Split into the request head and a body stream
    pub fn into_parts(self) -> (Parts, Body) {
        let body = match self.body {
            RequestBody::Streaming(stream) => stream,
            RequestBody::Buffered(bytes) => body::full(bytes),
            RequestBody::Failed(_) | RequestBody::Taken => body::empty(),
        };
        (self.parts, body)
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.parts.method)
            .field("uri", &self.parts.uri)
            .field("version", &self.parts.version)
            .field("buffered", &self.is_buffered())
            .finish()
    }
}
