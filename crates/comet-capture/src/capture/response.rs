use super::snapshot;
use bytes::{Bytes, BytesMut};
use comet_core::{body, BoxError, Response};
use http::HeaderMap;
use http_body_util::BodyExt;
use hyper::body::{Body as HttpBody, Frame, SizeHint};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::warn;

/// A drained response ready to be handed to the client
pub struct CapturedResponse {
    /// Original status and headers with a body replaying what was drained
    pub response: Response,
    /// Text snapshot of the drained bytes
    pub text: String,
    /// Message of the error the downstream body failed with, if it did
    pub failure: Option<String>,
}

/// Drain the response body, snapshot it, and return a response that replays it.
///
/// The returned response carries the original status and headers and a body
/// yielding byte-identical data followed by any trailers. If the downstream
/// body fails part way, the replay yields the bytes produced before the
/// failure and then the same failure, so the client connection sees what it
/// would have seen without capture.
pub async fn capture_response(response: Response, limit: Option<usize>) -> CapturedResponse {
    let (parts, mut stream) = response.into_parts();

    let mut data = BytesMut::new();
    let mut trailers: Option<HeaderMap> = None;
    let mut failure: Option<BoxError> = None;

    while let Some(frame) = stream.frame().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "Response body failed while being captured");
                failure = Some(err);
                break;
            }
        };

        match frame.into_data() {
            Ok(chunk) => data.extend_from_slice(&chunk),
            Err(frame) => {
                if let Ok(map) = frame.into_trailers() {
                    trailers.get_or_insert_with(HeaderMap::new).extend(map);
                }
            }
        }
    }

    let data = data.freeze();
    let text = snapshot(&data, limit);
    let message = failure.as_ref().map(ToString::to_string);
    let replay = ReplayBody {
        data: Some(data),
        failure,
        trailers,
    };

    CapturedResponse {
        response: Response::from_parts(parts, body::boxed(replay)),
        text,
        failure: message,
    }
}

/// A captured response body handed back to the client
struct ReplayBody {
    data: Option<Bytes>,
    failure: Option<BoxError>,
    trailers: Option<HeaderMap>,
}

impl HttpBody for ReplayBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        if let Some(data) = this.data.take().filter(|data| !data.is_empty()) {
            return Poll::Ready(Some(Ok(Frame::data(data))));
        }
        if let Some(err) = this.failure.take() {
            return Poll::Ready(Some(Err(err)));
        }
        if let Some(trailers) = this.trailers.take() {
            return Poll::Ready(Some(Ok(Frame::trailers(trailers))));
        }
        Poll::Ready(None)
    }

    fn is_end_stream(&self) -> bool {
        self.data.as_ref().map_or(true, Bytes::is_empty)
            && self.failure.is_none()
            && self.trailers.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        if self.failure.is_some() {
            return SizeHint::default();
        }
        let remaining = self.data.as_ref().map_or(0, Bytes::len);
        SizeHint::with_exact(remaining as u64)
    }
}
