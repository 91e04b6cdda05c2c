//! Non-destructive capture of request and response bodies.
//!
//! Both directions read a single-consumption stream into memory once, keep a
//! text snapshot for the telemetry record, and hand the bytes on unchanged:
//! the request body stays buffered inside the [`Request`](comet_core::Request)
//! for the downstream stage, and the response body is replaced by a replay of
//! exactly what the downstream stage produced.

mod request;
mod response;

pub use request::capture_request;
pub use response::{capture_response, CapturedResponse};

/// Decode `bytes` as text for the record, keeping at most `limit` bytes
///
/// Invalid UTF-8 is replaced rather than rejected, so binary payloads
/// degrade to a best-effort string. A limit falling inside a multi-byte
/// character moves back to that character's start.
pub fn snapshot(bytes: &[u8], limit: Option<usize>) -> String {
    let kept = match limit {
        Some(limit) if bytes.len() > limit => &bytes[..char_boundary(bytes, limit)],
        _ => bytes,
    };
    String::from_utf8_lossy(kept).into_owned()
}

/// Largest cut at or below `cut` that does not split a UTF-8 sequence
fn char_boundary(bytes: &[u8], cut: usize) -> usize {
    let is_continuation = |b: u8| b & 0b1100_0000 == 0b1000_0000;

    // a UTF-8 sequence has at most three continuation bytes
    let mut boundary = cut;
    while boundary > 0 && cut - boundary < 3 && is_continuation(bytes[boundary]) {
        boundary -= 1;
    }
    if is_continuation(bytes[boundary]) {
        cut
    } else {
        boundary
    }
}
