use super::snapshot;
use comet_core::Request;
use tracing::warn;

/// Buffer the request body in place and return its text snapshot.
///
/// Afterwards the downstream stage reads the same bytes through the request
/// as if nothing had touched it. A body that fails to read yields an empty
/// snapshot; the failure stays recorded in the request, so the downstream
/// stage observes it too instead of a silently different body.
pub async fn capture_request(req: &mut Request, limit: Option<usize>) -> String {
    match req.buffer_body().await {
        Ok(bytes) => snapshot(&bytes, limit),
        Err(err) => {
            warn!(
                method = %req.method(),
                path = %req.path(),
                error = %err,
                "Request body could not be captured"
            );
            String::new()
        }
    }
}
