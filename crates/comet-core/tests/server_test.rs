use comet_core::{handler_fn, Json, PipelineError, Pipeline, Request, Response, Server};
use http::StatusCode;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

async fn storefront(req: Request) -> Result<Response, PipelineError> {
    use comet_core::IntoResponse;

    match req.path() {
        "/api/products" => Ok(Json(json!({"items": []})).into_response()),
        "/api/conflict" => Err(PipelineError::msg("cart locked").with_status(StatusCode::CONFLICT)),
        "/api/fail" => Err(PipelineError::msg("db timeout")),
        "/api/panic" => panic!("handler exploded"),
        _ => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

async fn start() -> (String, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();

    let server = Server::new(Pipeline::new(handler_fn(storefront)));
    tokio::spawn(async move {
        let _ = server
            .serve(listener, async move {
                let _ = rx.await;
            })
            .await;
    });

    (format!("http://{}", addr), tx)
}

#[tokio::test]
async fn test_successful_request_is_served() {
    let (base, _shutdown) = start().await;

    let resp = reqwest::get(format!("{base}/api/products")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), r#"{"items":[]}"#);
}

#[tokio::test]
async fn test_unhandled_failure_becomes_500() {
    let (base, _shutdown) = start().await;

    let resp = reqwest::get(format!("{base}/api/fail")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "internal_error");
}

#[tokio::test]
async fn test_committed_status_is_rendered() {
    let (base, _shutdown) = start().await;

    let resp = reqwest::get(format!("{base}/api/conflict")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "cart locked");
}

#[tokio::test]
async fn test_panicking_handler_becomes_500_and_server_survives() {
    let (base, _shutdown) = start().await;

    let resp = reqwest::get(format!("{base}/api/panic")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let resp = reqwest::get(format!("{base}/api/products")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
