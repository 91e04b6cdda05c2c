//! Storefront demo with request capture
//!
//! Run from demos/storefront with the capture settings in the environment
//! (or a `.env` file):
//!
//! ```text
//! COMET_API_KEY=dev-key \
//! COMET_PROJECT_ID=storefront \
//! COMET_ENDPOINT=http://127.0.0.1:9000/ingest \
//! cargo run
//! ```
//!
//! Then visit http://127.0.0.1:8080/api/products

use comet_capture::{load_dotenv, CaptureConfig, CaptureLayer};
use comet_core::{handler_fn, IntoResponse, Json, Pipeline, PipelineError, Request, Response, Server};
use http::{header, Method, StatusCode};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Serialize)]
struct Product {
    id: u32,
    name: &'static str,
    price_cents: u32,
}

const STYLESHEET: &str = "body { font-family: sans-serif; margin: 0 }\n";

async fn storefront(mut req: Request) -> Result<Response, PipelineError> {
    let path = req.path().to_owned();

    match (req.method().clone(), path.as_str()) {
        (Method::GET, "/api/products") => Ok(Json(vec![
            Product { id: 1, name: "Kettle", price_cents: 3499 },
            Product { id: 2, name: "Teapot", price_cents: 2450 },
        ])
        .into_response()),
        (Method::POST, "/api/cart") => {
            let body = req.body_bytes().await?;
            Ok((StatusCode::CREATED, body).into_response())
        }
        // Simulates a failing dependency
        (_, "/api/fail") => Err(PipelineError::msg("db timeout")),
        (Method::GET, p) if p.ends_with(".css") => {
            let mut resp = STYLESHEET.into_response();
            resp.headers_mut()
                .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/css"));
            Ok(resp)
        }
        _ => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    load_dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let capture = CaptureLayer::new(CaptureConfig::from_env()?)?;
    tracing::info!(
        project = capture.config().project_id(),
        endpoint = capture.config().endpoint(),
        "Capturing requests"
    );

    let addr = std::env::var("STOREFRONT_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let pipeline = Pipeline::new(handler_fn(storefront)).layer(capture);

    Server::new(pipeline)
        .run_until(&addr, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}
