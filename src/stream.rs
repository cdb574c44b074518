//! Vista en vivo por HTTP: página mínima, stream MJPEG y métricas.
//!
//! El stream es best-effort: cada espectador recibe el último frame del
//! FrameBuffer a un ritmo fijo, sin garantía de entrega frame a frame.

use crate::metrics::gather_metrics;
use crate::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

/// Cadencia de la vista en vivo (~10 fps)
const FEED_INTERVAL: Duration = Duration::from_millis(100);

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>Centinela</title></head>
<body style="background:#111;color:#eee;text-align:center;font-family:sans-serif">
  <h1>🎥 Centinela</h1>
  <img src="/video_feed" alt="live view" style="max-width:100%">
</body>
</html>
"#;

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

// GET /video_feed — multipart/x-mixed-replace alimentado desde el FrameBuffer
async fn video_feed(State(state): State<Arc<AppState>>) -> Response {
    let stream = async_stream::stream! {
        loop {
            if let Some(frame) = state.frame_buffer.snapshot() {
                match frame.to_jpeg() {
                    Ok(jpeg) => {
                        let mut chunk = Vec::with_capacity(jpeg.len() + 64);
                        chunk.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
                        chunk.extend_from_slice(&jpeg);
                        chunk.extend_from_slice(b"\r\n");
                        yield Ok::<Bytes, std::io::Error>(Bytes::from(chunk));
                    }
                    Err(e) => log::warn!("⚠️ Error al codificar frame para el stream: {}", e),
                }
            }
            tokio::time::sleep(FEED_INTERVAL).await;
        }
    };

    let mut resp = Response::new(Body::from_stream(stream));
    let headers = resp.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        "multipart/x-mixed-replace; boundary=frame".parse().unwrap(),
    );
    headers.insert(header::CACHE_CONTROL, "no-cache".parse().unwrap());
    resp
}

async fn metrics_handler() -> impl IntoResponse {
    match gather_metrics() {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(e) => {
            log::error!("❌ Error al recolectar métricas: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "".to_string()).into_response()
        }
    }
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "armed": state.system.is_armed(),
        "camera": state.camera.is_live(),
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/video_feed", get(video_feed))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}
