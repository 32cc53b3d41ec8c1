//! HTTP endpoints: `/predict`, `/predict-video` and `/health`.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::NamedTempFile;
use tower_http::cors::CorsLayer;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/predict", post(predict_image))
        .route("/predict-video", post(predict_video))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ImageResponse {
    result: &'static str,
    confidence: f64,
}

#[derive(Debug, Serialize)]
struct VideoResponse {
    prediction: &'static str,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// POST /predict - classify the file part named `image`
async fn predict_image(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ImageResponse>, ApiError> {
    // a body that is not multipart has no file parts at all
    let mut multipart = multipart.map_err(|e| missing_field(e, "No image file provided"))?;

    let mut image = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("image") {
            continue;
        }
        // a part without a filename is a form value, not a file
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field.bytes().await.map_err(multipart_error)?;
        image = Some((file_name, bytes));
        break;
    }
    let Some((file_name, bytes)) = image else {
        return Err(ApiError::bad_request("No image file provided"));
    };
    if file_name.is_empty() {
        return Err(ApiError::bad_request("No image selected"));
    }
    log::debug!("image upload: {} bytes", bytes.len());

    let predictor = state.image.clone();
    // one forward pass, nothing to interrupt
    let cancel = Arc::new(AtomicBool::new(false));
    let prediction = run_blocking(state.request_timeout, cancel, move || {
        predictor.predict_image(&bytes).map_err(ApiError::from_image)
    })
    .await?;

    log::info!("image: {} ({:.2}%)", prediction.label, prediction.confidence);
    Ok(Json(ImageResponse {
        result: prediction.label.as_str(),
        confidence: prediction.confidence,
    }))
}

/// POST /predict-video - classify the file part named `video`
async fn predict_video(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<VideoResponse>, ApiError> {
    let mut multipart = multipart.map_err(|e| missing_field(e, "No video file uploaded"))?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("video") && field.file_name().is_some() {
            upload = Some(save_upload(field).await?);
            break;
        }
    }
    let Some(upload) = upload else {
        return Err(ApiError::bad_request("No video file uploaded"));
    };

    let predictor = state.video.clone();
    let cancel = Arc::new(AtomicBool::new(false));
    let task_cancel = cancel.clone();
    let prediction = run_blocking(state.request_timeout, cancel, move || {
        let result = predictor.predict_video(upload.path(), &task_cancel);
        // removes the file before the response is sent
        drop(upload);
        result.map_err(ApiError::from)
    })
    .await?;

    Ok(Json(VideoResponse {
        prediction: prediction.label.as_str(),
    }))
}

fn missing_field(rejection: MultipartRejection, message: &str) -> ApiError {
    log::debug!("not a multipart request: {}", rejection.body_text());
    ApiError::bad_request(message)
}

fn multipart_error(err: MultipartError) -> ApiError {
    ApiError::new(err.status(), err.body_text())
}

/// Stream a file part into a temp file that is deleted when dropped.
async fn save_upload(mut field: Field<'_>) -> Result<NamedTempFile, ApiError> {
    let suffix = field
        .file_name()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    let mut upload = tempfile::Builder::new()
        .prefix("verity-upload-")
        .suffix(&suffix)
        .tempfile()
        .map_err(|e| ApiError::internal(format!("failed to create temp file: {e}")))?;

    let mut written = 0;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(multipart_error)?
    {
        upload
            .write_all(&chunk)
            .map_err(|e| ApiError::internal(format!("failed to write upload: {e}")))?;
        written += chunk.len();
    }
    upload
        .flush()
        .map_err(|e| ApiError::internal(format!("failed to write upload: {e}")))?;
    log::debug!("video upload: {written} bytes at {}", upload.path().display());
    Ok(upload)
}

/// Run model work on the blocking pool, bounded by `timeout`.
///
/// On timeout `cancel` is set so the task can stop at its next check; whatever
/// it owns is dropped when it returns.
async fn run_blocking<T, F>(timeout: Duration, cancel: Arc<AtomicBool>, task: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(task)).await {
        Err(_) => {
            cancel.store(true, Ordering::Relaxed);
            Err(ApiError::timeout())
        }
        Ok(Err(e)) => Err(ApiError::internal(format!("inference task failed: {e}"))),
        Ok(Ok(result)) => result,
    }
}
