//! Delivered file retrieval.

use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path as UrlPath, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use audiograb_core::DownloadError;

use crate::metrics::FILES_SERVED_TOTAL;
use crate::state::AppState;

/// GET /downloads/{session_id}/{*path}
pub async fn serve_download(
    State(state): State<Arc<AppState>>,
    UrlPath((session_id, path)): UrlPath<(String, String)>,
) -> Response {
    let resolved = match state
        .engine()
        .storage()
        .resolve_delivered(&session_id, &path)
        .await
    {
        Ok(resolved) => resolved,
        Err(DownloadError::InvalidPath { path }) => {
            warn!(session_id = %session_id, path = %path, "Rejected file request");
            return (StatusCode::BAD_REQUEST, "Invalid filename").into_response();
        }
        Err(e) => {
            debug!(session_id = %session_id, error = %e, "Delivered file not found");
            return (StatusCode::NOT_FOUND, "File not found").into_response();
        }
    };

    // The deferred deletion may have run in between.
    let file = match tokio::fs::File::open(&resolved).await {
        Ok(file) => file,
        Err(_) => return (StatusCode::NOT_FOUND, "File not found").into_response(),
    };
    let length = file.metadata().await.map(|m| m.len()).ok();

    FILES_SERVED_TOTAL.inc();

    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type(&resolved)),
    );
    if let Some(value) = content_disposition(&resolved) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if let Some(length) = length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }
    response
}

fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("zip") => "application/zip",
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("flac") => "audio/flac",
        Some("wav") => "audio/wav",
        Some("ogg") => "audio/ogg",
        _ => "application/octet-stream",
    }
}

/// `attachment` with an ASCII fallback name and the exact UTF-8 name.
fn content_disposition(path: &Path) -> Option<HeaderValue> {
    let name = path.file_name()?.to_string_lossy();
    let fallback: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();
    let value = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(&name)
    );
    HeaderValue::from_str(&value).ok()
}
