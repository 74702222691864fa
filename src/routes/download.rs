use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::Response,
};
use tracing::debug;

use super::RouteState;
use crate::http_objects::RegistryAPIError;

/// Download the artifact of a ready build
#[utoipa::path(
    get,
    path = "/v2/{project}/{version}/{build}/download",
    tag = "browse",
    params(
        ("project" = String, Path, description = "Project name"),
        ("version" = String, Path, description = "Version name"),
        ("build" = String, Path, description = "Build label"),
    ),
    responses(
        (status = 200, description = "Artifact bytes", body = Vec<u8>, content_type = "application/octet-stream"),
        (status = NOT_FOUND, description = "Project, version or build not found", body = RegistryAPIError),
        (status = INTERNAL_SERVER_ERROR, description = "Internal Server Error")
    ),
)]
pub async fn download_build(
    Path((project, version, build)): Path<(String, String, String)>,
    State(state): State<RouteState>,
) -> Result<Response<Body>, RegistryAPIError> {
    let download = state.catalog.resolve_download(&project, &version, &build)?;
    debug!(
        key = %download.storage_key,
        path = ?download.path,
        "streaming build artifact"
    );
    let storage_reader = state
        .blob_storage
        .get(&download.storage_key)
        .await
        .map_err(RegistryAPIError::internal_error)?;

    Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, download.size_bytes.to_string())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(&download.suggested_filename),
        )
        .body(Body::from_stream(storage_reader))
        .map_err(|e| RegistryAPIError::internal_error(e.into()))
}

/// `attachment; filename="..."` with an ascii fallback name, plus an
/// RFC 5987 `filename*` when the name is not plain ascii.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    if fallback == filename {
        return format!("attachment; filename=\"{}\"", fallback);
    }
    let mut encoded = String::new();
    for byte in filename.bytes() {
        if byte.is_ascii_alphanumeric() || b"-._~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    )
}
