use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Path, State},
    Json,
};
use data_model::BuildId;

use super::RouteState;
use crate::http_objects::{CreateBuild, CreateBuildResponse, RegistryAPIError, UploadBuildResponse};

/// Register a pending build
#[utoipa::path(
    post,
    path = "/v2/create",
    tag = "create",
    request_body = CreateBuild,
    responses(
        (status = 200, description = "Build created, upload the artifact to `url`", body = CreateBuildResponse),
        (status = BAD_REQUEST, description = "Invalid body", body = RegistryAPIError),
        (status = UNAUTHORIZED, description = "Missing or wrong create key", body = RegistryAPIError),
        (status = CONFLICT, description = "Build already exists", body = RegistryAPIError)
    ),
)]
pub async fn create_build(
    State(state): State<RouteState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<CreateBuildResponse>, RegistryAPIError> {
    let body = body.map_err(body_rejection)?;
    let create: CreateBuild =
        serde_json::from_slice(&body).map_err(|_| RegistryAPIError::bad_request("Invalid body"))?;
    let build_id = state.ingestor.create(create.into()).await?;
    Ok(Json(CreateBuildResponse {
        url: format!("{}/create/upload/{}", state.api_prefix, build_id.get()),
    }))
}

/// Upload the artifact of a pending build
#[utoipa::path(
    post,
    path = "/v2/create/upload/{build}",
    tag = "create",
    params(
        ("build" = u64, Path, description = "Id returned by create"),
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Build is ready", body = UploadBuildResponse),
        (status = BAD_REQUEST, description = "Invalid build", body = RegistryAPIError),
        (status = UNAUTHORIZED, description = "Missing or wrong create key", body = RegistryAPIError),
        (status = NOT_FOUND, description = "Build not found", body = RegistryAPIError),
        (status = PAYLOAD_TOO_LARGE, description = "Artifact too large", body = RegistryAPIError)
    ),
)]
pub async fn upload_build(
    Path(build): Path<String>,
    State(state): State<RouteState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<UploadBuildResponse>, RegistryAPIError> {
    let build_id = parse_build_id(&build)?;
    let body = body.map_err(body_rejection)?;
    state.ingestor.upload(build_id, body).await?;
    Ok(Json(UploadBuildResponse {}))
}

fn parse_build_id(build: &str) -> Result<BuildId, RegistryAPIError> {
    match build.parse::<u64>() {
        Ok(id) if id >= 1 => Ok(BuildId::new(id)),
        _ => Err(RegistryAPIError::bad_request("Invalid build")),
    }
}

fn body_rejection(rejection: BytesRejection) -> RegistryAPIError {
    RegistryAPIError::new(rejection.status(), &rejection.body_text())
}
