use axum::{
    extract::{Path, State},
    Json,
};

use super::RouteState;
use crate::http_objects::{Build, Project, ProjectList, RegistryAPIError, Version};

/// List all projects
#[utoipa::path(
    get,
    path = "/v2/",
    tag = "browse",
    responses(
        (status = 200, description = "Project names", body = ProjectList),
        (status = INTERNAL_SERVER_ERROR, description = "Internal Server Error")
    ),
)]
pub async fn list_projects(
    State(state): State<RouteState>,
) -> Result<Json<ProjectList>, RegistryAPIError> {
    let projects = state.catalog.list_projects()?;
    Ok(Json(ProjectList {
        projects: projects.into_iter().map(|p| p.name).collect(),
    }))
}

/// Get a project and its versions
#[utoipa::path(
    get,
    path = "/v2/{project}",
    tag = "browse",
    params(
        ("project" = String, Path, description = "Project name"),
    ),
    responses(
        (status = 200, description = "Project with its version names", body = Project),
        (status = NOT_FOUND, description = "Project not found", body = RegistryAPIError)
    ),
)]
pub async fn get_project(
    Path(project): Path<String>,
    State(state): State<RouteState>,
) -> Result<Json<Project>, RegistryAPIError> {
    Ok(Json(state.catalog.get_project(&project)?.into()))
}

/// Get a version and its ready builds
#[utoipa::path(
    get,
    path = "/v2/{project}/{version}",
    tag = "browse",
    params(
        ("project" = String, Path, description = "Project name"),
        ("version" = String, Path, description = "Version name"),
    ),
    responses(
        (status = 200, description = "Version with ready builds, oldest first", body = Version),
        (status = NOT_FOUND, description = "Project or version not found", body = RegistryAPIError)
    ),
)]
pub async fn get_version(
    Path((project, version)): Path<(String, String)>,
    State(state): State<RouteState>,
) -> Result<Json<Version>, RegistryAPIError> {
    Ok(Json(state.catalog.get_version(&project, &version)?.into()))
}

/// Get a ready build
#[utoipa::path(
    get,
    path = "/v2/{project}/{version}/{build}",
    tag = "browse",
    params(
        ("project" = String, Path, description = "Project name"),
        ("version" = String, Path, description = "Version name"),
        ("build" = String, Path, description = "Build label"),
    ),
    responses(
        (status = 200, description = "Build metadata", body = Build),
        (status = NOT_FOUND, description = "Project, version or build not found", body = RegistryAPIError)
    ),
)]
pub async fn get_build(
    Path((project, version, build)): Path<(String, String, String)>,
    State(state): State<RouteState>,
) -> Result<Json<Build>, RegistryAPIError> {
    Ok(Json(state.catalog.get_build(&project, &version, &build)?.into()))
}
