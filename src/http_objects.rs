use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use utoipa::ToSchema;

use crate::{
    catalog::{BuildListing, ProjectListing, VersionListing},
    error::RegistryError,
};

#[derive(Debug, ToSchema, Serialize, Deserialize)]
pub struct RegistryAPIError {
    #[serde(skip)]
    status_code: StatusCode,
    #[serde(rename = "error")]
    message: String,
}

impl RegistryAPIError {
    pub fn new(status_code: StatusCode, message: &str) -> Self {
        Self {
            status_code,
            message: message.to_string(),
        }
    }

    pub fn internal_error(e: anyhow::Error) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string().as_str())
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }
}

impl IntoResponse for RegistryAPIError {
    fn into_response(self) -> Response {
        if self.status_code.is_server_error() {
            error!("API Error: {} - {}", self.status_code, self.message);
        } else {
            warn!("API Error: {} - {}", self.status_code, self.message);
        }
        (self.status_code, Json(self)).into_response()
    }
}

impl From<RegistryError> for RegistryAPIError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::InvalidInput(message) => Self::bad_request(&message),
            RegistryError::Conflict(message) => Self::new(StatusCode::CONFLICT, &message),
            RegistryError::NotFound(message) => Self::not_found(&message),
            RegistryError::Internal(e) => Self::internal_error(e),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildResult {
    Success,
    Failure,
}

impl From<BuildResult> for data_model::BuildResult {
    fn from(result: BuildResult) -> Self {
        match result {
            BuildResult::Success => data_model::BuildResult::Success,
            BuildResult::Failure => data_model::BuildResult::Failure,
        }
    }
}

impl From<data_model::BuildResult> for BuildResult {
    fn from(result: data_model::BuildResult) -> Self {
        match result {
            data_model::BuildResult::Success => BuildResult::Success,
            data_model::BuildResult::Failure => BuildResult::Failure,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Commit {
    pub author: String,
    pub email: String,
    pub description: String,
    pub hash: String,
    pub timestamp: u64,
}

impl From<Commit> for data_model::Commit {
    fn from(commit: Commit) -> Self {
        Self {
            author: commit.author,
            email: commit.email,
            description: commit.description,
            hash: commit.hash,
            timestamp: commit.timestamp,
        }
    }
}

impl From<data_model::Commit> for Commit {
    fn from(commit: data_model::Commit) -> Self {
        Self {
            author: commit.author,
            email: commit.email,
            description: commit.description,
            hash: commit.hash,
            timestamp: commit.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBuild {
    pub project: String,
    pub version: String,
    pub build: String,
    pub result: BuildResult,
    pub timestamp: u64,
    pub duration: u64,
    pub file_extension: String,
    pub commits: Vec<Commit>,
    pub flags: Vec<String>,
}

impl From<CreateBuild> for data_model::NewBuild {
    fn from(create: CreateBuild) -> Self {
        Self {
            project: create.project,
            version: create.version,
            build: create.build,
            result: create.result.into(),
            timestamp: create.timestamp,
            duration: create.duration,
            file_extension: create.file_extension,
            commits: create.commits.into_iter().map(Into::into).collect(),
            flags: create.flags,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateBuildResponse {
    /// Where the artifact bytes are uploaded to.
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadBuildResponse {}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProjectList {
    pub projects: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Project {
    pub project: String,
    pub versions: Vec<String>,
}

impl From<ProjectListing> for Project {
    fn from(listing: ProjectListing) -> Self {
        Self {
            project: listing.project.name,
            versions: listing.versions.into_iter().map(|v| v.name).collect(),
        }
    }
}

/// A ready build as clients see it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Build {
    pub project: String,
    pub version: String,
    pub build: String,
    pub result: BuildResult,
    pub timestamp: u64,
    pub duration: Option<u64>,
    pub md5: String,
    pub sha256: String,
    pub sha512: String,
    pub commits: Vec<Commit>,
    pub flags: Vec<String>,
}

impl Build {
    fn from_model(project: &str, version: &str, build: data_model::Build) -> Self {
        Self {
            project: project.to_string(),
            version: version.to_string(),
            build: build.label,
            result: build.result.into(),
            timestamp: build.timestamp,
            duration: build.duration,
            md5: build.md5,
            sha256: build.sha256,
            sha512: build.sha512,
            commits: build.commits.into_iter().map(Into::into).collect(),
            flags: build.flags,
        }
    }
}

impl From<BuildListing> for Build {
    fn from(listing: BuildListing) -> Self {
        Build::from_model(&listing.project.name, &listing.version.name, listing.build)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Builds {
    /// Last ready build, `null` while no build of the version is ready.
    pub latest: Option<Build>,
    pub all: Vec<Build>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Version {
    pub project: String,
    pub version: String,
    pub builds: Builds,
}

impl From<VersionListing> for Version {
    fn from(listing: VersionListing) -> Self {
        let project = listing.project.name.clone();
        let version = listing.version.name.clone();
        let latest = listing
            .latest()
            .map(|build| Build::from_model(&project, &version, build.clone()));
        let all: Vec<Build> = listing
            .builds
            .into_iter()
            .map(|build| Build::from_model(&project, &version, build))
            .collect();
        Self {
            builds: Builds { latest, all },
            project,
            version,
        }
    }
}
