use std::{path::PathBuf, sync::Arc};

use blob_store::BlobStorage;
use data_model::{Build, Project, Version};
use state_store::RegistryState;

use crate::error::RegistryError;

#[derive(Debug)]
pub struct ProjectListing {
    pub project: Project,
    pub versions: Vec<Version>,
}

#[derive(Debug)]
pub struct VersionListing {
    pub project: Project,
    pub version: Version,
    /// Ready builds, ascending by id.
    pub builds: Vec<Build>,
}

impl VersionListing {
    /// Most recently created ready build, `None` when nothing is ready yet.
    pub fn latest(&self) -> Option<&Build> {
        self.builds.last()
    }
}

#[derive(Debug)]
pub struct BuildListing {
    pub project: Project,
    pub version: Version,
    pub build: Build,
}

#[derive(Debug)]
pub struct ResolvedDownload {
    pub storage_key: String,
    /// Only local blob stores have a filesystem path.
    pub path: Option<PathBuf>,
    pub size_bytes: u64,
    pub suggested_filename: String,
}

/// Read side of the registry. Pending builds are never visible here.
pub struct Catalog {
    registry_state: Arc<RegistryState>,
    blob_storage: Arc<BlobStorage>,
}

impl Catalog {
    pub fn new(registry_state: Arc<RegistryState>, blob_storage: Arc<BlobStorage>) -> Self {
        Self {
            registry_state,
            blob_storage,
        }
    }

    pub fn list_projects(&self) -> Result<Vec<Project>, RegistryError> {
        Ok(self.registry_state.reader().all_projects()?)
    }

    fn project(&self, name: &str) -> Result<Project, RegistryError> {
        self.registry_state
            .reader()
            .project_by_name(name)?
            .ok_or(RegistryError::not_found("Project not found"))
    }

    fn version(&self, project: &Project, name: &str) -> Result<Version, RegistryError> {
        self.registry_state
            .reader()
            .version_by_name(project.id, name)?
            .ok_or(RegistryError::not_found("Version not found"))
    }

    pub fn get_project(&self, name: &str) -> Result<ProjectListing, RegistryError> {
        let project = self.project(name)?;
        let versions = self.registry_state.reader().project_versions(project.id)?;
        Ok(ProjectListing { project, versions })
    }

    pub fn get_version(&self, project: &str, version: &str) -> Result<VersionListing, RegistryError> {
        let project = self.project(project)?;
        let version = self.version(&project, version)?;
        let builds = self.registry_state.reader().ready_builds(version.id)?;
        Ok(VersionListing {
            project,
            version,
            builds,
        })
    }

    pub fn get_build(
        &self,
        project: &str,
        version: &str,
        label: &str,
    ) -> Result<BuildListing, RegistryError> {
        let project = self.project(project)?;
        let version = self.version(&project, version)?;
        let build = self
            .registry_state
            .reader()
            .build_by_label(version.id, label)?
            .filter(|build| build.ready)
            .ok_or(RegistryError::not_found("Build not found"))?;
        Ok(BuildListing {
            project,
            version,
            build,
        })
    }

    pub fn resolve_download(
        &self,
        project: &str,
        version: &str,
        label: &str,
    ) -> Result<ResolvedDownload, RegistryError> {
        let BuildListing {
            project,
            version,
            build,
        } = self.get_build(project, version, label)?;
        let storage_key = build
            .storage_key()
            .ok_or(RegistryError::not_found("Build not found"))?
            .to_string();
        let path = self.blob_storage.resolve_path(&storage_key).ok();
        Ok(ResolvedDownload {
            path,
            size_bytes: build.size_bytes.unwrap_or_default(),
            suggested_filename: build.suggested_filename(&project.name, &version.name),
            storage_key,
        })
    }
}
