use data_model::{Build, BuildId, ContentDigests, NewBuild};

#[derive(Debug, Clone)]
pub struct StateMachineUpdateRequest {
    pub payload: RequestPayload,
}

#[derive(Debug, Clone, strum::Display)]
pub enum RequestPayload {
    CreateBuild(CreateBuildRequest),
    FinalizeBuild(FinalizeBuildRequest),
}

#[derive(Debug, Clone)]
pub struct CreateBuildRequest {
    pub new_build: NewBuild,
}

#[derive(Debug, Clone)]
pub struct FinalizeBuildRequest {
    pub build_id: BuildId,
    pub digests: ContentDigests,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub enum WriteOutcome {
    BuildCreated {
        build: Build,
        project_created: bool,
        version_created: bool,
    },
    BuildFinalized {
        build: Build,
    },
}

impl WriteOutcome {
    pub fn build(&self) -> &Build {
        match self {
            WriteOutcome::BuildCreated { build, .. } => build,
            WriteOutcome::BuildFinalized { build } => build,
        }
    }
}
