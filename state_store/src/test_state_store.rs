use std::sync::Arc;

use anyhow::Result;
use data_model::{BuildId, ContentDigests, NewBuild};
use tempfile::TempDir;

use crate::{
    requests::{
        CreateBuildRequest,
        FinalizeBuildRequest,
        RequestPayload,
        StateMachineUpdateRequest,
        WriteOutcome,
    },
    Error,
    RegistryState,
};

pub struct TestStateStore {
    pub registry_state: Arc<RegistryState>,
    // keeps the store directory alive for the lifetime of the test
    _temp_dir: TempDir,
}

impl TestStateStore {
    pub async fn new() -> Result<TestStateStore> {
        let temp_dir = tempfile::tempdir()?;
        let registry_state = RegistryState::new(temp_dir.path().join("state")).await?;
        Ok(TestStateStore {
            registry_state,
            _temp_dir: temp_dir,
        })
    }

    pub async fn create_build(&self, new_build: NewBuild) -> Result<WriteOutcome, Error> {
        self.registry_state
            .write(StateMachineUpdateRequest {
                payload: RequestPayload::CreateBuild(CreateBuildRequest { new_build }),
            })
            .await
    }

    /// Marks a build ready with the digests of `data` without storing a blob.
    pub async fn finalize_build(&self, build_id: BuildId, data: &[u8]) -> Result<WriteOutcome, Error> {
        self.registry_state
            .write(StateMachineUpdateRequest {
                payload: RequestPayload::FinalizeBuild(FinalizeBuildRequest {
                    build_id,
                    digests: ContentDigests::compute(data),
                    size_bytes: data.len() as u64,
                }),
            })
            .await
    }
}
