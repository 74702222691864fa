use std::sync::Arc;

use anyhow::anyhow;
use blob_store::BlobStorage;
use bytes::Bytes;
use dashmap::DashMap;
use data_model::{BuildId, ContentDigests, NewBuild};
use state_store::{
    requests::{
        CreateBuildRequest,
        FinalizeBuildRequest,
        RequestPayload,
        StateMachineUpdateRequest,
        WriteOutcome,
    },
    RegistryState,
};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::RegistryError;

/// Attempts per state store write when transactions collide on row locks.
const MAX_WRITE_ATTEMPTS: usize = 3;

/// Per build upload leases. Uploads to the same build run one at a time;
/// uploads to different builds never wait on each other.
#[derive(Default)]
struct UploadLeases {
    leases: DashMap<BuildId, Arc<Mutex<()>>>,
}

impl UploadLeases {
    fn lease(&self, build_id: BuildId) -> UploadLease<'_> {
        let lock = self.leases.entry(build_id).or_default().clone();
        UploadLease {
            leases: self,
            build_id,
            lock,
        }
    }
}

/// A handle on one build's upload lock. Dropping it, including when the
/// upload future is cancelled, removes the map entry once nobody else holds
/// or waits on it.
struct UploadLease<'a> {
    leases: &'a UploadLeases,
    build_id: BuildId,
    lock: Arc<Mutex<()>>,
}

impl Drop for UploadLease<'_> {
    fn drop(&mut self) {
        drop(std::mem::take(&mut self.lock));
        self.leases
            .leases
            .remove_if(&self.build_id, |_, lease| Arc::strong_count(lease) == 1);
    }
}

/// The two phase create/upload protocol. A build is created pending and
/// becomes ready exactly once, after its bytes are stored.
pub struct BuildIngestor {
    registry_state: Arc<RegistryState>,
    blob_storage: Arc<BlobStorage>,
    upload_leases: UploadLeases,
}

impl BuildIngestor {
    pub fn new(registry_state: Arc<RegistryState>, blob_storage: Arc<BlobStorage>) -> Self {
        Self {
            registry_state,
            blob_storage,
            upload_leases: UploadLeases::default(),
        }
    }

    /// Registers a pending build and returns its id, which is the upload
    /// handle.
    pub async fn create(&self, new_build: NewBuild) -> Result<BuildId, RegistryError> {
        new_build
            .validate()
            .map_err(|e| RegistryError::InvalidInput(e.to_string()))?;

        let project = new_build.project.clone();
        let version = new_build.version.clone();
        let label = new_build.build.clone();
        let outcome = self
            .write(StateMachineUpdateRequest {
                payload: RequestPayload::CreateBuild(CreateBuildRequest { new_build }),
            })
            .await
            .inspect_err(|e| {
                warn!(%project, %version, build = %label, "build create rejected: {}", e);
            })?;
        let build_id = outcome.build().id;
        info!(
            %project,
            %version,
            build = %label,
            build_id = build_id.get(),
            "build created"
        );
        Ok(build_id)
    }

    /// Stores `data` and marks the build ready. Only a pending build can be
    /// uploaded to; a ready or unknown build is not found.
    pub async fn upload(&self, build_id: BuildId, data: Bytes) -> Result<(), RegistryError> {
        if build_id.get() == 0 {
            return Err(RegistryError::invalid_input("Invalid build"));
        }
        let lease = self.upload_leases.lease(build_id);
        let _guard = lease.lock.lock().await;
        self.upload_pending(build_id, data).await
    }

    async fn upload_pending(&self, build_id: BuildId, data: Bytes) -> Result<(), RegistryError> {
        let pending = self
            .registry_state
            .reader()
            .build_by_id(build_id)?
            .filter(|build| !build.ready);
        if pending.is_none() {
            warn!(build_id = build_id.get(), "upload rejected, no pending build");
            return Err(RegistryError::not_found("Build not found"));
        }

        let size_bytes = data.len() as u64;
        let digests = {
            let data = data.clone();
            tokio::task::spawn_blocking(move || ContentDigests::compute(&data))
                .await
                .map_err(|e| anyhow!("failed to hash upload for build {}: {}", build_id, e))?
        };

        // The blob must be durable before the build can be marked ready.
        let put_result = self
            .blob_storage
            .put(digests.storage_key(), data)
            .await
            .inspect_err(|e| {
                error!(build_id = build_id.get(), "failed to store build artifact: {:?}", e);
            })?;
        if put_result.sha256_hash != digests.sha256 || put_result.size_bytes != size_bytes {
            error!(
                build_id = build_id.get(),
                expected = %digests.sha256,
                stored = %put_result.sha256_hash,
                expected_size = size_bytes,
                stored_size = put_result.size_bytes,
                "stored artifact does not match the uploaded bytes"
            );
            return Err(RegistryError::Internal(anyhow!(
                "stored artifact for build {} does not match the uploaded bytes",
                build_id
            )));
        }

        let md5 = digests.md5.clone();
        self.write(StateMachineUpdateRequest {
            payload: RequestPayload::FinalizeBuild(FinalizeBuildRequest {
                build_id,
                digests,
                size_bytes,
            }),
        })
        .await?;
        info!(build_id = build_id.get(), %md5, size_bytes, "build finalized");
        Ok(())
    }

    /// A rolled back transaction left nothing behind, so lock timeouts and
    /// detected deadlocks are retried.
    async fn write(
        &self,
        request: StateMachineUpdateRequest,
    ) -> Result<WriteOutcome, state_store::Error> {
        let mut attempt = 1;
        loop {
            match self.registry_state.write(request.clone()).await {
                Err(e) if e.is_contention() && attempt < MAX_WRITE_ATTEMPTS => {
                    warn!(
                        request_type = %request.payload,
                        attempt,
                        "state store write contended, retrying: {}",
                        e
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
