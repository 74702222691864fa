use data_model::BuildId;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("build {build} already exists for {project}/{version}")]
    BuildAlreadyExists {
        project: String,
        version: String,
        build: String,
    },

    #[error("pending build {build_id} not found")]
    PendingBuildNotFound { build_id: BuildId },

    #[error("failed to get column family handle for {name}")]
    MissingColumnFamily { name: String },

    #[error("Failed to decode a serialized record. error: {}", source)]
    JsonDecoderFailed { source: anyhow::Error },

    #[error("Failed to encode a new serialized record. error: {}", source)]
    JsonEncoderFailed { source: anyhow::Error },

    #[error(transparent)]
    RocksDBFailure {
        #[from]
        source: rocksdb::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Lock waits that timed out, deadlocks and write conflicts. The
    /// transaction was rolled back and may be retried by the caller.
    pub fn is_contention(&self) -> bool {
        match self {
            Self::RocksDBFailure { source } => matches!(
                source.kind(),
                rocksdb::ErrorKind::Busy | rocksdb::ErrorKind::TimedOut | rocksdb::ErrorKind::TryAgain
            ),
            _ => false,
        }
    }
}
