use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{anyhow, Result};
use data_model::StateMachineMetadata;
use requests::{RequestPayload, StateMachineUpdateRequest, WriteOutcome};
use rocksdb::{
    ColumnFamilyDescriptor,
    Options,
    TransactionDB,
    TransactionDBOptions,
    TransactionOptions,
    WriteOptions,
};
use state_machine::RegistryObjectsColumns;
use strum::IntoEnumIterator;
use tracing::{debug, info, span};

pub mod error;
pub mod requests;
pub mod scanner;
pub mod serializer;
pub mod state_machine;
pub mod test_state_store;

pub use error::Error;

pub const DB_VERSION: u64 = 1;

/// Milliseconds a transaction waits for a row lock held by another one.
const TXN_LOCK_TIMEOUT_MS: i64 = 5_000;

pub struct RegistryState {
    pub db: Arc<TransactionDB>,
    pub db_version: u64,
}

impl RegistryState {
    pub async fn new(path: PathBuf) -> Result<Arc<Self>> {
        fs::create_dir_all(path.clone())
            .map_err(|e| anyhow!("failed to create state store dir: {}", e))?;

        let sm_column_families = RegistryObjectsColumns::iter()
            .map(|cf| ColumnFamilyDescriptor::new(cf.to_string(), Options::default()));
        let mut db_opts = Options::default();
        db_opts.create_missing_column_families(true);
        db_opts.create_if_missing(true);
        let mut txn_db_opts = TransactionDBOptions::default();
        txn_db_opts.set_txn_lock_timeout(TXN_LOCK_TIMEOUT_MS);
        let db = Arc::new(
            TransactionDB::open_cf_descriptors(&db_opts, &txn_db_opts, path, sm_column_families)
                .map_err(|e| anyhow!("failed to open db: {}", e))?,
        );

        let sm_meta = match state_machine::read_sm_meta(&db)? {
            Some(sm_meta) if sm_meta.db_version > DB_VERSION => {
                return Err(anyhow!(
                    "state store was written by a newer server, db version {} > {}",
                    sm_meta.db_version,
                    DB_VERSION
                ));
            }
            Some(sm_meta) => sm_meta,
            None => {
                let sm_meta = StateMachineMetadata {
                    db_version: DB_VERSION,
                };
                let txn = db.transaction();
                state_machine::write_sm_meta(&db, &txn, &sm_meta)?;
                txn.commit()?;
                sm_meta
            }
        };
        info!("db version discovered: {}", sm_meta.db_version);

        Ok(Arc::new(Self {
            db,
            db_version: sm_meta.db_version,
        }))
    }

    /// Applies one request in a single pessimistic transaction. Nothing is
    /// committed when an error is returned.
    #[tracing::instrument(
        skip(self, request),
        fields(
            request_type = request.payload.to_string(),
        )
    )]
    pub async fn write(&self, request: StateMachineUpdateRequest) -> Result<WriteOutcome, Error> {
        debug!("writing state machine update request");
        let mut txn_opts = TransactionOptions::default();
        txn_opts.set_deadlock_detect(true);
        let txn = self.db.transaction_opt(&WriteOptions::default(), &txn_opts);
        let outcome = match &request.payload {
            RequestPayload::CreateBuild(create_request) => {
                let _enter = span!(
                    tracing::Level::INFO,
                    "create_build",
                    project = %create_request.new_build.project,
                    version = %create_request.new_build.version,
                    build = %create_request.new_build.build,
                )
                .entered();
                state_machine::create_build(self.db.clone(), &txn, create_request)?
            }
            RequestPayload::FinalizeBuild(finalize_request) => {
                let _enter = span!(
                    tracing::Level::INFO,
                    "finalize_build",
                    build_id = finalize_request.build_id.get(),
                )
                .entered();
                state_machine::finalize_build(self.db.clone(), &txn, finalize_request)?
            }
        };
        // Dropping an uncommitted transaction rolls it back, so every early
        // return above leaves the store untouched.
        txn.commit()?;
        Ok(outcome)
    }

    pub fn reader(&self) -> scanner::StateReader {
        scanner::StateReader::new(self.db.clone())
    }
}
