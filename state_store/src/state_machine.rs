use std::sync::Arc;

use anyhow::Result;
use data_model::{Build, BuildId, Project, ProjectId, Version, VersionId, ID_KEY_LEN};
use registry_utils::OptionInspectNone;
use rocksdb::{ColumnFamily, Transaction, TransactionDB};
use strum::AsRefStr;
use tracing::{debug, info};

use super::serializer::{JsonEncode, JsonEncoder};
use crate::{
    error::Error,
    requests::{CreateBuildRequest, FinalizeBuildRequest, WriteOutcome},
};

#[derive(AsRefStr, strum::Display, strum::EnumIter)]
pub enum RegistryObjectsColumns {
    StateMachineMetadata, //  StateMachineMetadata, id sequences

    Projects, //  ProjectId -> Project
    Versions, //  VersionId -> Version
    Builds,   //  BuildId -> Build

    ProjectNames, //  Name -> ProjectId
    VersionNames, //  ProjectId_Name -> VersionId
    BuildLabels,  //  VersionId_Label -> BuildId

    ProjectVersions, //  ProjectId_VersionId -> Empty
    VersionBuilds,   //  VersionId_BuildId -> Empty
}

impl RegistryObjectsColumns {
    pub fn cf_db<'a>(&self, db: &'a TransactionDB) -> Result<&'a ColumnFamily, Error> {
        db.cf_handle(self.as_ref())
            .inspect_none(|| {
                tracing::error!("failed to get column family handle for {}", self.as_ref());
            })
            .ok_or(Error::MissingColumnFamily {
                name: self.to_string(),
            })
    }
}

/// Keys of the per table id sequences in `StateMachineMetadata`.
#[derive(AsRefStr, strum::Display, Clone, Copy)]
#[strum(serialize_all = "snake_case")]
pub enum IdSequence {
    NextProjectId,
    NextVersionId,
    NextBuildId,
}

pub const SM_META_KEY: &[u8] = b"sm_meta";

fn encode<T: serde::Serialize + std::fmt::Debug>(value: &T) -> Result<Vec<u8>, Error> {
    JsonEncoder::encode(value).map_err(|source| Error::JsonEncoderFailed { source })
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, Error> {
    JsonEncoder::decode(bytes).map_err(|source| Error::JsonDecoderFailed { source })
}

/// Concatenation of two fixed width ids. Iterating a `<parent><child>` index
/// by parent prefix yields children in id order.
pub fn pair_key(parent: [u8; ID_KEY_LEN], child: [u8; ID_KEY_LEN]) -> Vec<u8> {
    let mut key = Vec::with_capacity(ID_KEY_LEN * 2);
    key.extend_from_slice(&parent);
    key.extend_from_slice(&child);
    key
}

/// Ids start at 1. The sequence row is locked for the rest of the transaction.
fn next_id(
    db: &TransactionDB,
    txn: &Transaction<TransactionDB>,
    seq: IdSequence,
) -> Result<u64, Error> {
    let cf = RegistryObjectsColumns::StateMachineMetadata.cf_db(db)?;
    let next = match txn.get_for_update_cf(cf, seq.as_ref(), true)? {
        Some(bytes) => {
            let bytes: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                Error::Other(anyhow::anyhow!("invalid length for id sequence {}", seq))
            })?;
            u64::from_be_bytes(bytes)
        }
        None => 1,
    };
    txn.put_cf(cf, seq.as_ref(), (next + 1).to_be_bytes())?;
    Ok(next)
}

fn lookup_index(
    db: &TransactionDB,
    txn: &Transaction<TransactionDB>,
    column: RegistryObjectsColumns,
    key: &[u8],
) -> Result<Option<Vec<u8>>, Error> {
    let cf = column.cf_db(db)?;
    // Locks the index entry even when it does not exist yet, so a competing
    // create for the same name waits for this transaction.
    Ok(txn.get_for_update_cf(cf, key, true)?)
}

fn get_or_create_project(
    db: &TransactionDB,
    txn: &Transaction<TransactionDB>,
    name: &str,
) -> Result<(ProjectId, bool), Error> {
    let name_key = Project::name_key_from(name);
    if let Some(id) = lookup_index(db, txn, RegistryObjectsColumns::ProjectNames, &name_key)? {
        return Ok((ProjectId::from_key(&id)?, false));
    }
    let project = Project::new(
        ProjectId::new(next_id(db, txn, IdSequence::NextProjectId)?),
        name.to_string(),
    );
    txn.put_cf(
        RegistryObjectsColumns::Projects.cf_db(db)?,
        project.key(),
        encode(&project)?,
    )?;
    txn.put_cf(
        RegistryObjectsColumns::ProjectNames.cf_db(db)?,
        project.name_key(),
        project.key(),
    )?;
    info!(project = name, project_id = project.id.get(), "created project");
    Ok((project.id, true))
}

fn get_or_create_version(
    db: &TransactionDB,
    txn: &Transaction<TransactionDB>,
    project_id: ProjectId,
    name: &str,
) -> Result<(VersionId, bool), Error> {
    let name_key = Version::name_key_from(project_id, name);
    if let Some(id) = lookup_index(db, txn, RegistryObjectsColumns::VersionNames, &name_key)? {
        return Ok((VersionId::from_key(&id)?, false));
    }
    let version = Version::new(
        VersionId::new(next_id(db, txn, IdSequence::NextVersionId)?),
        project_id,
        name.to_string(),
    );
    txn.put_cf(
        RegistryObjectsColumns::Versions.cf_db(db)?,
        version.key(),
        encode(&version)?,
    )?;
    txn.put_cf(
        RegistryObjectsColumns::VersionNames.cf_db(db)?,
        version.name_key(),
        version.key(),
    )?;
    txn.put_cf(
        RegistryObjectsColumns::ProjectVersions.cf_db(db)?,
        pair_key(project_id.to_key(), version.key()),
        b"",
    )?;
    info!(
        project_id = project_id.get(),
        version = name,
        version_id = version.id.get(),
        "created version"
    );
    Ok((version.id, true))
}

/// Project upsert, version upsert and build insert in one transaction.
pub(crate) fn create_build(
    db: Arc<TransactionDB>,
    txn: &Transaction<TransactionDB>,
    req: &CreateBuildRequest,
) -> Result<WriteOutcome, Error> {
    let new_build = &req.new_build;
    let (project_id, project_created) = get_or_create_project(&db, txn, &new_build.project)?;
    let (version_id, version_created) =
        get_or_create_version(&db, txn, project_id, &new_build.version)?;

    let label_key = Build::label_key_from(version_id, &new_build.build);
    if lookup_index(&db, txn, RegistryObjectsColumns::BuildLabels, &label_key)?.is_some() {
        return Err(Error::BuildAlreadyExists {
            project: new_build.project.clone(),
            version: new_build.version.clone(),
            build: new_build.build.clone(),
        });
    }

    let build_id = BuildId::new(next_id(&db, txn, IdSequence::NextBuildId)?);
    let build = new_build.clone().into_build(build_id, version_id)?;
    txn.put_cf(
        RegistryObjectsColumns::Builds.cf_db(&db)?,
        build.key(),
        encode(&build)?,
    )?;
    txn.put_cf(
        RegistryObjectsColumns::BuildLabels.cf_db(&db)?,
        label_key,
        build.key(),
    )?;
    txn.put_cf(
        RegistryObjectsColumns::VersionBuilds.cf_db(&db)?,
        pair_key(version_id.to_key(), build.key()),
        b"",
    )?;
    debug!(build_id = build.id.get(), "inserted pending build");
    Ok(WriteOutcome::BuildCreated {
        build,
        project_created,
        version_created,
    })
}

/// The Pending -> Ready transition. A build that is missing or already
/// ready is reported as not found and nothing is written.
pub(crate) fn finalize_build(
    db: Arc<TransactionDB>,
    txn: &Transaction<TransactionDB>,
    req: &FinalizeBuildRequest,
) -> Result<WriteOutcome, Error> {
    let cf = RegistryObjectsColumns::Builds.cf_db(&db)?;
    let mut build: Build = match txn.get_for_update_cf(cf, req.build_id.to_key(), true)? {
        Some(bytes) => decode(&bytes)?,
        None => {
            return Err(Error::PendingBuildNotFound {
                build_id: req.build_id,
            })
        }
    };
    if build.ready {
        return Err(Error::PendingBuildNotFound {
            build_id: req.build_id,
        });
    }
    build.mark_ready(req.digests.clone(), req.size_bytes)?;
    txn.put_cf(cf, build.key(), encode(&build)?)?;
    Ok(WriteOutcome::BuildFinalized { build })
}

pub(crate) fn write_sm_meta(
    db: &TransactionDB,
    txn: &Transaction<TransactionDB>,
    sm_meta: &data_model::StateMachineMetadata,
) -> Result<(), Error> {
    txn.put_cf(
        RegistryObjectsColumns::StateMachineMetadata.cf_db(db)?,
        SM_META_KEY,
        encode(sm_meta)?,
    )?;
    Ok(())
}

pub(crate) fn read_sm_meta(
    db: &TransactionDB,
) -> Result<Option<data_model::StateMachineMetadata>, Error> {
    let cf = RegistryObjectsColumns::StateMachineMetadata.cf_db(db)?;
    match db.get_cf(cf, SM_META_KEY)? {
        Some(bytes) => Ok(Some(decode(&bytes)?)),
        None => Ok(None),
    }
}
