use std::sync::Arc;

use anyhow::Result;
use data_model::{
    Build,
    BuildId,
    Project,
    ProjectId,
    Version,
    VersionId,
    ID_KEY_LEN,
};
use rocksdb::{Direction, IteratorMode, ReadOptions, TransactionDB};
use serde::de::DeserializeOwned;

use super::state_machine::RegistryObjectsColumns;
use crate::serializer::{JsonEncode, JsonEncoder};

/// Read side of the metadata store. Every read sees committed data only.
pub struct StateReader {
    db: Arc<TransactionDB>,
}

impl StateReader {
    pub fn new(db: Arc<TransactionDB>) -> Self {
        Self { db }
    }

    fn prefix_iter(
        &self,
        column: &RegistryObjectsColumns,
        key_prefix: &[u8],
    ) -> Result<impl Iterator<Item = Result<(Box<[u8]>, Box<[u8]>), rocksdb::Error>> + '_> {
        let mut read_options = ReadOptions::default();
        read_options.set_readahead_size(4_194_304);
        let mode = if key_prefix.is_empty() {
            IteratorMode::Start
        } else {
            IteratorMode::From(key_prefix, Direction::Forward)
        };
        Ok(self
            .db
            .iterator_cf_opt(column.cf_db(&self.db)?, read_options, mode))
    }

    /// Rows of `column` whose key starts with `key_prefix`, in key order.
    pub fn scan_cf<V>(&self, column: RegistryObjectsColumns, key_prefix: &[u8]) -> Result<Vec<V>>
    where
        V: DeserializeOwned,
    {
        let mut items = Vec::new();
        for kv in self.prefix_iter(&column, key_prefix)? {
            let (key, value) = kv?;
            if !key.starts_with(key_prefix) {
                break;
            }
            items.push(JsonEncoder::decode(&value)?);
        }
        Ok(items)
    }

    /// Walks `index_column` by `key_prefix` and loads the rows the index keys
    /// point at from `data_column`, keeping the ones `filter` accepts. Rows
    /// come back in index key order.
    pub fn join_cf<T, F, K>(
        &self,
        index_column: RegistryObjectsColumns,
        data_column: RegistryObjectsColumns,
        key_prefix: &[u8],
        key_reference: K,
        filter: F,
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
        K: Fn(&[u8]) -> Result<Vec<u8>>,
    {
        let data_cf = data_column.cf_db(&self.db)?;
        let mut lookup_keys = Vec::new();
        for kv in self.prefix_iter(&index_column, key_prefix)? {
            let (key, _) = kv?;
            if !key.starts_with(key_prefix) {
                break;
            }
            lookup_keys.push((data_cf, key_reference(&key)?));
        }

        let mut items = Vec::new();
        for value in self.db.multi_get_cf(lookup_keys) {
            if let Some(value) = value? {
                let item = JsonEncoder::decode::<T>(&value)?;
                if filter(&item) {
                    items.push(item);
                }
            }
        }
        Ok(items)
    }

    /// This method fetches a key from a specific column family
    pub fn get_from_cf<T, K>(&self, column: &RegistryObjectsColumns, key: K) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        K: AsRef<[u8]>,
    {
        let result_bytes = match self.db.get_cf(column.cf_db(&self.db)?, key)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let result = JsonEncoder::decode::<T>(&result_bytes)
            .map_err(|e| anyhow::anyhow!("Deserialization error: {}", e))?;

        Ok(Some(result))
    }

    fn get_index_entry<K: AsRef<[u8]>>(
        &self,
        column: &RegistryObjectsColumns,
        key: K,
    ) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get_cf(column.cf_db(&self.db)?, key)?)
    }

    pub fn all_projects(&self) -> Result<Vec<Project>> {
        self.scan_cf(RegistryObjectsColumns::Projects, &[])
    }

    pub fn project_by_name(&self, name: &str) -> Result<Option<Project>> {
        let Some(id) =
            self.get_index_entry(&RegistryObjectsColumns::ProjectNames, Project::name_key_from(name))?
        else {
            return Ok(None);
        };
        self.get_from_cf(&RegistryObjectsColumns::Projects, ProjectId::from_key(&id)?.to_key())
    }

    /// Versions of a project in creation order.
    pub fn project_versions(&self, project_id: ProjectId) -> Result<Vec<Version>> {
        self.join_cf(
            RegistryObjectsColumns::ProjectVersions,
            RegistryObjectsColumns::Versions,
            &project_id.to_key(),
            child_key,
            |_: &Version| true,
        )
    }

    /// Looks a version up within its project only.
    pub fn version_by_name(&self, project_id: ProjectId, name: &str) -> Result<Option<Version>> {
        let Some(id) = self.get_index_entry(
            &RegistryObjectsColumns::VersionNames,
            Version::name_key_from(project_id, name),
        )?
        else {
            return Ok(None);
        };
        self.get_from_cf(&RegistryObjectsColumns::Versions, VersionId::from_key(&id)?.to_key())
    }

    pub fn build_by_id(&self, build_id: BuildId) -> Result<Option<Build>> {
        self.get_from_cf(&RegistryObjectsColumns::Builds, build_id.to_key())
    }

    /// Build of a version by label, ready or not.
    pub fn build_by_label(&self, version_id: VersionId, label: &str) -> Result<Option<Build>> {
        let Some(id) = self.get_index_entry(
            &RegistryObjectsColumns::BuildLabels,
            Build::label_key_from(version_id, label),
        )?
        else {
            return Ok(None);
        };
        self.build_by_id(BuildId::from_key(&id)?)
    }

    /// Ready builds of a version ordered by ascending build id.
    pub fn ready_builds(&self, version_id: VersionId) -> Result<Vec<Build>> {
        self.join_cf(
            RegistryObjectsColumns::VersionBuilds,
            RegistryObjectsColumns::Builds,
            &version_id.to_key(),
            child_key,
            |build: &Build| build.ready,
        )
    }
}

/// Second id of a `<parent><child>` index key.
fn child_key(key: &[u8]) -> Result<Vec<u8>> {
    key.get(ID_KEY_LEN..ID_KEY_LEN * 2)
        .map(|child| child.to_vec())
        .ok_or(anyhow::anyhow!("invalid index key of length {}", key.len()))
}
