use std::{env, fmt::Debug, path::PathBuf, sync::Arc};

use anyhow::{anyhow, Result};
use bytes::{Bytes, BytesMut};
use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use object_store::{
    parse_url,
    path::Path,
    ObjectStore,
    ObjectStoreScheme,
    PutPayload,
    WriteMultipart,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use url::Url;

/// Payloads larger than this are written with a multipart upload.
pub const MULTIPART_CHUNK_SIZE: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlobStorageConfig {
    /// `file:///abs/dir`, a bare filesystem path, or any url object_store
    /// understands (`memory:///` for tests).
    pub path: String,
}

impl BlobStorageConfig {
    pub fn new(path: &str) -> Self {
        BlobStorageConfig {
            path: format!("file://{}", path),
        }
    }
}

impl Default for BlobStorageConfig {
    fn default() -> Self {
        let blob_store_path = env::current_dir()
            .unwrap_or_default()
            .join("registry_storage/builds");
        BlobStorageConfig {
            path: format!("file://{}", blob_store_path.to_string_lossy()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PutResult {
    pub size_bytes: u64,
    pub sha256_hash: String,
}

/// Content addressed blob storage. Keys are opaque to the store; callers
/// derive them from the content.
#[derive(Clone)]
pub struct BlobStorage {
    object_store: Arc<dyn ObjectStore>,
    path: Path,
    local_root: Option<PathBuf>,
}

impl Debug for BlobStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStorage")
            .field("path", &self.path)
            .field("local_root", &self.local_root)
            .finish()
    }
}

impl BlobStorage {
    pub fn new(config: BlobStorageConfig) -> Result<Self> {
        let url = normalize_location(&config.path)?;
        let (scheme, _) = ObjectStoreScheme::parse(&url)?;
        let local_root = match scheme {
            ObjectStoreScheme::Local => {
                let root = url
                    .to_file_path()
                    .map_err(|_| anyhow!("invalid local blob store path: {}", url))?;
                std::fs::create_dir_all(&root).map_err(|e| {
                    anyhow!("failed to create blob store dir {:?}: {}", root, e)
                })?;
                Some(root)
            }
            _ => None,
        };
        let (object_store, path) = parse_url(&url)?;
        info!("using blob store path: {}", url);
        Ok(Self {
            object_store: Arc::from(object_store),
            path,
            local_root,
        })
    }

    fn location(&self, key: &str) -> Result<Path> {
        validate_key(key)?;
        Ok(self.path.child(key))
    }

    /// Writes `data` under `key`. The returned sha256 is computed over the
    /// bytes as they were handed to the store.
    pub async fn put(&self, key: &str, data: Bytes) -> Result<PutResult> {
        let location = self.location(key)?;
        let size_bytes = data.len() as u64;
        let mut hasher = Sha256::new();

        if data.len() <= MULTIPART_CHUNK_SIZE {
            hasher.update(&data);
            self.object_store
                .put(&location, PutPayload::from(data))
                .await
                .map_err(|e| anyhow!("failed to put blob {}: {}", key, e))?;
        } else {
            let upload = self
                .object_store
                .put_multipart(&location)
                .await
                .map_err(|e| anyhow!("failed to start multipart put for {}: {}", key, e))?;
            let mut writer = WriteMultipart::new_with_chunk_size(upload, MULTIPART_CHUNK_SIZE);
            for chunk in data.chunks(MULTIPART_CHUNK_SIZE) {
                if let Err(e) = writer.wait_for_capacity(4).await {
                    writer.abort().await.ok();
                    return Err(anyhow!("failed to write blob {}: {}", key, e));
                }
                hasher.update(chunk);
                writer.write(chunk);
            }
            writer
                .finish()
                .await
                .map_err(|e| anyhow!("failed to complete multipart put for {}: {}", key, e))?;
        }

        let sha256_hash = format!("{:x}", hasher.finalize());
        debug!(key, size_bytes, "stored blob");
        Ok(PutResult {
            size_bytes,
            sha256_hash,
        })
    }

    pub async fn get(&self, key: &str) -> Result<BoxStream<'static, Result<Bytes>>> {
        let location = self.location(key)?;
        let get_result = self
            .object_store
            .get(&location)
            .await
            .map_err(|e| anyhow!("can't get blob {:?}: {:?}", key, e))?;
        let key = key.to_string();
        Ok(get_result
            .into_stream()
            .map_err(move |e| anyhow!("error reading blob {:?}: {:?}", key, e))
            .boxed())
    }

    pub async fn read_bytes(&self, key: &str) -> Result<Bytes> {
        let mut reader = self.get(key).await?;
        let mut bytes = BytesMut::new();
        while let Some(chunk) = reader.next().await {
            bytes.extend_from_slice(&chunk?);
        }
        Ok(bytes.into())
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let location = self.location(key)?;
        match self.object_store.head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(anyhow!("can't stat blob {:?}: {:?}", key, e)),
        }
    }

    /// Filesystem path of a blob. Only local stores have one.
    pub fn resolve_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        let root = self
            .local_root
            .as_ref()
            .ok_or(anyhow!("blob store at {} is not a local filesystem", self.path))?;
        Ok(root.join(key))
    }
}

fn normalize_location(location: &str) -> Result<Url> {
    if let Ok(url) = Url::parse(location) {
        if url.scheme().len() > 1 {
            return Ok(url);
        }
    }
    let path = PathBuf::from(location);
    let path = if path.is_absolute() {
        path
    } else {
        env::current_dir()?.join(path)
    };
    Url::from_directory_path(&path)
        .map_err(|_| anyhow!("invalid blob store location: {}", location))
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.contains('/') || key.contains('\\') || key == "." || key == ".." {
        return Err(anyhow!("invalid blob key: {:?}", key));
    }
    Ok(())
}
