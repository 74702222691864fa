use std::{env, fmt::Debug, net::SocketAddr, path::Path};

use anyhow::{anyhow, Result};
use blob_store::BlobStorageConfig;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

const LOCAL_ENV: &str = "local";
pub const ENV_PREFIX: &str = "REGISTRY_";
pub const DEFAULT_API_PREFIX: &str = "/v2";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub env: String,
    pub state_store_path: String,
    pub listen_addr: String,
    pub blob_storage: BlobStorageConfig,
    /// Shared key that `Authorization` must carry for create and upload.
    pub create_key: String,
    /// Every api route is mounted under this path.
    pub api_prefix: String,
    pub max_upload_bytes: usize,
    pub openapi: OpenApiConfig,
    pub structured_logging: bool,
    pub instance_id: Option<String>,
    pub telemetry: TelemetryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let state_store_path = env::current_dir()
            .unwrap_or_default()
            .join("registry_storage/state");
        ServerConfig {
            env: LOCAL_ENV.to_string(),
            state_store_path: state_store_path.to_string_lossy().to_string(),
            listen_addr: "0.0.0.0:8900".to_string(),
            blob_storage: Default::default(),
            create_key: String::new(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            openapi: Default::default(),
            structured_logging: false,
            instance_id: None,
            telemetry: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenApiConfig {
    pub title: String,
    /// Public url of the server, advertised in the openapi document.
    pub url: Option<String>,
}

impl Default for OpenApiConfig {
    fn default() -> Self {
        Self {
            title: "Artifact Registry".to_string(),
            url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelemetryConfig {
    // Export spans over otlp.
    pub enable_tracing: bool,
    // Collector endpoint, the exporter default when unset.
    pub endpoint: Option<String>,
}

impl ServerConfig {
    /// Defaults, then the yaml file if any, then `REGISTRY_` prefixed
    /// environment variables (`REGISTRY_BLOB_STORAGE__PATH` for nested keys).
    pub fn load(path: Option<&Path>) -> Result<ServerConfig> {
        let mut figment = Figment::from(Serialized::defaults(ServerConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file_exact(path));
        }
        let mut config: ServerConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        let env = config.env.clone();
        config
            .instance_id
            .get_or_insert_with(|| format!("{}-{}", env, nanoid::nanoid!()));
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.create_key.is_empty() {
            return Err(anyhow!("create_key must be set"));
        }
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(anyhow!("invalid listen address: {}", self.listen_addr));
        }
        if !self.api_prefix.starts_with('/') || self.api_prefix.ends_with('/') {
            return Err(anyhow!(
                "api_prefix must start with '/' and must not end with '/': {}",
                self.api_prefix
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(anyhow!("max_upload_bytes must be greater than 0"));
        }
        Ok(())
    }

    pub fn structured_logging(&self) -> bool {
        self.structured_logging
    }

    /// Set once by `load`; an unloaded config falls back to its env.
    pub fn instance_id(&self) -> &str {
        self.instance_id.as_deref().unwrap_or(&self.env)
    }
}
