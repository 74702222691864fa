use anyhow::Result;
use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use blob_store::BlobStorageConfig;
use http_body_util::BodyExt;
use tower::ServiceExt;
use tracing::subscriber;
use tracing_subscriber::{layer::SubscriberExt, Layer};

use crate::{config::ServerConfig, service::Service};

pub const TEST_CREATE_KEY: &str = "test-key";

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

pub struct TestService {
    pub service: Service,
    _temp_dir: tempfile::TempDir,
}

impl TestService {
    pub async fn new() -> Result<Self> {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut ServerConfig)) -> Result<Self> {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
        let _ = subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_filter(env_filter)),
        );

        let temp_dir = tempfile::tempdir()?;

        let mut cfg = ServerConfig {
            state_store_path: temp_dir
                .path()
                .join("state_store")
                .to_str()
                .unwrap()
                .to_string(),
            blob_storage: BlobStorageConfig::new(
                temp_dir.path().join("blob_store").to_str().unwrap(),
            ),
            create_key: TEST_CREATE_KEY.to_string(),
            instance_id: Some("test".to_string()),
            ..Default::default()
        };
        customize(&mut cfg);
        cfg.validate()?;
        let srv = Service::new(cfg).await?;

        Ok(Self {
            service: srv,
            _temp_dir: temp_dir,
        })
    }

    pub fn router(&self) -> Router {
        self.service.routes()
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        authorization: Option<&str>,
        body: impl Into<Body>,
    ) -> Result<TestResponse> {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(authorization) = authorization {
            request = request.header(header::AUTHORIZATION, authorization);
        }
        let response = self.router().oneshot(request.body(body.into())?).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await?.to_bytes();
        Ok(TestResponse {
            status,
            headers,
            body,
        })
    }

    pub async fn get(&self, uri: &str) -> Result<TestResponse> {
        self.request(Method::GET, uri, None, Body::empty()).await
    }

    /// Posts a json create body with the test key.
    pub async fn create(&self, body: serde_json::Value) -> Result<TestResponse> {
        self.request(
            Method::POST,
            "/v2/create",
            Some(TEST_CREATE_KEY),
            body.to_string(),
        )
        .await
    }

    /// Posts raw bytes to an upload url with the test key.
    pub async fn upload(&self, url: &str, data: &'static [u8]) -> Result<TestResponse> {
        self.request(Method::POST, url, Some(TEST_CREATE_KEY), data)
            .await
    }
}

pub fn create_body(project: &str, version: &str, build: &str) -> serde_json::Value {
    serde_json::json!({
        "project": project,
        "version": version,
        "build": build,
        "result": "SUCCESS",
        "timestamp": 1_700_000_000_000u64,
        "duration": 42,
        "fileExtension": "zip",
        "commits": [{
            "author": "Ada",
            "email": "ada@example.com",
            "description": "Fix the build",
            "hash": "0123abcd",
            "timestamp": 1_699_999_999_000u64,
        }],
        "flags": ["nightly"],
    })
}
