use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::Method,
    middleware,
    routing::{get, post},
    Router,
};
use blob_store::BlobStorage;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth,
    catalog::Catalog,
    config::{ServerConfig, DEFAULT_API_PREFIX},
    http_objects::{
        Build,
        BuildResult,
        Builds,
        Commit,
        CreateBuild,
        CreateBuildResponse,
        Project,
        ProjectList,
        RegistryAPIError,
        UploadBuildResponse,
        Version,
    },
    ingest::BuildIngestor,
    middleware::InstanceRequestSpan,
};

mod browse;
mod create;
mod download;

use browse::{get_build, get_project, get_version, list_projects};
use create::{create_build, upload_build};
use download::download_build;

#[derive(OpenApi)]
#[openapi(
        paths(
            create::create_build,
            create::upload_build,
            browse::list_projects,
            browse::get_project,
            browse::get_version,
            browse::get_build,
            download::download_build,
        ),
        components(
            schemas(
                CreateBuild,
                CreateBuildResponse,
                UploadBuildResponse,
                BuildResult,
                Commit,
                ProjectList,
                Project,
                Version,
                Builds,
                Build,
                RegistryAPIError,
            )
        ),
        tags(
            (name = "create", description = "Build creation and upload"),
            (name = "browse", description = "Read only catalog of ready builds"),
        )
    )]
struct ApiDoc;

/// The openapi document with paths moved under the configured prefix.
pub fn api_doc(config: &ServerConfig) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = config.openapi.title.clone();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    if let Some(url) = &config.openapi.url {
        doc.servers = Some(vec![utoipa::openapi::Server::new(url)]);
    }
    if config.api_prefix != DEFAULT_API_PREFIX {
        doc.paths.paths = std::mem::take(&mut doc.paths.paths)
            .into_iter()
            .map(|(path, item)| {
                let path = match path.strip_prefix(DEFAULT_API_PREFIX) {
                    Some(rest) => format!("{}{}", config.api_prefix, rest),
                    None => path,
                };
                (path, item)
            })
            .collect();
    }
    doc
}

#[derive(Clone)]
pub struct RouteState {
    pub ingestor: Arc<BuildIngestor>,
    pub catalog: Arc<Catalog>,
    pub blob_storage: Arc<BlobStorage>,
    pub create_key: Arc<str>,
    pub api_prefix: Arc<str>,
}

pub fn create_routes(route_state: RouteState, config: &ServerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any)
        .allow_headers(Any);

    let prefix = config.api_prefix.as_str();

    // Authorization is checked before any body is buffered.
    let create_api = Router::new()
        .route(&format!("{prefix}/create"), post(create_build))
        .route(
            &format!("{prefix}/create/upload/{{build}}"),
            post(upload_build).layer(DefaultBodyLimit::max(config.max_upload_bytes)),
        )
        .route_layer(middleware::from_fn_with_state(
            route_state.clone(),
            auth::require_create_key,
        ))
        .with_state(route_state.clone());

    let browse_api = Router::new()
        .route(prefix, get(list_projects))
        .route(&format!("{prefix}/"), get(list_projects))
        .route(&format!("{prefix}/{{project}}"), get(get_project))
        .route(&format!("{prefix}/{{project}}/{{version}}"), get(get_version))
        .route(
            &format!("{prefix}/{{project}}/{{version}}/{{build}}"),
            get(get_build),
        )
        .route(
            &format!("{prefix}/{{project}}/{{version}}/{{build}}/download"),
            get(download_build),
        )
        .with_state(route_state);

    Router::new()
        .merge(SwaggerUi::new("/docs/swagger").url("/docs/openapi.json", api_doc(config)))
        .route("/", get(index))
        .merge(create_api)
        .merge(browse_api)
        .fallback(route_not_found)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(InstanceRequestSpan::new(&config.env, config.instance_id()))
                .on_failure(()),
        )
        .layer(cors)
}

async fn index() -> String {
    format!(
        "Artifact Registry {} (built {})",
        env!("CARGO_PKG_VERSION"),
        env!("VERGEN_BUILD_TIMESTAMP")
    )
}

async fn route_not_found() -> RegistryAPIError {
    RegistryAPIError::not_found("Route not found")
}
