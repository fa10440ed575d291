//! # pingate: upload gateway for IPFS with reliable pinning
//!
//! `pingate` accepts file uploads over HTTP, stores them on an IPFS node through the Kubo RPC
//! API, makes sure the stored content is pinned, and serves files back by content identifier.
//!
//! ## Request Flow
//!
//! An upload passes through API key authentication and upload admission control, then the
//! multipart body is decoded into [`types::UploadRequest`]s. The [`upload::UploadService`] checks
//! each file against the extension and media type allow-lists ([`validation`]), adds it to the
//! store and hands the returned content identifier to the [`pinning::Pinner`].
//!
//! Pinning is where most of the care goes. A freshly added block is only kept by the node if it
//! is pinned, and pin calls against a loaded node fail transiently. The pinner therefore probes
//! the current pin state (an already pinned identifier is never pinned again), then retries
//! `pin/add` with a configurable backoff. Running out of attempts does not fail the upload: the
//! client gets the identifier with `pinned: false`.
//!
//! Batch uploads validate every file before storing any of them, then process the files
//! concurrently and report one result per file in upload order. A file the node refuses to store
//! is reported on its own without failing its siblings.
//!
//! Downloads ([`retrieval`]) stat the identifier, refuse anything that is not a file, and stream
//! the content back with a content type derived from the file extension.
//!
//! ## Components
//!
//! - [`store`]: the [`store::ContentStore`] capability and its Kubo implementation
//! - [`pinning`]: probe-then-retry pinning with pluggable [`pinning::Backoff`] strategies
//! - [`upload`], [`validation`], [`retrieval`]: the upload and download flows
//! - [`api`], [`auth`], [`openapi`]: the HTTP surface
//! - [`config`], [`errors`], [`telemetry`], [`limits`]: configuration, error mapping, tracing
//!   and admission control
//!
//! ## Getting Started
//!
//! ```bash
//! # Kubo RPC on localhost:5001, one API key
//! PINGATE_AUTH__API_KEYS='[my-key]' pingate -f config.yaml
//!
//! curl -H 'x-api-key: my-key' -F file=@logo.png http://localhost:3000/upload
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod limits;
pub mod openapi;
pub mod pinning;
pub mod retrieval;
pub mod store;
pub mod telemetry;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod upload;
pub mod validation;

#[cfg(test)]
mod test;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{self, HeaderName, HeaderValue},
    middleware::from_fn_with_state,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;

use crate::{
    config::CorsOrigin,
    limits::Limiters,
    openapi::ApiDoc,
    store::{ContentStore, KuboStore},
    upload::UploadService,
};

/// Room for multipart boundaries and part headers on top of the file bytes themselves.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Shared state handed to every request handler.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .store(store)
///     .uploads(uploads)
///     .limiters(limiters)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn ContentStore>,
    pub uploads: UploadService,
    #[builder(default)]
    pub limiters: Limiters,
}

impl AppState {
    /// Wire the upload service and limiters for `config` around `store`.
    pub fn from_config(config: Config, store: Arc<dyn ContentStore>) -> Self {
        AppState::builder()
            .uploads(UploadService::from_config(store.clone(), &config))
            .limiters(Limiters::new(&config.limits))
            .store(store)
            .config(config)
            .build()
    }
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    // tower-http rejects `*` inside an origin list, so a wildcard anywhere allows any origin
    let allow_origin = if config.cors.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let origins = config
            .cors
            .allowed_origins
            .iter()
            .filter_map(|origin| match origin {
                CorsOrigin::Url(url) => Some(url),
                CorsOrigin::Wildcard => None,
            })
            // Browsers send origins without a trailing slash
            .map(|url| url.as_str().trim_end_matches('/').parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(origins)
    };

    let headers = config
        .cors
        .allowed_headers
        .iter()
        .map(|name| name.parse::<HeaderName>())
        .collect::<Result<Vec<_>, _>>()?;

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_headers(headers)
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS]);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all routes and middleware.
///
/// Layers, from the outside in: tracing, CORS, optional Prometheus metrics, API key
/// authentication. Every route except `/healthz` requires a key when auth is enabled.
///
/// Upload routes get a body limit sized for `upload.max_files` files of `upload.max_file_size`
/// bytes; the per-file limit itself is enforced while decoding.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let upload = &state.config.upload;
    let body_limit = (upload.max_file_size as usize)
        .saturating_mul(upload.max_files)
        .saturating_add(MULTIPART_OVERHEAD);
    debug!(body_limit, "Upload body limit");

    let upload_routes = Router::new()
        .route("/upload", post(api::handlers::upload::upload_file))
        .route("/upload-multiple", post(api::handlers::upload::upload_multiple))
        .layer(DefaultBodyLimit::max(body_limit));

    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/file/{cid}", get(api::handlers::files::get_file))
        .merge(upload_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .route("/openapi.json", get(|| async { axum::Json(ApiDoc::openapi()) }));

    let prometheus_layer = if state.config.enable_metrics {
        let (layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router.route("/internal/metrics", get(|| async move { metric_handle.render() }));
        Some(layer)
    } else {
        None
    };

    let mut router = router
        .layer(from_fn_with_state(state.clone(), auth::require_api_key))
        .with_state(state.clone());

    if let Some(layer) = prometheus_layer {
        router = router.layer(layer);
    }

    let router = router.layer(create_cors_layer(&state.config)?).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// The running gateway: router plus configuration.
///
/// 1. **Create**: [`Application::new`] connects the Kubo client and builds the router
/// 2. **Serve**: [`Application::serve`] binds the TCP port and handles requests until the
///    shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create an application talking to the Kubo node at `config.ipfs.url`.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting pingate with configuration: {:#?}", config);
        let store = KuboStore::new(&config.ipfs)?;
        Self::new_with_store(config, Arc::new(store))
    }

    /// Create an application around an existing store.
    pub fn new_with_store(config: Config, store: Arc<dyn ContentStore>) -> anyhow::Result<Self> {
        let state = AppState::from_config(config.clone(), store);
        let router = build_router(state)?;
        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(any(test, feature = "test-utils"))]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "pingate listening on http://{}, forwarding to Kubo at {}",
            bind_addr, self.config.ipfs.url
        );

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
