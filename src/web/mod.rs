//! Web layer: the HTTP surface described in §4.1/§6: intake, status,
//! download delegation, metadata, and the synchronous edit operations.
//!
//! Handlers are kept thin: they validate input, delegate to the
//! repositories/stores/services on [`AppState`], and map domain errors onto
//! HTTP responses through [`AppError`]'s `IntoResponse` impl.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::database::artifacts::ArtifactRepository;
use crate::database::queue::QueueRepository;
use crate::database::tasks::TaskRepository;
use crate::database::Database;
use crate::logo_assets::LogoAssetService;
use crate::storage::{ArtifactStore, IntakeStore, WorkspaceStore};
use crate::tokens::TokenService;

pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod multipart;
pub mod responses;

pub use extractors::RequestContext;

/// State shared across every handler. Everything here is cheaply `Clone`:
/// connection pools, `Arc`s, or handles into the sandboxed file managers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub database: Database,
    pub task_repo: TaskRepository,
    pub queue_repo: QueueRepository,
    pub artifacts: ArtifactStore,
    pub workspace: WorkspaceStore,
    pub intake: IntakeStore,
    pub logo_assets: LogoAssetService,
    pub tokens: TokenService,
    pub rate_limiter: middleware::RateLimiter,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        database: Database,
        task_repo: TaskRepository,
        queue_repo: QueueRepository,
        artifacts: ArtifactStore,
        workspace: WorkspaceStore,
        intake: IntakeStore,
        logo_assets: LogoAssetService,
        tokens: TokenService,
    ) -> Self {
        Self {
            config,
            database,
            task_repo,
            queue_repo,
            artifacts,
            workspace,
            intake,
            logo_assets,
            tokens,
            rate_limiter: middleware::RateLimiter::new(),
        }
    }

    /// Convenience constructor pulling repositories off a shared pool,
    /// mirroring how the stores/services are otherwise assembled directly
    /// from a `Database`'s connection pool.
    pub fn from_database(
        config: Arc<Config>,
        database: Database,
        artifacts: ArtifactStore,
        workspace: WorkspaceStore,
        intake: IntakeStore,
        logo_assets: LogoAssetService,
        tokens: TokenService,
    ) -> Self {
        let pool = database.pool().clone();
        Self::new(
            config,
            database,
            TaskRepository::new(pool.clone()),
            QueueRepository::new(pool),
            artifacts,
            workspace,
            intake,
            logo_assets,
            tokens,
        )
    }
}

fn build_router(state: AppState) -> Router {
    let cors_layer = middleware::build_cors_layer(&state.config.cors);

    let submit_routes = Router::new()
        .route("/remote", post(handlers::submit::remote))
        .route("/upload", post(handlers::submit::upload))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), middleware::rate_limit_submit));

    let download_only_routes = Router::new()
        .route("/download-only", post(handlers::submit::download_only))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), middleware::rate_limit_download_only));

    let edit_routes = Router::new()
        .route("/cut", post(handlers::edit::cut))
        .route("/embed-subtitles", post(handlers::edit::embed_subtitles))
        .route("/merge", post(handlers::edit::merge))
        .route("/add-logo", post(handlers::edit::add_logo))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), middleware::rate_limit_submit));

    let download_routes = Router::new()
        .route("/download/:filename", get(handlers::download::download_by_path))
        .route("/download-with-token/:token", get(handlers::download::download_with_token))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), middleware::rate_limit_default));

    // Status and metadata endpoints are exempt from rate limiting by never
    // receiving a `rate_limit_*` layer (§4.1).
    let exempt_routes = Router::new()
        .route("/status/:task_id", get(handlers::status::status))
        .route("/languages", get(handlers::metadata::languages))
        .route("/models", get(handlers::metadata::models))
        .route("/translation-services", get(handlers::metadata::translation_services))
        .route("/features", get(handlers::metadata::features))
        .route("/health", get(handlers::metadata::health))
        .route("/health/deps", get(handlers::metadata::health_deps));

    Router::new()
        .merge(submit_routes)
        .merge(download_only_routes)
        .merge(edit_routes)
        .merge(download_routes)
        .merge(exempt_routes)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Thin wrapper bundling the bound router with its socket address, mirroring
/// how this service's components elsewhere separate "build" from "run".
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(state: AppState) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", state.config.web.host, state.config.web.port).parse()?;
        let app = build_router(state);
        Ok(Self { app, addr })
    }

    pub async fn serve(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        tracing::info!(addr = %self.addr, "web server listening");
        axum::serve(listener, self.app).await?;
        Ok(())
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}
