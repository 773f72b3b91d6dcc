use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediasub::config::Config;
use mediasub::database::artifacts::ArtifactRepository;
use mediasub::database::logo_assets::LogoAssetRepository;
use mediasub::database::queue::QueueRepository;
use mediasub::database::tasks::TaskRepository;
use mediasub::database::tokens::TokenRepository;
use mediasub::database::Database;
use mediasub::logo_assets::LogoAssetService;
use mediasub::models::QueueKind;
use mediasub::pipeline::engine::{self, PipelineDeps};
use mediasub::pipeline::transcribe::ModelCache;
use mediasub::scheduler::Scheduler;
use mediasub::storage::{ArtifactStore, IntakeStore, WorkspaceStore};
use mediasub::tokens::TokenService;
use mediasub::web::{AppState, WebServer};

/// Asynchronous media transcription, translation and subtitling service.
#[derive(Parser)]
#[command(name = "mediasub")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Media transcription, translation and subtitling pipeline service")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

/// How long a worker holds a claimed queue entry before another worker is
/// allowed to retry it, absent an ack (§4.6 "at-least-once delivery").
const QUEUE_VISIBILITY_TIMEOUT_S: i64 = 60;

/// How long an idle worker sleeps between empty `claim_next` polls.
const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("mediasub={}", cli.log_level);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting mediasub v{}", env!("CARGO_PKG_VERSION"));

    std::env::set_var("CONFIG_FILE", &cli.config);
    let mut config = Config::load()?;
    tracing::info!(config_file = %cli.config, "configuration loaded");

    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }
    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }
    if !config.cors.is_valid() {
        anyhow::bail!("invalid cors configuration: a wildcard origin cannot be combined with allow_credentials");
    }
    let config = Arc::new(config);

    let database = Database::new(&config.database).await?;
    database.migrate().await?;
    tracing::info!(database_url = %config.database.url, "database connected and migrated");
    let pool = database.pool().clone();

    let task_repo = TaskRepository::new(pool.clone());
    let queue_repo = QueueRepository::new(pool.clone());
    let artifact_repo = ArtifactRepository::new(pool.clone());
    let logo_asset_repo = LogoAssetRepository::new(pool.clone());
    let token_repo = TokenRepository::new(pool.clone());

    let workspace = WorkspaceStore::new(config.storage.workspace_path.clone()).await?;
    let intake = IntakeStore::new(config.storage.intake_path.clone()).await?;
    let artifacts = ArtifactStore::new(
        config.storage.artifacts_path.clone(),
        artifact_repo,
        config.storage.artifact_retention_hours,
    )
    .await?;
    let logo_assets = LogoAssetService::new(config.storage.uploaded_logo_path.clone(), logo_asset_repo).await?;

    // The signing key is an opaque byte string handed straight to HMAC-SHA256,
    // which accepts keys of any length; no hex decoding is needed.
    let signing_key = config.tokens.signing_key_hex.as_bytes().to_vec();
    let tokens = TokenService::new(token_repo, signing_key, config.tokens.ttl_seconds);

    let app_state = AppState::from_database(
        config.clone(),
        database.clone(),
        artifacts.clone(),
        workspace.clone(),
        intake.clone(),
        logo_assets.clone(),
        tokens,
    );

    let pipeline_deps = PipelineDeps {
        config: config.pipeline.clone(),
        stats_dir: config.storage.stats_path.clone(),
        task_repo: task_repo.clone(),
        workspace: workspace.clone(),
        artifacts,
        intake,
        logo_assets: logo_assets.clone(),
        model_cache: ModelCache::new(),
    };

    let scheduler = Scheduler::new(
        config.pipeline.retention_sweep_cron.clone(),
        config.storage.artifact_retention_hours,
        config.storage.logo_unreferenced_retention_days,
        task_repo.clone(),
        pipeline_deps.artifacts.clone(),
        logo_assets,
        workspace,
    );
    tokio::spawn(async move {
        if let Err(e) = scheduler.run().await {
            tracing::error!(error = %e, "retention scheduler exited");
        }
    });

    for worker_index in 0..config.pipeline.max_concurrent_jobs.max(1) {
        let deps = pipeline_deps.clone();
        let queue_repo = queue_repo.clone();
        let worker_id = format!("worker-{worker_index}");
        tokio::spawn(worker_loop(worker_id, deps, queue_repo));
    }
    tracing::info!(workers = config.pipeline.max_concurrent_jobs, "worker pool started");

    let web_server = WebServer::new(app_state)?;
    tracing::info!(host = %web_server.host(), port = web_server.port(), "starting web server");
    web_server.serve().await?;

    Ok(())
}

/// One worker's lifetime: claim, run, ack/release, repeat forever. A job
/// that fails unrecoverably still gets acked, since the Task Record (not
/// the queue) is the durable record of that outcome (§4.6.8, §5).
async fn worker_loop(worker_id: String, deps: PipelineDeps, queue_repo: QueueRepository) {
    loop {
        let claimed = queue_repo
            .claim_next(QueueKind::Processing, &worker_id, chrono::Duration::seconds(QUEUE_VISIBILITY_TIMEOUT_S))
            .await;

        let entry = match claimed {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                tokio::time::sleep(WORKER_POLL_INTERVAL).await;
                continue;
            }
            Err(e) => {
                tracing::error!(worker = %worker_id, error = %e, "failed to claim queue entry");
                tokio::time::sleep(WORKER_POLL_INTERVAL).await;
                continue;
            }
        };

        match engine::run_task(&deps, entry.task_id).await {
            Ok(()) => {
                if let Err(e) = queue_repo.ack(entry.entry_id).await {
                    tracing::error!(worker = %worker_id, error = %e, "failed to ack queue entry");
                }
            }
            Err(e) => {
                tracing::error!(worker = %worker_id, task_id = %entry.task_id, error = %e, "task run failed infrastructurally");
                queue_repo.release(entry.entry_id).await.ok();
            }
        }
    }
}
