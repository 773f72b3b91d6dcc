use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
    pub tokens: TokenConfig,
    pub rate_limit: RateLimitConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
    pub max_upload_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `intake/` (§6): uploaded files, ephemeral, written only by the Intake API.
    pub intake_path: PathBuf,
    pub workspace_path: PathBuf,
    pub artifacts_path: PathBuf,
    pub uploaded_logo_path: PathBuf,
    /// `stats/events.jsonl` (§6): append-only terminal-task event log.
    pub stats_path: PathBuf,
    pub artifact_retention_hours: u64,
    pub logo_unreferenced_retention_days: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// How many jobs the worker pool runs concurrently (§4.6, "workers are bounded").
    pub max_concurrent_jobs: usize,
    /// Bounded concurrency for external tool invocations (ffmpeg-equivalent render/extract).
    pub max_concurrent_renders: usize,
    pub soft_timeout_s: u64,
    pub hard_timeout_s: u64,
    /// Paths or names looked up via `which` at startup and reported at `/health/deps`.
    pub download_tool_bin: String,
    pub media_tool_bin: String,
    pub retention_sweep_cron: String,
    /// §4.6.1 streaming overlap: segment batch size and translation fan-out.
    pub translation_batch_size: usize,
    pub translation_parallelism: usize,
    /// §4.6.3 exponential backoff ceiling on translation retries.
    pub translation_max_retries: u32,
    pub translation_backoff_base_s: u64,
    pub translation_backoff_cap_s: u64,
    /// §4.6.2: whether the engine may downgrade a user-chosen model size on OOM.
    pub allow_model_downgrade: bool,
    pub enable_remote_download: bool,
    /// Allow-list of hosts `/remote` and `/download-only` may target (§4.1).
    pub allowed_remote_hosts: Vec<String>,
    /// Extensions accepted by `/upload` (§4.1).
    pub allowed_upload_extensions: Vec<String>,
    pub max_file_size_bytes: u64,
    /// Local speech-to-text CLI invoked by `LocalModel` transcribers.
    pub transcribe_tool_bin: String,
    /// `RemoteApi` transcription provider endpoint, if configured.
    pub remote_transcribe_endpoint: Option<String>,
    /// `PaidApi` / `FreeService` translation provider endpoints.
    pub free_translate_endpoint: Option<String>,
    pub paid_translate_endpoint: Option<String>,
    /// Caps captured subprocess stdout/stderr (§4.6.9 "captured with size caps").
    pub max_subprocess_output_bytes: usize,
    /// Backpressure ceiling on in-flight `processing` queue depth (§5):
    /// submissions beyond this get `503` with `Retry-After` instead of
    /// queuing unboundedly.
    pub queue_depth_ceiling: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub ttl_seconds: u64,
    /// HMAC-SHA256 signing key for download tokens (§4.5), hex-encoded.
    /// Generated once on first run and persisted in the config file; rotating
    /// it invalidates every token issued under the previous value.
    pub signing_key_hex: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Default category (§4.1): status/metadata endpoints are exempt from this.
    pub default_per_minute: u32,
    /// Stricter limit applied to `/remote`, `/upload`, and edit-operation endpoints.
    pub submit_per_minute: u32,
    /// Higher limit for `/download-only`, which runs a shorter pipeline.
    pub download_only_per_minute: u32,
    pub burst: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Empty means no cross-origin browser access; a wildcard entry must
    /// never be combined with credentialed responses (§4.1, §9).
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

impl CorsConfig {
    /// §9: "wildcard origin MUST NOT be combined with credentials".
    pub fn is_valid(&self) -> bool {
        !(self.allow_credentials && self.allowed_origins.iter().any(|o| o == "*"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://./mediasub.db".to_string(),
                max_connections: Some(10),
            },
            web: WebConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                base_url: "http://localhost:8080".to_string(),
                max_upload_bytes: 2 * 1024 * 1024 * 1024,
            },
            storage: StorageConfig {
                intake_path: PathBuf::from("./data/intake"),
                workspace_path: PathBuf::from("./data/workspace"),
                artifacts_path: PathBuf::from("./data/artifacts"),
                uploaded_logo_path: PathBuf::from("./data/logos"),
                stats_path: PathBuf::from("./data/stats"),
                artifact_retention_hours: 24,
                logo_unreferenced_retention_days: 30,
            },
            pipeline: PipelineConfig {
                max_concurrent_jobs: 4,
                max_concurrent_renders: 2,
                soft_timeout_s: 30 * 60,
                hard_timeout_s: 35 * 60,
                download_tool_bin: "yt-dlp".to_string(),
                media_tool_bin: "ffmpeg".to_string(),
                retention_sweep_cron: "0 0 */6 * * *".to_string(),
                translation_batch_size: 20,
                translation_parallelism: 2,
                translation_max_retries: 2,
                translation_backoff_base_s: 1,
                translation_backoff_cap_s: 10,
                allow_model_downgrade: true,
                enable_remote_download: true,
                allowed_remote_hosts: vec![],
                allowed_upload_extensions: vec![
                    "mp4".to_string(),
                    "mkv".to_string(),
                    "mov".to_string(),
                    "webm".to_string(),
                    "avi".to_string(),
                ],
                max_file_size_bytes: 2 * 1024 * 1024 * 1024,
                transcribe_tool_bin: "whisper-cli".to_string(),
                remote_transcribe_endpoint: None,
                free_translate_endpoint: None,
                paid_translate_endpoint: None,
                max_subprocess_output_bytes: 8 * 1024 * 1024,
                queue_depth_ceiling: 200,
            },
            tokens: TokenConfig {
                ttl_seconds: 600,
                signing_key_hex: {
                    use uuid::Uuid;
                    let a = Uuid::new_v4();
                    let b = Uuid::new_v4();
                    format!("{}{}", a.as_simple(), b.as_simple())
                },
            },
            rate_limit: RateLimitConfig {
                default_per_minute: 60,
                submit_per_minute: 10,
                download_only_per_minute: 30,
                burst: 10,
            },
            cors: CorsConfig {
                allowed_origins: vec![],
                allow_credentials: false,
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());

        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(&config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::create_dir_all("./data/intake")?;
            std::fs::create_dir_all("./data/workspace")?;
            std::fs::create_dir_all("./data/artifacts")?;
            std::fs::create_dir_all("./data/logos")?;
            std::fs::create_dir_all("./data/stats")?;
            std::fs::write(&config_file, contents)?;
            Ok(default_config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_wildcard_without_credentials_is_valid() {
        let cors = CorsConfig { allowed_origins: vec!["*".to_string()], allow_credentials: false };
        assert!(cors.is_valid());
    }

    #[test]
    fn cors_wildcard_with_credentials_is_invalid() {
        let cors = CorsConfig { allowed_origins: vec!["*".to_string()], allow_credentials: true };
        assert!(!cors.is_valid());
    }

    #[test]
    fn cors_named_origin_with_credentials_is_valid() {
        let cors = CorsConfig { allowed_origins: vec!["https://app.example".to_string()], allow_credentials: true };
        assert!(cors.is_valid());
    }

    #[test]
    fn default_config_has_valid_cors() {
        assert!(Config::default().cors.is_valid());
    }
}
