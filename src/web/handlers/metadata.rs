//! Metadata endpoints (§4.1, §6): static closed-set tables plus liveness
//! and dependency checks. All exempt from rate limiting.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::web::AppState;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
    pub native_name: &'static str,
    pub rtl: bool,
    pub has_ui_translation: bool,
}

/// The closed set of languages this deployment recognizes for
/// `source_lang`/`target_lang` (§4.1, §6). `rtl` drives the directional-
/// isolate wrapping in subtitle emission; `has_ui_translation` is metadata
/// only, not enforced by the pipeline.
pub const LANGUAGES: &[Language] = &[
    Language { code: "en", name: "English", native_name: "English", rtl: false, has_ui_translation: true },
    Language { code: "es", name: "Spanish", native_name: "Español", rtl: false, has_ui_translation: true },
    Language { code: "fr", name: "French", native_name: "Français", rtl: false, has_ui_translation: true },
    Language { code: "de", name: "German", native_name: "Deutsch", rtl: false, has_ui_translation: true },
    Language { code: "it", name: "Italian", native_name: "Italiano", rtl: false, has_ui_translation: false },
    Language { code: "pt", name: "Portuguese", native_name: "Português", rtl: false, has_ui_translation: false },
    Language { code: "nl", name: "Dutch", native_name: "Nederlands", rtl: false, has_ui_translation: false },
    Language { code: "ru", name: "Russian", native_name: "Русский", rtl: false, has_ui_translation: false },
    Language { code: "zh", name: "Chinese", native_name: "中文", rtl: false, has_ui_translation: true },
    Language { code: "ja", name: "Japanese", native_name: "日本語", rtl: false, has_ui_translation: true },
    Language { code: "ko", name: "Korean", native_name: "한국어", rtl: false, has_ui_translation: false },
    Language { code: "ar", name: "Arabic", native_name: "العربية", rtl: true, has_ui_translation: true },
    Language { code: "he", name: "Hebrew", native_name: "עברית", rtl: true, has_ui_translation: false },
    Language { code: "fa", name: "Persian", native_name: "فارسی", rtl: true, has_ui_translation: false },
    Language { code: "ur", name: "Urdu", native_name: "اردو", rtl: true, has_ui_translation: false },
];

pub fn is_known_language(code: &str) -> bool {
    LANGUAGES.iter().any(|l| l.code == code)
}

pub async fn languages() -> impl IntoResponse {
    Json(LANGUAGES)
}

pub async fn models() -> impl IntoResponse {
    Json(json!(["tiny", "base", "small", "medium", "large", "remote-api"]))
}

pub async fn translation_services() -> impl IntoResponse {
    Json(json!(["free", "paid"]))
}

pub async fn features() -> impl IntoResponse {
    Json(json!({
        "burn_in": true,
        "watermark": true,
        "time_range": true,
        "rtl_subtitles": true,
        "download_only": true,
        "edit_operations": ["cut", "embed-subtitles", "merge", "add-logo"],
        "model_downgrade": true,
    }))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Serialize)]
struct DepStatus {
    database: bool,
    download_tool: bool,
    media_tool: bool,
    transcribe_tool: bool,
}

/// `/health/deps`: confirms the database accepts queries and the
/// external tools the pipeline shells out to are resolvable on `PATH`.
/// None of this is a guarantee the tools run correctly, only that they
/// exist where the engine expects them.
pub async fn health_deps(State(state): State<AppState>) -> impl IntoResponse {
    let database = sqlx::query("SELECT 1").execute(state.database.pool()).await.is_ok();
    let download_tool = which::which(&state.config.pipeline.download_tool_bin).is_ok();
    let media_tool = which::which(&state.config.pipeline.media_tool_bin).is_ok();
    let transcribe_tool = which::which(&state.config.pipeline.transcribe_tool_bin).is_ok();

    let status = DepStatus { database, download_tool, media_tool, transcribe_tool };
    let healthy = status.database && status.download_tool && status.media_tool && status.transcribe_tool;

    let code = if healthy { axum::http::StatusCode::OK } else { axum::http::StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(status))
}
