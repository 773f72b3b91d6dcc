//! S9 Publish + cleanup (§4.6, weight 0.02; §6 `stats/events.jsonl`). The
//! atomic move itself is [`crate::storage::ArtifactStore::publish`]; this
//! module covers the two things that happen alongside it: the per-task
//! timing summary recorded on the result, and the append-only terminal-task
//! event log.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::errors::AppError;

/// Builds the `result.timing_summary` value: wall time per stage plus total.
pub fn timing_summary(stage_durations: &[(&str, std::time::Duration)]) -> serde_json::Value {
    let stages: serde_json::Map<String, serde_json::Value> = stage_durations
        .iter()
        .map(|(name, d)| ((*name).to_string(), json!(d.as_secs_f64())))
        .collect();
    let total: f64 = stage_durations.iter().map(|(_, d)| d.as_secs_f64()).sum();
    json!({ "stages": stages, "total_s": total })
}

/// Appends one JSON line per terminal task (§6 "one JSON object per terminal
/// task ... append-only"). A write failure here is logged, not propagated:
/// the stats log is an observability aid, not part of the task's own
/// correctness contract.
pub async fn append_stats_event(
    stats_dir: &Path,
    task_id: Uuid,
    outcome: &str,
    choices: &serde_json::Value,
    timing: &serde_json::Value,
    completed_at: DateTime<Utc>,
) -> Result<(), AppError> {
    tokio::fs::create_dir_all(stats_dir)
        .await
        .map_err(|e| AppError::internal(format!("creating stats dir: {e}")))?;

    let line = json!({
        "task_id": task_id,
        "outcome": outcome,
        "choices": choices,
        "timing": timing,
        "completed_at": completed_at,
    });

    let path = stats_dir.join("events.jsonl");
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
        .map_err(|e| AppError::internal(format!("opening stats log: {e}")))?;

    file.write_all(format!("{line}\n").as_bytes())
        .await
        .map_err(|e| AppError::internal(format!("writing stats log: {e}")))?;

    Ok(())
}
