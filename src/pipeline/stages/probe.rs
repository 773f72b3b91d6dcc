//! S2 Probe (§4.3, §4.6, weight 0.02): extracts container/stream metadata
//! via the configured media tool's JSON probe output.

use std::path::Path;

use serde::Deserialize;

use crate::errors::{AppError, PipelineError};
use crate::models::task::SourceMetadata;

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
    format_name: Option<String>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    avg_frame_rate: Option<String>,
}

#[derive(Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
    streams: Vec<ProbeStream>,
}

fn parse_frame_rate(raw: &str) -> Option<f64> {
    let (num, den) = raw.split_once('/')?;
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    if den == 0.0 {
        None
    } else {
        Some(num / den)
    }
}

/// Probes `path`, returning `{duration_s, width, height, fps, codec_v,
/// codec_a, bit_rate, size_bytes, mime, ext}` (§4.3). A container with no
/// recognizable video or audio stream is `UnsupportedMedia`; a tool failure
/// or malformed JSON is `ProbeFailed`.
pub async fn probe(
    bin: &str,
    path: &Path,
    max_output_bytes: usize,
) -> Result<SourceMetadata, AppError> {
    let path_str = path.to_string_lossy();
    let args = [
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
        path_str.as_ref(),
    ];

    let output = super::run_tool(bin, &args, max_output_bytes).await?;
    if !output.status_success {
        return Err(probe_failed(format!("probe tool failed: {}", output.stderr)));
    }

    let parsed: ProbeOutput =
        serde_json::from_str(&output.stdout).map_err(|e| probe_failed(format!("malformed probe output: {e}")))?;

    let video = parsed.streams.iter().find(|s| s.codec_type == "video");
    let audio = parsed.streams.iter().find(|s| s.codec_type == "audio");

    if video.is_none() && audio.is_none() {
        return Err(AppError::Pipeline(PipelineError::UnsupportedMedia {
            detail: "no video or audio stream found".to_string(),
        }));
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    Ok(SourceMetadata {
        duration_s: parsed.format.duration.and_then(|d| d.parse().ok()),
        width: video.and_then(|v| v.width),
        height: video.and_then(|v| v.height),
        fps: video.and_then(|v| v.avg_frame_rate.as_deref().and_then(parse_frame_rate)),
        codec_v: video.and_then(|v| v.codec_name.clone()),
        codec_a: audio.and_then(|a| a.codec_name.clone()),
        bit_rate: parsed.format.bit_rate.and_then(|b| b.parse().ok()),
        size_bytes: parsed.format.size.and_then(|s| s.parse().ok()),
        mime: parsed.format.format_name.map(|name| format!("video/{name}")),
        ext: Some(ext),
        title: None,
    })
}

fn probe_failed(detail: String) -> AppError {
    AppError::Pipeline(PipelineError::ProbeFailed { detail })
}
