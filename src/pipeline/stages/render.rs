//! S7 Burn-in + watermark (§4.6, weight 0.10, §4.6.4 font selection). Skipped
//! entirely when `burn_in=false`; when both burn-in and a watermark are
//! requested they run as a single combined media operation rather than two
//! passes over the video.

use std::path::Path;

use crate::errors::{AppError, PipelineError};
use crate::models::task::{WatermarkChoice, WatermarkPosition, WatermarkSize};

fn position_expr(position: WatermarkPosition) -> &'static str {
    match position {
        WatermarkPosition::TopLeft => "10:10",
        WatermarkPosition::TopRight => "main_w-overlay_w-10:10",
        WatermarkPosition::BottomLeft => "10:main_h-overlay_h-10",
        WatermarkPosition::BottomRight => "main_w-overlay_w-10:main_h-overlay_h-10",
        WatermarkPosition::Center => "(main_w-overlay_w)/2:(main_h-overlay_h)/2",
    }
}

fn scale_expr(size: WatermarkSize) -> &'static str {
    match size {
        WatermarkSize::Small => "iw*0.10:-1",
        WatermarkSize::Medium => "iw*0.18:-1",
        WatermarkSize::Large => "iw*0.28:-1",
    }
}

/// Font covering the target script (§4.6.4); a single bundled family with
/// broad Unicode coverage is used for every language rather than maintaining
/// a per-script font table.
const SUBTITLE_FONT: &str = "Noto Sans";

pub async fn burn_in_and_watermark(
    bin: &str,
    input_video: &Path,
    subtitle_path: Option<&Path>,
    watermark: Option<(&Path, &WatermarkChoice)>,
    output: &Path,
    max_output_bytes: usize,
) -> Result<(), AppError> {
    let input_str = input_video.to_string_lossy().into_owned();
    let output_str = output.to_string_lossy().into_owned();
    let mut args: Vec<String> = vec!["-y".to_string(), "-i".to_string(), input_str];

    let mut filters = Vec::new();
    let mut video_label = "[0:v]".to_string();

    if let Some((logo_path, choice)) = watermark {
        args.push("-i".to_string());
        args.push(logo_path.to_string_lossy().into_owned());
        filters.push(format!(
            "[1:v]scale={},format=rgba,colorchannelmixer=aa={}[wm]",
            scale_expr(choice.size),
            choice.opacity as f64 / 100.0
        ));
        filters.push(format!(
            "{video_label}[wm]overlay={}[v1]",
            position_expr(choice.position)
        ));
        video_label = "[v1]".to_string();
    }

    if let Some(subtitle_path) = subtitle_path {
        let sub_str = subtitle_path.to_string_lossy().replace(':', "\\:");
        filters.push(format!(
            "{video_label}subtitles='{sub_str}':force_style='FontName={SUBTITLE_FONT}'[vout]"
        ));
        video_label = "[vout]".to_string();
    }

    if !filters.is_empty() {
        args.push("-filter_complex".to_string());
        args.push(filters.join(";"));
        args.push("-map".to_string());
        args.push(video_label);
        args.push("-map".to_string());
        args.push("0:a?".to_string());
    }

    args.push("-c:a".to_string());
    args.push("copy".to_string());
    args.push(output_str);

    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    let result = super::run_tool(bin, &arg_refs, max_output_bytes).await?;
    if !result.status_success || !output.exists() {
        return Err(AppError::Pipeline(PipelineError::RenderError {
            detail: result.stderr,
        }));
    }
    Ok(())
}
