//! Shared multipart-draining helpers for the synchronous edit operations
//! (§4.1) and the `/upload` submit handler, all of which accept a video
//! file plus a handful of plain-text fields over the same wire shape.

use axum::extract::Multipart;
use std::collections::HashMap;

use crate::errors::{AppError, PipelineError};

pub struct MultipartFile {
    pub field_name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Drains a multipart form into named byte fields and plain text fields,
/// rejecting as soon as the accumulated file bytes would exceed the
/// configured upload ceiling.
pub async fn drain_multipart(
    mut multipart: Multipart,
    max_bytes: u64,
) -> Result<(Vec<MultipartFile>, HashMap<String, String>), AppError> {
    let mut files = Vec::new();
    let mut fields = HashMap::new();
    let mut total: u64 = 0;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        if filename.is_some() {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| bad_request(format!("reading field '{name}': {e}")))?;
            total += bytes.len() as u64;
            if total > max_bytes {
                return Err(AppError::Pipeline(PipelineError::PayloadTooLarge {
                    size: total,
                    max_size: max_bytes,
                }));
            }
            files.push(MultipartFile {
                field_name: name,
                filename,
                content_type,
                bytes: bytes.to_vec(),
            });
        } else {
            let text = field
                .text()
                .await
                .map_err(|e| bad_request(format!("reading field '{name}': {e}")))?;
            fields.insert(name, text);
        }
    }

    Ok((files, fields))
}

pub fn bad_request(message: impl Into<String>) -> AppError {
    AppError::Pipeline(PipelineError::BadRequest {
        message: message.into(),
    })
}

pub fn find_file<'a>(files: &'a [MultipartFile], name: &str) -> Result<&'a MultipartFile, AppError> {
    files
        .iter()
        .find(|f| f.field_name == name)
        .ok_or_else(|| bad_request(format!("missing required file field '{name}'")))
}

pub fn source_extension(file: &MultipartFile) -> String {
    file.filename
        .as_deref()
        .and_then(|name| std::path::Path::new(name).extension())
        .and_then(|e| e.to_str())
        .unwrap_or("mp4")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(field_name: &str, filename: Option<&str>) -> MultipartFile {
        MultipartFile {
            field_name: field_name.to_string(),
            filename: filename.map(str::to_string),
            content_type: None,
            bytes: vec![],
        }
    }

    #[test]
    fn find_file_locates_by_field_name() {
        let files = vec![file("file", Some("a.mp4")), file("logo", Some("b.png"))];
        assert_eq!(find_file(&files, "logo").unwrap().filename.as_deref(), Some("b.png"));
    }

    #[test]
    fn find_file_errors_when_missing() {
        let files = vec![file("file", Some("a.mp4"))];
        assert!(find_file(&files, "subtitles").is_err());
    }

    #[test]
    fn source_extension_lowercases_and_defaults() {
        assert_eq!(source_extension(&file("file", Some("clip.MOV"))), "mov");
        assert_eq!(source_extension(&file("file", None)), "mp4");
    }
}
