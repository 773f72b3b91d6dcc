//! Translation back-ends (§4.6.3): `translate_batch(segments, src, tgt) ->
//! segments`, with retry/backoff and optional service fallback handled by
//! the caller (the translate stage), not the backend itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::errors::{AppError, PipelineError};
use crate::models::TranslationService;
use crate::pipeline::subtitles::Segment;

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate_batch(
        &self,
        segments: &[Segment],
        src: &str,
        tgt: &str,
    ) -> Result<Vec<Segment>, AppError>;

    fn name(&self) -> &'static str;
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    texts: Vec<&'a str>,
    source: &'a str,
    target: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    translations: Vec<String>,
}

struct HttpTranslator {
    name: &'static str,
    endpoint: String,
    client: reqwest::Client,
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate_batch(
        &self,
        segments: &[Segment],
        src: &str,
        tgt: &str,
    ) -> Result<Vec<Segment>, AppError> {
        let request = TranslateRequest {
            texts: segments.iter().map(|s| s.text.as_str()).collect(),
            source: src,
            target: tgt,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| translate_error(format!("{}: {e}", self.name)))?
            .error_for_status()
            .map_err(|e| translate_error(format!("{}: {e}", self.name)))?
            .json::<TranslateResponse>()
            .await
            .map_err(|e| translate_error(format!("{}: malformed response: {e}", self.name)))?;

        if response.translations.len() != segments.len() {
            return Err(translate_error(format!(
                "{}: expected {} translations, got {}",
                self.name,
                segments.len(),
                response.translations.len()
            )));
        }

        Ok(segments
            .iter()
            .zip(response.translations)
            .map(|(seg, text)| Segment { text, ..seg.clone() })
            .collect())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

fn translate_error(detail: String) -> AppError {
    AppError::Pipeline(PipelineError::TranslationError { detail })
}

/// Constructs the translator for a user-chosen service tag (§4.6.3 registry).
pub fn build_translator(
    service: TranslationService,
    config: &PipelineConfig,
) -> Result<Box<dyn Translator>, AppError> {
    let (name, endpoint) = match service {
        TranslationService::Free => ("free-service", config.free_translate_endpoint.clone()),
        TranslationService::Paid => ("paid-api", config.paid_translate_endpoint.clone()),
    };
    let endpoint =
        endpoint.ok_or_else(|| translate_error(format!("no endpoint configured for {name}")))?;

    Ok(Box::new(HttpTranslator {
        name,
        endpoint,
        client: reqwest::Client::new(),
    }))
}

/// The service to fall back to when the primary is exhausted (§4.6.3); the
/// only two variants form a simple swap.
pub fn fallback_service(service: TranslationService) -> TranslationService {
    match service {
        TranslationService::Free => TranslationService::Paid,
        TranslationService::Paid => TranslationService::Free,
    }
}

/// Runs one batch through `translator` with exponential backoff retry up to
/// `max_retries` (§4.6.3 "default 2 retries, base 1s, cap 10s").
pub async fn translate_with_retry(
    translator: &dyn Translator,
    segments: &[Segment],
    src: &str,
    tgt: &str,
    max_retries: u32,
    base_s: u64,
    cap_s: u64,
) -> Result<Vec<Segment>, AppError> {
    let mut attempt = 0;
    loop {
        match translator.translate_batch(segments, src, tgt).await {
            Ok(result) => return Ok(result),
            Err(err) if attempt < max_retries => {
                let backoff = (base_s.saturating_mul(1 << attempt)).min(cap_s);
                let jitter_ms = fastrand::u64(0..250);
                tracing::warn!(
                    attempt,
                    error = %err,
                    "translation batch failed, retrying after backoff"
                );
                tokio::time::sleep(std::time::Duration::from_millis(
                    backoff * 1000 + jitter_ms,
                ))
                .await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_is_the_other_service() {
        assert_eq!(
            fallback_service(TranslationService::Free),
            TranslationService::Paid
        );
        assert_eq!(
            fallback_service(TranslationService::Paid),
            TranslationService::Free
        );
    }
}
