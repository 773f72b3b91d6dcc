//! Locale-aware `error.user_message` rendering (§7 "the status envelope
//! carries `error.user_message` in the client's locale when the Intake API
//! receives an `Accept-Language` header; otherwise in a default locale").
//!
//! Technical fields (`code`, `message`) are never localized (§7); only this
//! module's output ever lands in `user_message`.

use crate::models::ErrorCode;

/// Closed set of locales the catalog covers; anything else falls back to
/// `En`. This mirrors the closed-enumeration style §6 uses for languages,
/// models, and watermark tags rather than pulling in a full i18n crate for a
/// handful of short strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Locale {
    En,
    Es,
    Fr,
    He,
    Ar,
}

impl Locale {
    fn from_tag(tag: &str) -> Option<Locale> {
        let primary = tag.split(['-', '_']).next().unwrap_or(tag).trim().to_lowercase();
        match primary.as_str() {
            "en" => Some(Locale::En),
            "es" => Some(Locale::Es),
            "fr" => Some(Locale::Fr),
            "he" => Some(Locale::He),
            "ar" => Some(Locale::Ar),
            _ => None,
        }
    }
}

/// Parses an `Accept-Language` header value (`"es-ES,es;q=0.9,en;q=0.8"`)
/// into locale preference order, highest `q` first, ties broken by position.
/// This is a deliberately small parser: no wildcard (`*`) handling, no
/// extension-language subtags, since the catalog only ever recognizes five
/// primary tags anyway.
fn parse_preferences(header: &str) -> Vec<Locale> {
    let mut scored: Vec<(f32, usize, Locale)> = Vec::new();
    for (position, part) in header.split(',').enumerate() {
        let mut pieces = part.split(';');
        let tag = match pieces.next() {
            Some(t) => t.trim(),
            None => continue,
        };
        if tag.is_empty() {
            continue;
        }
        let quality = pieces
            .find_map(|p| p.trim().strip_prefix("q="))
            .and_then(|q| q.parse::<f32>().ok())
            .unwrap_or(1.0);
        if let Some(locale) = Locale::from_tag(tag) {
            scored.push((quality, position, locale));
        }
    }
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal).then(a.1.cmp(&b.1)));
    scored.into_iter().map(|(_, _, l)| l).collect()
}

fn resolve(accept_language: Option<&str>) -> Locale {
    accept_language
        .and_then(|header| parse_preferences(header).into_iter().next())
        .unwrap_or(Locale::En)
}

fn message_for(code: ErrorCode, locale: Locale) -> &'static str {
    use ErrorCode::*;
    use Locale::*;
    match (code, locale) {
        (BadRequest, Es) => "La solicitud no era válida.",
        (BadRequest, Fr) => "La requête n'était pas valide.",
        (BadRequest, He) => "הבקשה אינה תקינה.",
        (BadRequest, Ar) => "الطلب غير صالح.",
        (BadRequest, En) => "The request was invalid.",

        (UnsupportedMedia, Es) => "Este tipo de archivo no es compatible.",
        (UnsupportedMedia, Fr) => "Ce type de fichier n'est pas pris en charge.",
        (UnsupportedMedia, He) => "סוג קובץ זה אינו נתמך.",
        (UnsupportedMedia, Ar) => "نوع الملف هذا غير مدعوم.",
        (UnsupportedMedia, En) => "This file type isn't supported.",

        (ProbeFailed, Es) => "No se pudo leer el archivo multimedia.",
        (ProbeFailed, Fr) => "Le fichier multimédia n'a pas pu être lu.",
        (ProbeFailed, He) => "לא ניתן היה לקרוא את קובץ המדיה.",
        (ProbeFailed, Ar) => "تعذّرت قراءة ملف الوسائط.",
        (ProbeFailed, En) => "The media file couldn't be read.",

        (PayloadTooLarge, Es) => "El archivo es demasiado grande.",
        (PayloadTooLarge, Fr) => "Le fichier est trop volumineux.",
        (PayloadTooLarge, He) => "הקובץ גדול מדי.",
        (PayloadTooLarge, Ar) => "الملف كبير جدًا.",
        (PayloadTooLarge, En) => "The file is too large.",

        (RateLimited, Es) => "Demasiadas solicitudes, inténtalo de nuevo en breve.",
        (RateLimited, Fr) => "Trop de requêtes, veuillez réessayer bientôt.",
        (RateLimited, He) => "יותר מדי בקשות, נסו שוב בקרוב.",
        (RateLimited, Ar) => "طلبات كثيرة جدًا، يرجى المحاولة مرة أخرى قريبًا.",
        (RateLimited, En) => "Too many requests, please try again shortly.",

        (DownloadFailed, Es) => "No se pudo descargar la fuente.",
        (DownloadFailed, Fr) => "La source n'a pas pu être téléchargée.",
        (DownloadFailed, He) => "לא ניתן היה להוריד את המקור.",
        (DownloadFailed, Ar) => "تعذّر تنزيل المصدر.",
        (DownloadFailed, En) => "The source couldn't be downloaded.",

        (AudioExtractionError, Es) => "No se pudo extraer el audio de este archivo.",
        (AudioExtractionError, Fr) => "L'audio n'a pas pu être extrait de ce fichier.",
        (AudioExtractionError, He) => "לא ניתן היה לחלץ אודיו מקובץ זה.",
        (AudioExtractionError, Ar) => "تعذّر استخراج الصوت من هذا الملف.",
        (AudioExtractionError, En) => "Audio couldn't be extracted from this file.",

        (TranscriptionError, Es) => "Falló la transcripción.",
        (TranscriptionError, Fr) => "Échec de la transcription.",
        (TranscriptionError, He) => "התמלול נכשל.",
        (TranscriptionError, Ar) => "فشل النسخ الصوتي.",
        (TranscriptionError, En) => "Transcription failed.",

        (TranslationError, Es) => "Falló la traducción.",
        (TranslationError, Fr) => "Échec de la traduction.",
        (TranslationError, He) => "התרגום נכשל.",
        (TranslationError, Ar) => "فشلت الترجمة.",
        (TranslationError, En) => "Translation failed.",

        (SubtitleEmitError, Es) => "Falló la generación de subtítulos.",
        (SubtitleEmitError, Fr) => "Échec de la génération des sous-titres.",
        (SubtitleEmitError, He) => "יצירת הכתוביות נכשלה.",
        (SubtitleEmitError, Ar) => "فشل إنشاء الترجمة.",
        (SubtitleEmitError, En) => "Subtitle generation failed.",

        (RenderError, Es) => "Falló la renderización del video; los subtítulos siguen disponibles.",
        (RenderError, Fr) => "Échec du rendu vidéo ; les sous-titres restent disponibles.",
        (RenderError, He) => "עיבוד הווידאו נכשל; הכתוביות עדיין זמינות.",
        (RenderError, Ar) => "فشل عرض الفيديو؛ لا تزال الترجمة متاحة.",
        (RenderError, En) => "Video rendering failed; subtitles are still available.",

        (FormatError, Es) => "No se pudo finalizar el video de salida.",
        (FormatError, Fr) => "La vidéo de sortie n'a pas pu être finalisée.",
        (FormatError, He) => "לא ניתן היה לסיים את וידאו הפלט.",
        (FormatError, Ar) => "تعذّر إنهاء ملف الفيديو الناتج.",
        (FormatError, En) => "The output video couldn't be finalized.",

        (TimeoutExceeded, Es) => "El procesamiento tardó demasiado y se detuvo.",
        (TimeoutExceeded, Fr) => "Le traitement a pris trop de temps et a été arrêté.",
        (TimeoutExceeded, He) => "העיבוד ארך זמן רב מדי ונעצר.",
        (TimeoutExceeded, Ar) => "استغرقت المعالجة وقتًا طويلاً جدًا وتم إيقافها.",
        (TimeoutExceeded, En) => "Processing took too long and was stopped.",

        (Infrastructure, Es) => "Se produjo un error interno.",
        (Infrastructure, Fr) => "Une erreur interne s'est produite.",
        (Infrastructure, He) => "אירעה שגיאה פנימית.",
        (Infrastructure, Ar) => "حدث خطأ داخلي.",
        (Infrastructure, En) => "An internal error occurred.",
    }
}

/// Renders `code`'s user-facing message in the best locale the given
/// `Accept-Language` header value indicates, defaulting to English when the
/// header is absent or names nothing the catalog covers.
pub fn localize(code: ErrorCode, accept_language: Option<&str>) -> String {
    message_for(code, resolve(accept_language)).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_english_without_header() {
        assert_eq!(localize(ErrorCode::DownloadFailed, None), "The source couldn't be downloaded.");
    }

    #[test]
    fn picks_highest_quality_known_locale() {
        let msg = localize(ErrorCode::DownloadFailed, Some("fr;q=0.5,es;q=0.9,en;q=0.1"));
        assert_eq!(msg, "No se pudo descargar la fuente.");
    }

    #[test]
    fn falls_back_to_english_for_unrecognized_locale() {
        let msg = localize(ErrorCode::DownloadFailed, Some("de-DE,de;q=0.9"));
        assert_eq!(msg, "The source couldn't be downloaded.");
    }

    #[test]
    fn region_subtag_resolves_to_primary_language() {
        let msg = localize(ErrorCode::BadRequest, Some("he-IL"));
        assert_eq!(msg, "הבקשה אינה תקינה.");
    }

    #[test]
    fn skips_unknown_preferences_to_find_a_known_one() {
        let msg = localize(ErrorCode::RateLimited, Some("zh-CN,ar;q=0.8"));
        assert_eq!(msg, "طلبات كثيرة جدًا، يرجى المحاولة مرة أخرى قريبًا.");
    }
}
