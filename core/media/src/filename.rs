//! Filename safety for uploaded media.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

/// Longest stem kept from source text.
pub const MAX_STEM_LEN: usize = 30;

/// Reduce text to a filename-safe stem.
///
/// Keeps alphanumerics, `-` and `_`, truncated to [`MAX_STEM_LEN`]
/// characters. Falls back to a digest of the text when nothing survives, so
/// the stem is never empty and stays stable for the same input.
pub fn safe_stem(text: &str) -> String {
    let stem: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .take(MAX_STEM_LEN)
        .collect();

    if stem.is_empty() {
        digest(text)
    } else {
        stem
    }
}

/// Audio filename for text spoken in a language, e.g. `fr_chat.mp3`.
///
/// When the stem is not the text itself (characters dropped or truncated),
/// a digest of the full text is appended so that distinct texts never share
/// a file: `fr_lechat_<digest>.mp3`.
pub fn audio_filename(language: &str, text: &str) -> String {
    let stem = safe_stem(text);
    let language = safe_stem(language);
    if stem == text || stem == digest(text) {
        format!("{}_{}.mp3", language, stem)
    } else {
        format!("{}_{}_{}.mp3", language, stem, digest(text))
    }
}

/// Make a filename taken from elsewhere safe, keeping its extension.
pub fn sanitize_filename(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            format!("{}.{}", safe_stem(stem), ext.to_ascii_lowercase())
        }
        _ => safe_stem(name),
    }
}

/// Short hex digest of `text`.
pub fn digest(text: &str) -> String {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(text.as_bytes());
    hasher.finalize()[..6]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
