//! Speech synthesis.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use decksync_common::{Error, Result};

use crate::filename::audio_filename;

/// Longest text the translate TTS endpoint accepts per request.
pub const MAX_CHUNK_CHARS: usize = 200;

/// Speech backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechService {
    /// Google Translate text-to-speech.
    #[default]
    Google,
    /// No audio.
    None,
}

/// Turns text into spoken audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Backend name, for logging.
    fn name(&self) -> &str;

    /// Filename for the audio of `text`. Deterministic across runs.
    fn filename(&self, text: &str, language: &str) -> String {
        audio_filename(language, text)
    }

    /// Synthesize `text` in `language` to MP3 bytes.
    async fn synthesize(&self, text: &str, language: &str) -> Result<Bytes>;
}

/// Google Translate TTS client.
pub struct GoogleTranslateTts {
    http: Client,
    base_url: Option<String>,
}

impl GoogleTranslateTts {
    /// Create a client.
    ///
    /// # Errors
    /// - HTTP client cannot be built
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("decksync/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            http,
            base_url: None,
        })
    }

    /// Send every request to `base_url` instead of the regional host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn endpoint(&self, host: &str) -> String {
        match &self.base_url {
            Some(base) => format!("{}/translate_tts", base.trim_end_matches('/')),
            None => format!("https://translate.google.{}/translate_tts", host),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTranslateTts {
    fn name(&self) -> &str {
        "google"
    }

    async fn synthesize(&self, text: &str, language: &str) -> Result<Bytes> {
        let (lang, host) = voice_for(language);
        let chunks = split_text(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(Error::InvalidInput("Nothing to speak".to_string()));
        }

        let endpoint = self.endpoint(host);
        let total = chunks.len().to_string();
        let mut audio = BytesMut::new();

        for (idx, chunk) in chunks.iter().enumerate() {
            debug!("TTS request {}/{} ({})", idx + 1, chunks.len(), lang);
            let idx = idx.to_string();
            let textlen = chunk.chars().count().to_string();

            let response = self
                .http
                .get(&endpoint)
                .query(&[
                    ("ie", "UTF-8"),
                    ("q", chunk.as_str()),
                    ("tl", lang.as_str()),
                    ("client", "tw-ob"),
                    ("total", total.as_str()),
                    ("idx", idx.as_str()),
                    ("textlen", textlen.as_str()),
                ])
                .send()
                .await
                .map_err(|e| Error::MediaResolution(format!("Speech request failed: {}", e)))?;

            if !response.status().is_success() {
                return Err(Error::MediaResolution(format!(
                    "Speech synthesis returned HTTP {}",
                    response.status()
                )));
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| Error::MediaResolution(format!("Failed to read audio: {}", e)))?;
            audio.extend_from_slice(&bytes);
        }

        if audio.is_empty() {
            return Err(Error::MediaResolution("Speech synthesis returned no audio".to_string()));
        }
        Ok(audio.freeze())
    }
}

/// Map a language code to the TTS language and regional host.
///
/// Regional variants are spoken by the base language on the region's
/// domain, e.g. `en-gb` becomes `en` on `co.uk`.
pub fn voice_for(language: &str) -> (String, &'static str) {
    let code = language.trim().to_lowercase().replace('_', "-");
    let host = match code.as_str() {
        "en-gb" | "en-uk" => "co.uk",
        "en-au" => "com.au",
        "en-in" => "co.in",
        "en-ca" | "fr-ca" => "ca",
        "fr-fr" => "fr",
        "pt-br" => "com.br",
        "pt-pt" => "pt",
        "es-es" => "es",
        "es-mx" => "com.mx",
        _ => "com",
    };
    let base = code.split('-').next().unwrap_or_default().to_string();
    (base, host)
}

/// Split text into chunks of at most `max` characters at whitespace.
///
/// Words longer than `max` are split mid-word.
pub fn split_text(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max {
            if current_len > 0 {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = word.split_off(max);
            chunks.push(word.into_iter().collect());
            word = rest;
        }
        if word.is_empty() {
            continue;
        }

        let needed = if current_len == 0 { word.len() } else { current_len + 1 + word.len() };
        if needed > max {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.extend(word.iter());
        current_len += word.len();
    }

    if current_len > 0 {
        chunks.push(current);
    }
    chunks
}
