//! Sync settings.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use decksync_common::{Error, Result};
use decksync_media::{ImageService, MediaConfig, SpeechService};
use decksync_store::{AnkiConnectConfig, DEFAULT_ENDPOINT, DEFAULT_NOTE_MODEL};

use crate::registry::{ContentRegistry, DedupPolicy};

/// Settings for a sync run.
///
/// Nothing below the binary reads the process environment; everything a
/// run needs is passed in through this struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Store endpoint URL.
    pub store_endpoint: String,
    /// Note type used for created entries.
    pub note_model: String,
    /// API key for image search.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_api_key: Option<String>,
    /// Skip batches whose container already has entries.
    pub skip_populated_containers: bool,
    /// Overwrite matching entries instead of skipping them.
    pub update_existing: bool,
    /// Image search backend.
    pub image_service: ImageService,
    /// Speech backend.
    pub speech_service: SpeechService,
    /// Bound on every network request.
    pub request_timeout_secs: u64,
    /// Root of the source folders.
    pub data_dir: PathBuf,
    /// Containers synced at once.
    pub parallel_batches: usize,
    /// Replaces the built-in language registry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub languages: Option<ContentRegistry>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            store_endpoint: DEFAULT_ENDPOINT.to_string(),
            note_model: DEFAULT_NOTE_MODEL.to_string(),
            image_api_key: None,
            skip_populated_containers: true,
            update_existing: false,
            image_service: ImageService::default(),
            speech_service: SpeechService::default(),
            request_timeout_secs: 15,
            data_dir: PathBuf::from("data"),
            parallel_batches: 1,
            languages: None,
        }
    }
}

impl SyncSettings {
    /// Check the settings make sense.
    ///
    /// # Errors
    /// - The endpoint or note type is empty
    /// - The timeout or batch parallelism is zero
    pub fn validate(&self) -> Result<()> {
        if self.store_endpoint.trim().is_empty() {
            return Err(Error::Config("store_endpoint cannot be empty".to_string()));
        }
        if self.note_model.trim().is_empty() {
            return Err(Error::Config("note_model cannot be empty".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config("request_timeout_secs must be positive".to_string()));
        }
        if self.parallel_batches == 0 {
            return Err(Error::Config("parallel_batches must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Default dedup policy for batches without overrides.
    pub fn dedup_policy(&self) -> DedupPolicy {
        DedupPolicy {
            skip_populated: self.skip_populated_containers,
            update_existing: self.update_existing,
        }
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Store client configuration.
    pub fn store_config(&self) -> AnkiConnectConfig {
        AnkiConnectConfig::new(self.store_endpoint.clone())
            .with_timeout(self.timeout())
            .with_note_model(self.note_model.clone())
    }

    /// Media backend configuration.
    pub fn media_config(&self) -> MediaConfig {
        MediaConfig {
            image_service: self.image_service,
            image_api_key: self.image_api_key.clone(),
            speech_service: self.speech_service,
            timeout: self.timeout(),
        }
    }

    /// Registry to run: the configured one or the built-in default.
    pub fn registry(&self) -> ContentRegistry {
        self.languages.clone().unwrap_or_default()
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from JSON and validate.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read settings {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let settings = SyncSettings::default();
        assert_eq!(settings.store_endpoint, "http://localhost:8765");
        assert_eq!(settings.dedup_policy(), DedupPolicy::default());
        assert_eq!(settings.registry(), ContentRegistry::default());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings = SyncSettings::from_json(
            r#"{"update_existing": true, "image_service": "none", "parallel_batches": 3}"#,
        )
        .unwrap();
        assert!(settings.update_existing);
        assert!(settings.skip_populated_containers);
        assert_eq!(settings.image_service, ImageService::None);
        assert_eq!(settings.speech_service, SpeechService::Google);
        assert_eq!(settings.parallel_batches, 3);
        assert_eq!(settings.store_config().note_model, "Basic");
    }

    #[test]
    fn test_note_model_reaches_store_config() {
        let settings = SyncSettings::from_json(r#"{"note_model": "Basic (and reversed card)"}"#)
            .unwrap();
        assert_eq!(settings.store_config().note_model, "Basic (and reversed card)");

        assert!(matches!(
            SyncSettings::from_json(r#"{"note_model": " "}"#),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_invalid_settings() {
        assert!(matches!(
            SyncSettings::from_json(r#"{"parallel_batches": 0}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            SyncSettings::from_json(r#"{"skip_populated_containers": "yes"}"#),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut settings = SyncSettings::default();
        settings.image_api_key = Some("abc".to_string());
        settings.data_dir = PathBuf::from("/srv/decks");

        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), settings.to_json().unwrap()).unwrap();

        let loaded = SyncSettings::load(file.path()).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.media_config().image_api_key.as_deref(), Some("abc"));
        assert_eq!(loaded.store_config().timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            SyncSettings::load("/nonexistent/decksync.json"),
            Err(Error::Config(_))
        ));
    }
}
