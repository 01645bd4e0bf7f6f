//! Media resolution with graceful degradation.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use decksync_common::{Error, Result};

use crate::image::{ImageService, ImageSource, PixabayClient};
use crate::request::{LocatedMedia, MediaArtifact, MediaKind, MediaOrigin, MediaRequest};
use crate::speech::{GoogleTranslateTts, SpeechService, SpeechSynthesizer};

/// Which media services to use.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Image search backend.
    pub image_service: ImageService,
    /// API key for the image search backend.
    pub image_api_key: Option<String>,
    /// Speech backend.
    pub speech_service: SpeechService,
    /// Bound on every media request.
    pub timeout: Duration,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            image_service: ImageService::default(),
            image_api_key: None,
            speech_service: SpeechService::default(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Turns media requests into artifacts.
///
/// Resolution never fails: lookup and download problems are logged and
/// degrade to "no artifact". Knows nothing about containers or entries.
#[derive(Clone)]
pub struct MediaResolver {
    images: Option<Arc<dyn ImageSource>>,
    speech: Option<Arc<dyn SpeechSynthesizer>>,
}

impl MediaResolver {
    /// Create a resolver from explicit backends.
    pub fn new(
        images: Option<Arc<dyn ImageSource>>,
        speech: Option<Arc<dyn SpeechSynthesizer>>,
    ) -> Self {
        Self { images, speech }
    }

    /// A resolver that never produces media.
    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    /// Build the configured backends.
    ///
    /// # Errors
    /// - An HTTP client cannot be built
    pub fn from_config(config: &MediaConfig) -> Result<Self> {
        let images: Option<Arc<dyn ImageSource>> = match (&config.image_service, &config.image_api_key) {
            (ImageService::Pixabay, Some(key)) if !key.trim().is_empty() => {
                Some(Arc::new(PixabayClient::new(key.clone(), config.timeout)?))
            }
            (ImageService::Pixabay, _) => {
                info!("No image API key configured, images will be skipped");
                None
            }
            (ImageService::None, _) => None,
        };

        let speech: Option<Arc<dyn SpeechSynthesizer>> = match config.speech_service {
            SpeechService::Google => Some(Arc::new(GoogleTranslateTts::new(config.timeout)?)),
            SpeechService::None => None,
        };

        Ok(Self::new(images, speech))
    }

    /// Find the target filename for a request without fetching bytes.
    pub async fn locate(&self, request: &MediaRequest) -> Option<LocatedMedia> {
        if request.is_blank() {
            return None;
        }

        match request {
            MediaRequest::Audio { text, language } => {
                let speech = self.speech.as_ref()?;
                Some(LocatedMedia {
                    kind: MediaKind::Audio,
                    filename: speech.filename(text, language),
                    origin: MediaOrigin::Speech {
                        text: text.clone(),
                        language: language.clone(),
                    },
                })
            }
            MediaRequest::Image { query } => {
                let images = self.images.as_ref()?;
                match images.locate(query).await {
                    Ok(located) => located,
                    Err(e) => {
                        warn!("Image lookup for '{}' via {} failed: {}", query, images.name(), e);
                        None
                    }
                }
            }
        }
    }

    /// Fetch the bytes of located media.
    pub async fn fetch(&self, located: &LocatedMedia) -> Option<MediaArtifact> {
        match self.try_fetch(located).await {
            Ok(artifact) => {
                debug!("Fetched {} ({} bytes)", artifact.filename, artifact.data.len());
                Some(artifact)
            }
            Err(e) => {
                warn!("Could not fetch {} {}: {}", located.kind, located.filename, e);
                None
            }
        }
    }

    async fn try_fetch(&self, located: &LocatedMedia) -> Result<MediaArtifact> {
        match (&located.origin, located.kind) {
            (MediaOrigin::Speech { text, language }, MediaKind::Audio) => {
                let speech = self
                    .speech
                    .as_ref()
                    .ok_or_else(|| Error::MediaResolution("No speech service".to_string()))?;
                let data = speech.synthesize(text, language).await?;
                Ok(MediaArtifact {
                    kind: MediaKind::Audio,
                    filename: located.filename.clone(),
                    data,
                })
            }
            (MediaOrigin::Download { .. }, MediaKind::Image) => {
                let images = self
                    .images
                    .as_ref()
                    .ok_or_else(|| Error::MediaResolution("No image service".to_string()))?;
                images.fetch(located).await
            }
            _ => Err(Error::InvalidInput(format!(
                "{} has mismatched origin",
                located.filename
            ))),
        }
    }

    /// Resolve a request to an artifact, or `None` when there is nothing to attach.
    pub async fn resolve(&self, request: &MediaRequest) -> Option<MediaArtifact> {
        let located = self.locate(request).await?;
        self.fetch(&located).await
    }
}
