//! Image search and download.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use decksync_common::{Error, Result};

use crate::filename::{digest, sanitize_filename};
use crate::request::{LocatedMedia, MediaArtifact, MediaKind, MediaOrigin};

/// Pixabay search endpoint.
pub const PIXABAY_ENDPOINT: &str = "https://pixabay.com/api/";

/// Results requested per search; the first one wins.
pub const RESULTS_PER_SEARCH: u32 = 3;

/// Payloads smaller than this are not treated as images.
pub const MIN_IMAGE_BYTES: usize = 500;

/// Image search backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageService {
    /// Pixabay stock photos (needs an API key).
    #[default]
    Pixabay,
    /// No images.
    None,
}

/// Finds an image for a search phrase and downloads it.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Backend name, for logging.
    fn name(&self) -> &str;

    /// Search for an image. `Ok(None)` when nothing matches.
    async fn locate(&self, query: &str) -> Result<Option<LocatedMedia>>;

    /// Download a located image.
    async fn fetch(&self, located: &LocatedMedia) -> Result<MediaArtifact>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "webformatURL")]
    webformat_url: String,
}

/// Pixabay image search client.
pub struct PixabayClient {
    http: Client,
    endpoint: String,
    api_key: String,
}

impl PixabayClient {
    /// Create a client with an API key.
    ///
    /// # Errors
    /// - HTTP client cannot be built
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("decksync/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            http,
            endpoint: PIXABAY_ENDPOINT.to_string(),
            api_key: api_key.into(),
        })
    }

    /// Use another search endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl ImageSource for PixabayClient {
    fn name(&self) -> &str {
        "pixabay"
    }

    async fn locate(&self, query: &str) -> Result<Option<LocatedMedia>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }

        let per_page = RESULTS_PER_SEARCH.to_string();
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", query),
                ("image_type", "photo"),
                ("per_page", per_page.as_str()),
                ("safesearch", "true"),
            ])
            .send()
            .await
            .map_err(|e| Error::MediaResolution(format!("Image search failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::MediaResolution(format!(
                "Image search returned HTTP {}",
                response.status()
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| Error::MediaResolution(format!("Malformed search response: {}", e)))?;

        let Some(hit) = body.hits.into_iter().next() else {
            debug!("No image found for '{}'", query);
            return Ok(None);
        };

        Ok(Some(LocatedMedia {
            kind: MediaKind::Image,
            filename: image_filename(&hit.webformat_url),
            origin: MediaOrigin::Download {
                url: hit.webformat_url,
            },
        }))
    }

    async fn fetch(&self, located: &LocatedMedia) -> Result<MediaArtifact> {
        let MediaOrigin::Download { url } = &located.origin else {
            return Err(Error::InvalidInput(format!(
                "{} is not a downloadable image",
                located.filename
            )));
        };
        download_image(&self.http, url, &located.filename).await
    }
}

/// Download an image under a name chosen beforehand, rejecting payloads
/// too small to be one.
pub async fn download_image(http: &Client, url: &str, filename: &str) -> Result<MediaArtifact> {
    debug!("Downloading image: {}", url);

    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| Error::MediaResolution(format!("Image download failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(Error::MediaResolution(format!(
            "Image download returned HTTP {}",
            response.status()
        )));
    }

    let data: Bytes = response
        .bytes()
        .await
        .map_err(|e| Error::MediaResolution(format!("Failed to read image: {}", e)))?;

    if data.len() < MIN_IMAGE_BYTES {
        return Err(Error::MediaResolution(format!(
            "Data too small ({} bytes), likely not an image",
            data.len()
        )));
    }

    Ok(MediaArtifact {
        kind: MediaKind::Image,
        filename: filename.to_string(),
        data,
    })
}

/// Filename for an image URL.
///
/// Uses the URL's basename when it carries an extension, otherwise
/// `media_<digest>.jpg`. Depends on the URL alone, so the name is known
/// before anything is downloaded.
pub fn image_filename(url: &str) -> String {
    let basename = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(|s| s.to_string()))
        })
        .filter(|name| name.contains('.'));

    match basename {
        Some(name) => sanitize_filename(&name),
        None => format!("media_{}.jpg", digest(url)),
    }
}
