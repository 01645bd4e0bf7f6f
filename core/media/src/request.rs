//! Media requests, located media and uploaded references.

use bytes::Bytes;
use std::fmt;

/// Kind of media attached to a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Spoken pronunciation.
    Audio,
    /// Illustrative picture.
    Image,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Image => write!(f, "image"),
        }
    }
}

/// A request for one piece of media.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MediaRequest {
    /// Speech audio of `text` in a language.
    Audio {
        /// Text to speak.
        text: String,
        /// Language code, e.g. `fr` or `en-gb`.
        language: String,
    },
    /// Picture found by a search phrase.
    Image {
        /// Search phrase.
        query: String,
    },
}

impl MediaRequest {
    /// Audio request for `text` in `language`.
    pub fn audio(text: impl Into<String>, language: impl Into<String>) -> Self {
        Self::Audio {
            text: text.into(),
            language: language.into(),
        }
    }

    /// Image request for a search phrase.
    pub fn image(query: impl Into<String>) -> Self {
        Self::Image {
            query: query.into(),
        }
    }

    /// Kind of media requested.
    pub fn kind(&self) -> MediaKind {
        match self {
            Self::Audio { .. } => MediaKind::Audio,
            Self::Image { .. } => MediaKind::Image,
        }
    }

    /// Whether the request has nothing to resolve.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Audio { text, .. } => text.trim().is_empty(),
            Self::Image { query } => query.trim().is_empty(),
        }
    }
}

impl fmt::Display for MediaRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio { text, language } => write!(f, "audio '{}' ({})", text, language),
            Self::Image { query } => write!(f, "image '{}'", query),
        }
    }
}

/// Where the bytes of located media come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaOrigin {
    /// Synthesized from text.
    Speech {
        /// Text to speak.
        text: String,
        /// Language code.
        language: String,
    },
    /// Downloaded from a URL.
    Download {
        /// Location of the file.
        url: String,
    },
}

/// Media whose target filename is known but whose bytes are not yet fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedMedia {
    /// Kind of media.
    pub kind: MediaKind,
    /// Filename to upload under.
    pub filename: String,
    /// Where to fetch the bytes.
    pub origin: MediaOrigin,
}

/// Resolved payload ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaArtifact {
    /// Kind of media.
    pub kind: MediaKind,
    /// Suggested filename.
    pub filename: String,
    /// Payload.
    pub data: Bytes,
}

/// Store-assigned reference to an uploaded artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaRef {
    kind: MediaKind,
    name: String,
}

impl MediaRef {
    /// Reference to a stored file.
    pub fn new(kind: MediaKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Kind of the referenced media.
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Stored filename.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Markup embedding the reference in a card field.
    pub fn markup(&self) -> String {
        match self.kind {
            MediaKind::Image => format!("<img src=\"{}\">", self.name),
            MediaKind::Audio => format!("[sound:{}]", self.name),
        }
    }
}
