//! Card content and media embedding.

use decksync_media::{MediaKind, MediaRef, MediaRequest};
use decksync_store::NoteFields;

/// Card side a piece of media is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardSide {
    /// Prompt side.
    Front,
    /// Answer side.
    Back,
}

/// A media request attached to one side of a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardMedia {
    /// Side the media is embedded in.
    pub side: CardSide,
    /// What to resolve.
    pub request: MediaRequest,
}

/// Uploaded media attached to one side of a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedMedia {
    /// Side the media is embedded in.
    pub side: CardSide,
    /// Store reference.
    pub media: MediaRef,
}

/// A rendered card, ready to sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardContent {
    /// Deduplication identity: the rendered front before media is embedded.
    pub front_key: String,
    /// Rendered front markup.
    pub front: String,
    /// Rendered back markup.
    pub back: String,
    /// Media to resolve and embed.
    pub media: Vec<CardMedia>,
    /// Tags given to a created entry.
    pub tags: Vec<String>,
}

impl CardContent {
    /// A card whose front text is its identity.
    pub fn new(front: impl Into<String>, back: impl Into<String>) -> Self {
        let front = front.into();
        Self {
            front_key: front.clone(),
            front,
            back: back.into(),
            media: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// Attach media to a side.
    pub fn with_media(mut self, side: CardSide, request: MediaRequest) -> Self {
        self.media.push(CardMedia { side, request });
        self
    }

    /// Attach media to the back.
    pub fn with_back_media(self, request: MediaRequest) -> Self {
        self.with_media(CardSide::Back, request)
    }

    /// Set tags.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Whether the stored front will carry media markup.
    pub fn has_front_media(&self) -> bool {
        self.media.iter().any(|m| m.side == CardSide::Front)
    }

    /// Field values with media embedded.
    ///
    /// Each side is its text, then image markup, then audio markup, each
    /// preceded by a line break.
    pub fn embed(&self, staged: &[StagedMedia]) -> NoteFields {
        NoteFields::new(
            embed_side(&self.front, CardSide::Front, staged),
            embed_side(&self.back, CardSide::Back, staged),
        )
    }
}

fn embed_side(text: &str, side: CardSide, staged: &[StagedMedia]) -> String {
    let mut out = text.to_string();
    for kind in [MediaKind::Image, MediaKind::Audio] {
        for item in staged
            .iter()
            .filter(|s| s.side == side && s.media.kind() == kind)
        {
            out.push_str("<br>");
            out.push_str(&item.media.markup());
        }
    }
    out
}
