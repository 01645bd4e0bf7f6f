//! Media resolution for decksync cards.
//!
//! Turns `(text, language)` pairs into speech audio and search phrases into
//! images. Resolution is two-phase: `locate` settles the filename an
//! artifact will be stored under, `fetch` produces its bytes. This lets
//! callers skip fetching media the store already holds.

pub mod filename;
pub mod image;
pub mod request;
pub mod resolver;
pub mod speech;

pub use filename::{audio_filename, safe_stem, sanitize_filename};
pub use image::{ImageService, ImageSource, PixabayClient};
pub use request::{LocatedMedia, MediaArtifact, MediaKind, MediaOrigin, MediaRef, MediaRequest};
pub use resolver::{MediaConfig, MediaResolver};
pub use speech::{GoogleTranslateTts, SpeechService, SpeechSynthesizer};
