//! Languages, content types and where their sources live.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use decksync_common::{ContainerPath, Error, Result};

/// Kind of content a batch holds. Declaration order is processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Phonetic alphabet symbols.
    Ipa,
    /// Spelling-to-sound rules.
    PronunciationRules,
    /// Word lists.
    Vocabulary,
}

impl ContentType {
    /// All content types in processing order.
    pub const ALL: [ContentType; 3] = [
        ContentType::Ipa,
        ContentType::PronunciationRules,
        ContentType::Vocabulary,
    ];

    /// Name of the container level for this type.
    pub fn display_name(&self) -> &'static str {
        match self {
            ContentType::Ipa => "IPA",
            ContentType::PronunciationRules => "Pronunciation Rules",
            ContentType::Vocabulary => "Basic Vocabulary",
        }
    }

    /// Source folder under the data directory.
    pub fn folder(&self) -> &'static str {
        match self {
            ContentType::Ipa => "ipa_card_data",
            ContentType::PronunciationRules => "pronunciation_rules",
            ContentType::Vocabulary => "vocabulary",
        }
    }

    /// Columns every source of this type must have.
    pub fn required_columns(&self) -> &'static [&'static str] {
        match self {
            ContentType::Ipa => &[
                "ipa",
                "description",
                "example_word",
                "english_translation",
                "word_ipa",
            ],
            ContentType::PronunciationRules => &[
                "rule",
                "explanation",
                "example_word",
                "example_ipa",
                "image_query",
            ],
            ContentType::Vocabulary => &["word", "translation"],
        }
    }

    /// Tag given to every entry of this type.
    pub fn tag(&self) -> &'static str {
        match self {
            ContentType::Ipa => "ipa",
            ContentType::PronunciationRules => "pronunciation",
            ContentType::Vocabulary => "vocabulary",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "ipa" => Ok(ContentType::Ipa),
            "pronunciation_rules" | "rules" | "pronunciation" => Ok(ContentType::PronunciationRules),
            "vocabulary" | "basic_vocabulary" | "vocab" => Ok(ContentType::Vocabulary),
            other => Err(Error::InvalidInput(format!("Unknown content type: {}", other))),
        }
    }
}

/// Whether to skip populated containers and update existing entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupPolicy {
    /// Skip a whole batch when its container already has entries.
    pub skip_populated: bool,
    /// Overwrite matching entries instead of skipping them.
    pub update_existing: bool,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self {
            skip_populated: true,
            update_existing: false,
        }
    }
}

/// Source and policy for one content type of a language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTypeSpec {
    /// Kind of content.
    pub content_type: ContentType,
    /// Source file name.
    pub file: String,
    /// Source folder, if not the type's default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    /// Override of the container skip policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_populated: Option<bool>,
    /// Override of the update policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_existing: Option<bool>,
}

impl ContentTypeSpec {
    /// Spec reading `file` from the type's default folder.
    pub fn new(content_type: ContentType, file: impl Into<String>) -> Self {
        Self {
            content_type,
            file: file.into(),
            folder: None,
            skip_populated: None,
            update_existing: None,
        }
    }

    /// Source folder.
    pub fn folder(&self) -> &str {
        self.folder
            .as_deref()
            .unwrap_or_else(|| self.content_type.folder())
    }

    /// Required columns.
    pub fn required_columns(&self) -> &'static [&'static str] {
        self.content_type.required_columns()
    }

    /// Effective policy, falling back to `defaults` where not overridden.
    pub fn policy(&self, defaults: DedupPolicy) -> DedupPolicy {
        DedupPolicy {
            skip_populated: self.skip_populated.unwrap_or(defaults.skip_populated),
            update_existing: self.update_existing.unwrap_or(defaults.update_existing),
        }
    }
}

/// A language and its content sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSpec {
    /// Display name, also the top container level.
    pub name: String,
    /// Language code used for speech.
    pub code: String,
    /// Sources by content type.
    pub content: Vec<ContentTypeSpec>,
}

impl LanguageSpec {
    /// Language with IPA and pronunciation-rule sources,
    /// `<file_stem>_ipa_cards.csv` and `<file_stem>_rules.csv`.
    pub fn standard(
        name: impl Into<String>,
        code: impl Into<String>,
        file_stem: impl AsRef<str>,
    ) -> Self {
        let file_stem = file_stem.as_ref();
        Self {
            name: name.into(),
            code: code.into(),
            content: vec![
                ContentTypeSpec::new(ContentType::Ipa, format!("{}_ipa_cards.csv", file_stem)),
                ContentTypeSpec::new(
                    ContentType::PronunciationRules,
                    format!("{}_rules.csv", file_stem),
                ),
            ],
        }
    }

    /// Add a content source.
    pub fn with_content(mut self, spec: ContentTypeSpec) -> Self {
        self.content.push(spec);
        self
    }

    /// Whether `filter` names this language by name or code.
    pub fn matches(&self, filter: &str) -> bool {
        self.name.eq_ignore_ascii_case(filter) || self.code.eq_ignore_ascii_case(filter)
    }
}

/// One (language, content type) unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    /// Language display name.
    pub language: String,
    /// Language code.
    pub language_code: String,
    /// Source and policy.
    pub spec: ContentTypeSpec,
    /// Target container.
    pub container: ContainerPath,
}

impl BatchPlan {
    /// Tags given to every entry of this batch.
    pub fn tags(&self) -> Vec<String> {
        vec![
            self.language.to_lowercase(),
            self.spec.content_type.tag().to_string(),
        ]
    }
}

/// Restricts a run to some languages or content types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchFilter {
    /// Language names or codes; empty means all.
    pub languages: Vec<String>,
    /// Content types; empty means all.
    pub content_types: Vec<ContentType>,
}

impl BatchFilter {
    fn accepts(&self, language: &LanguageSpec, content_type: ContentType) -> bool {
        (self.languages.is_empty() || self.languages.iter().any(|l| language.matches(l)))
            && (self.content_types.is_empty() || self.content_types.contains(&content_type))
    }
}

/// Configured languages, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentRegistry {
    languages: Vec<LanguageSpec>,
}

impl ContentRegistry {
    /// Registry of the given languages.
    pub fn new(languages: Vec<LanguageSpec>) -> Self {
        Self { languages }
    }

    /// Configured languages.
    pub fn languages(&self) -> &[LanguageSpec] {
        &self.languages
    }

    /// Batches to run: languages in insertion order, then content types in
    /// their fixed order.
    ///
    /// # Errors
    /// - A language name or content type yields an invalid container path
    pub fn plan(&self, filter: &BatchFilter) -> Result<Vec<BatchPlan>> {
        let mut plans = Vec::new();
        for language in &self.languages {
            let mut specs: Vec<&ContentTypeSpec> = language
                .content
                .iter()
                .filter(|spec| filter.accepts(language, spec.content_type))
                .collect();
            specs.sort_by_key(|spec| spec.content_type);

            for spec in specs {
                let container = ContainerPath::from_components(vec![
                    language.name.clone(),
                    spec.content_type.display_name().to_string(),
                ])?;
                plans.push(BatchPlan {
                    language: language.name.clone(),
                    language_code: language.code.clone(),
                    spec: spec.clone(),
                    container,
                });
            }
        }
        Ok(plans)
    }
}

impl Default for ContentRegistry {
    fn default() -> Self {
        Self::new(vec![
            LanguageSpec::standard("French", "fr", "french"),
            LanguageSpec::standard("English (British)", "en-gb", "british_english"),
            LanguageSpec::standard("Spanish", "es", "spanish"),
            LanguageSpec::standard("German", "de", "german"),
            LanguageSpec::standard("Russian", "ru", "russian"),
        ])
    }
}
