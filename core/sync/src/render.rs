//! Fixed card layouts per content type.

use decksync_common::{ContentRecord, Result};
use decksync_media::MediaRequest;

use crate::card::CardContent;
use crate::registry::ContentType;

/// Render a source record as a card.
///
/// # Errors
/// - The record lacks a field the layout needs
pub fn render_card(
    content_type: ContentType,
    record: &ContentRecord,
    language_code: &str,
    tags: &[String],
) -> Result<CardContent> {
    let card = match content_type {
        ContentType::Ipa => render_ipa(record, language_code)?,
        ContentType::PronunciationRules => render_rule(record, language_code)?,
        ContentType::Vocabulary => render_vocabulary(record, language_code)?,
    };
    Ok(card.with_tags(tags.to_vec()))
}

fn render_ipa(record: &ContentRecord, language_code: &str) -> Result<CardContent> {
    let ipa = record.require("ipa")?;
    let description = record.require("description")?;
    let example_word = record.require("example_word")?;
    let translation = record.require("english_translation")?;
    let word_ipa = record.require("word_ipa")?;

    let back = format!(
        "<b>Example:</b> {} <big>{}</big><br><br>{}<br><br><i>English:</i> {}",
        example_word, word_ipa, description, translation
    );

    Ok(CardContent::new(format!("<big>{}</big>", ipa), back)
        .with_back_media(MediaRequest::image(translation))
        .with_back_media(MediaRequest::audio(example_word, language_code)))
}

fn render_rule(record: &ContentRecord, language_code: &str) -> Result<CardContent> {
    let rule = record.require("rule")?;
    let mut back = record.require("explanation")?.to_string();

    let mut card_audio = None;
    if let Some(example) = record.non_empty("example_word") {
        back.push_str(&format!("<br><br><b>Example:</b> {}", example));
        if let Some(ipa) = record.non_empty("example_ipa") {
            back.push_str(&format!(" → {}", ipa));
        }
        card_audio = Some(MediaRequest::audio(example, language_code));
    }

    let mut card = CardContent::new(rule, back);
    if let Some(query) = record.non_empty("image_query") {
        card = card.with_back_media(MediaRequest::image(query));
    }
    if let Some(audio) = card_audio {
        card = card.with_back_media(audio);
    }
    Ok(card)
}

fn render_vocabulary(record: &ContentRecord, language_code: &str) -> Result<CardContent> {
    let word = record.require("word")?;
    let translation = record.require("translation")?;

    let mut back = format!("<b>{}</b>", translation);
    if let Some(sentence) = record.non_empty("example_sentence") {
        back.push_str(&format!("<br><br><i>Example:</i> {}", sentence));
    }

    Ok(CardContent::new(word, back)
        .with_back_media(MediaRequest::image(translation))
        .with_back_media(MediaRequest::audio(word, language_code)))
}
