//! Post content rules: 1 to 255 user-perceived characters, emoji only.
//!
//! Lengths are counted in extended grapheme clusters, so a family emoji
//! joined from seven code points is one character.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use unicode_properties::{UnicodeEmoji, emoji::is_emoji_presentation_selector};
use unicode_segmentation::UnicodeSegmentation;

pub const POST_CONTENT_MAX_LEN: usize = 255;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentError {
    #[error("Post must not be empty")]
    Empty,
    #[error("Post must be at most 255 characters")]
    TooLong,
    #[error("Only emojis are allowed")]
    NotEmojiOnly,
}

/// Checks `raw` against the content rules and hands it back untouched.
pub fn validate(raw: &str) -> Result<&str, ContentError> {
    if raw.trim().is_empty() {
        return Err(ContentError::Empty);
    }

    if raw.graphemes(true).count() > POST_CONTENT_MAX_LEN {
        return Err(ContentError::TooLong);
    }

    if !raw.graphemes(true).all(is_emoji_grapheme) {
        return Err(ContentError::NotEmojiOnly);
    }

    Ok(raw)
}

/// Whether a single grapheme cluster is an emoji: its first scalar carries
/// the Unicode `Emoji` property, and the Latin-1 ones (`©`, `®`, digits,
/// `#`, `*`) only count with an emoji presentation selector or as a keycap.
#[must_use]
pub fn is_emoji_grapheme(grapheme: &str) -> bool {
    let mut chars = grapheme.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    // Keycaps: 1️⃣ #️⃣ *️⃣
    if matches!(first, '0'..='9' | '#' | '*') {
        return grapheme.contains('\u{20E3}');
    }

    if !first.is_emoji_char() {
        return false;
    }

    u32::from(first) > 0xFF || chars.any(is_emoji_presentation_selector)
}
