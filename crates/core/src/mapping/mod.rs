use std::fmt;

use serde::{Deserialize, Serialize};

use crate::EmotionLabel;

/// Genre used whenever an emotion has no dedicated entry.
pub const DEFAULT_GENRE: &str = "pop";

/// Fixed emotion to genre routing. Not learned or adaptive.
const GENRE_TABLE: &[(&str, &str)] = &[
    (EmotionLabel::HAPPY, "pop"),
    (EmotionLabel::SAD, "sad"),
    (EmotionLabel::ANGRY, "rock"),
    (EmotionLabel::SURPRISED, "dance"),
    (EmotionLabel::NEUTRAL, "chill"),
];

/// Music-genre string used as a catalog search filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreTag(String);

impl GenreTag {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Catalog query restricting results to this genre.
    pub fn search_query(&self) -> String {
        format!("genre:\"{}\"", self.0)
    }
}

impl fmt::Display for GenreTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves an emotion to its genre. Total: unknown labels fall back to
/// [`DEFAULT_GENRE`].
pub fn genre_for(emotion: &EmotionLabel) -> GenreTag {
    let genre = GENRE_TABLE
        .iter()
        .find(|(label, _)| *label == emotion.as_str())
        .map(|(_, genre)| *genre)
        .unwrap_or(DEFAULT_GENRE);
    GenreTag(genre.to_string())
}
