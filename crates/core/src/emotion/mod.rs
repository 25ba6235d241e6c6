use std::fmt;

use serde::{Deserialize, Serialize};

/// Discrete mood category assigned to a detected face.
///
/// Labels are stored lowercase so that lookups are independent of the casing
/// used by whichever classifier produced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct EmotionLabel(String);

impl EmotionLabel {
    pub const HAPPY: &'static str = "happy";
    pub const SAD: &'static str = "sad";
    pub const ANGRY: &'static str = "angry";
    pub const SURPRISED: &'static str = "surprised";
    pub const NEUTRAL: &'static str = "neutral";

    pub fn new(label: impl AsRef<str>) -> Self {
        Self(label.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the label with its first character upper-cased and the rest
    /// lower-cased, e.g. `"Happy"`.
    pub fn capitalized(&self) -> String {
        let mut chars = self.0.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EmotionLabel {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EmotionLabel {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<EmotionLabel> for String {
    fn from(value: EmotionLabel) -> Self {
        value.0
    }
}

/// Classifier output for a single face: category name to confidence in
/// `[0, 1]`, kept in the order the classifier reported them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionScores {
    scores: Vec<(EmotionLabel, f32)>,
}

impl EmotionScores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a score, replacing any previous score for the same category.
    pub fn insert(&mut self, label: impl Into<EmotionLabel>, score: f32) {
        let label = label.into();
        let score = score.clamp(0.0, 1.0);
        match self.scores.iter_mut().find(|(existing, _)| *existing == label) {
            Some(entry) => entry.1 = score,
            None => self.scores.push((label, score)),
        }
    }

    /// Category with the highest confidence. Ties go to the category that was
    /// reported first.
    pub fn dominant(&self) -> Option<&EmotionLabel> {
        self.scores
            .iter()
            .fold(None::<&(EmotionLabel, f32)>, |best, entry| match best {
                Some(current) if current.1 >= entry.1 => Some(current),
                _ => Some(entry),
            })
            .map(|(label, _)| label)
    }
}

impl<L: Into<EmotionLabel>> FromIterator<(L, f32)> for EmotionScores {
    fn from_iter<T: IntoIterator<Item = (L, f32)>>(iter: T) -> Self {
        let mut scores = Self::new();
        for (label, score) in iter {
            scores.insert(label, score);
        }
        scores
    }
}
