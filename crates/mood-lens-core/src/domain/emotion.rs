//! Reduction of expression scores to a single displayed label.

use serde::Serialize;

use super::{ExpressionScores, FaceDetection};

/// Separator between tied category names.
const TIE_SEPARATOR: &str = ", ";

/// The label shown to the user: one category name, or several joined on a tie.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EmotionLabel(String);

impl EmotionLabel {
    /// The label before any face has been seen.
    #[must_use]
    pub const fn empty() -> Self {
        Self(String::new())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EmotionLabel {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Returns every category that reaches the maximum score, in declaration order.
///
/// Comparison is exact: two categories tie only when the model produced
/// bit-identical scores. NaN scores never match.
#[must_use]
pub fn dominant(scores: &ExpressionScores) -> EmotionLabel {
    let max = scores
        .iter()
        .map(|(_, score)| score)
        .fold(f32::NEG_INFINITY, f32::max);

    #[allow(clippy::float_cmp)]
    let names: Vec<&str> = scores
        .iter()
        .filter(|(_, score)| *score == max)
        .map(|(expression, _)| expression.as_str())
        .collect();

    EmotionLabel(names.join(TIE_SEPARATOR))
}

/// Holds the current label across frames.
#[derive(Debug, Clone)]
pub struct EmotionState {
    current: EmotionLabel,
    retain_on_empty: bool,
}

impl EmotionState {
    /// Creates a state that keeps its label when no face is detected.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_policy(true)
    }

    /// Creates a state with an explicit policy for frames without faces.
    ///
    /// With `retain_on_empty = false` the label is cleared when detection drops.
    #[must_use]
    pub const fn with_policy(retain_on_empty: bool) -> Self {
        Self {
            current: EmotionLabel::empty(),
            retain_on_empty,
        }
    }

    #[must_use]
    pub const fn current(&self) -> &EmotionLabel {
        &self.current
    }

    /// Updates the label from one frame's detections.
    ///
    /// Only the first face is consulted. Returns the new label when it changed.
    pub fn observe(&mut self, detections: &[FaceDetection]) -> Option<&EmotionLabel> {
        let next = match detections.first() {
            Some(face) => dominant(&face.expressions),
            None if self.retain_on_empty => return None,
            None => EmotionLabel::empty(),
        };

        if next == self.current {
            return None;
        }
        self.current = next;
        Some(&self.current)
    }
}

impl Default for EmotionState {
    fn default() -> Self {
        Self::new()
    }
}
