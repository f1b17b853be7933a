//! Face detection results: boxes, landmarks and expression scores.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Number of points produced by the landmark model.
pub const LANDMARK_COUNT: usize = 68;

/// A point in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn scaled(self, sx: f32, sy: f32) -> Self {
        Self::new(self.x * sx, self.y * sy)
    }
}

/// Axis-aligned face box in pixel coordinates, with the detector's confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Box width.
    pub width: f32,
    /// Box height.
    pub height: f32,
    /// Detection confidence (0.0-1.0).
    pub score: f32,
}

impl BoundingBox {
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32, score: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            score,
        }
    }

    /// Builds a box from corner coordinates.
    #[must_use]
    pub fn from_corners(x_min: f32, y_min: f32, x_max: f32, y_max: f32, score: f32) -> Self {
        Self::new(x_min, y_min, x_max - x_min, y_max - y_min, score)
    }

    #[must_use]
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Applies a per-axis linear scale to position and size. The score is kept.
    #[must_use]
    pub fn scaled(self, sx: f32, sy: f32) -> Self {
        Self::new(
            self.x * sx,
            self.y * sy,
            self.width * sx,
            self.height * sy,
            self.score,
        )
    }
}

/// The 68 facial landmark points of one face.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceLandmarks {
    points: Vec<Point>,
}

impl FaceLandmarks {
    /// Wraps exactly [`LANDMARK_COUNT`] points.
    ///
    /// Returns `None` for any other count.
    #[must_use]
    pub fn new(points: Vec<Point>) -> Option<Self> {
        (points.len() == LANDMARK_COUNT).then_some(Self { points })
    }

    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Jawline, points 0-16.
    #[must_use]
    pub fn jaw_outline(&self) -> &[Point] {
        &self.points[0..17]
    }

    /// Mouth, points 48-67.
    #[must_use]
    pub fn mouth(&self) -> &[Point] {
        &self.points[48..68]
    }

    #[must_use]
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            points: self.points.iter().map(|p| p.scaled(sx, sy)).collect(),
        }
    }
}

/// The closed set of expression categories, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    Neutral,
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgusted,
    Surprised,
}

impl Expression {
    /// Every category in declaration order. Tie-breaking follows this order.
    pub const ALL: [Self; 7] = [
        Self::Neutral,
        Self::Happy,
        Self::Sad,
        Self::Angry,
        Self::Fearful,
        Self::Disgusted,
        Self::Surprised,
    ];

    /// Number of categories.
    pub const COUNT: usize = Self::ALL.len();

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Fearful => "fearful",
            Self::Disgusted => "disgusted",
            Self::Surprised => "surprised",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-face confidence for every [`Expression`].
///
/// The expression model emits a softmax, so scores sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExpressionScores {
    scores: [f32; Expression::COUNT],
}

impl ExpressionScores {
    /// Creates scores from an array in [`Expression::ALL`] order.
    #[must_use]
    pub const fn from_array(scores: [f32; Expression::COUNT]) -> Self {
        Self { scores }
    }

    /// Creates scores from `(category, score)` pairs. Missing categories score 0.
    #[must_use]
    pub fn from_pairs(pairs: &[(Expression, f32)]) -> Self {
        let mut scores = [0.0; Expression::COUNT];
        for (expression, score) in pairs {
            scores[expression.index()] = *score;
        }
        Self { scores }
    }

    #[must_use]
    pub const fn get(&self, expression: Expression) -> f32 {
        self.scores[expression.index()]
    }

    /// Iterates `(category, score)` in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Expression, f32)> + '_ {
        Expression::ALL.iter().map(|e| (*e, self.get(*e)))
    }

    #[must_use]
    pub const fn as_array(&self) -> &[f32; Expression::COUNT] {
        &self.scores
    }
}

impl Serialize for ExpressionScores {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Expression::COUNT))?;
        for (expression, score) in self.iter() {
            map.serialize_entry(expression.as_str(), &score)?;
        }
        map.end()
    }
}

/// One detected face with its landmarks and expression scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceDetection {
    /// Face box in source-frame pixel coordinates.
    pub detection: BoundingBox,
    /// 68-point landmarks in source-frame pixel coordinates.
    pub landmarks: FaceLandmarks,
    /// Expression scores for this face.
    pub expressions: ExpressionScores,
}

impl FaceDetection {
    /// Rescales box and landmarks with the same linear transform.
    #[must_use]
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            detection: self.detection.scaled(sx, sy),
            landmarks: self.landmarks.scaled(sx, sy),
            expressions: self.expressions,
        }
    }
}
