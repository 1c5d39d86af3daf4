use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum LandmarkError {
    #[error("landmark {index} missing (face has {available} points)")]
    MissingLandmark { index: usize, available: usize },
    #[error("malformed landmark JSON: {0}")]
    Malformed(String),
}

/// A point in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// A face-mesh keypoint, normalized to [0, 1] of the frame width and height.
///
/// `z` is relative depth (same scale as `x`); it is carried but unused by
/// the 2D placement math.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedLandmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

/// All keypoints for one face, in face-mesh index order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub points: Vec<NormalizedLandmark>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LandmarkDocument {
    Bare(Vec<NormalizedLandmark>),
    Wrapped { landmarks: Vec<NormalizedLandmark> },
}

impl FaceLandmarks {
    pub fn new(points: Vec<NormalizedLandmark>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Landmark `index` scaled to pixel coordinates of a `width`×`height` frame.
    pub fn pixel(&self, index: usize, width: u32, height: u32) -> Result<Point, LandmarkError> {
        let p = self.points.get(index).ok_or(LandmarkError::MissingLandmark {
            index,
            available: self.points.len(),
        })?;
        Ok(Point::new(p.x * width as f32, p.y * height as f32))
    }

    /// Parse a landmark dump: either a bare `[{x, y, z}, ...]` array or
    /// `{"landmarks": [...]}`.
    pub fn from_json(json: &str) -> Result<Self, LandmarkError> {
        let doc: LandmarkDocument =
            serde_json::from_str(json).map_err(|e| LandmarkError::Malformed(e.to_string()))?;
        let points = match doc {
            LandmarkDocument::Bare(points) => points,
            LandmarkDocument::Wrapped { landmarks } => landmarks,
        };
        Ok(Self { points })
    }

    /// Axis-aligned bounds in normalized coordinates: (min_x, min_y, max_x, max_y).
    pub fn bounds(&self) -> Option<(f32, f32, f32, f32)> {
        let first = self.points.first()?;
        let init = (first.x, first.y, first.x, first.y);
        Some(self.points.iter().fold(init, |(x0, y0, x1, y1), p| {
            (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y))
        }))
    }
}

/// The two overlay families the try-on supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JewelryKind {
    Chain,
    Earring,
}

impl JewelryKind {
    pub const ALL: [JewelryKind; 2] = [JewelryKind::Chain, JewelryKind::Earring];

    /// Asset subdirectory holding images of this kind.
    pub fn asset_dir(&self) -> &'static str {
        match self {
            JewelryKind::Chain => "chains",
            JewelryKind::Earring => "earrings",
        }
    }
}

impl fmt::Display for JewelryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JewelryKind::Chain => f.write_str("chain"),
            JewelryKind::Earring => f.write_str("earring"),
        }
    }
}

impl FromStr for JewelryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chain" | "chains" | "necklace" => Ok(JewelryKind::Chain),
            "earring" | "earrings" => Ok(JewelryKind::Earring),
            other => Err(format!("unknown jewelry kind: {other:?} (expected chain or earring)")),
        }
    }
}

/// One selectable overlay: a display name and where its image lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JewelryItem {
    pub name: String,
    /// Local file path, `http(s)://` URL, or inline `data:` URI.
    #[serde(alias = "data")]
    pub image: String,
}

impl JewelryItem {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
        }
    }

    pub fn is_remote(&self) -> bool {
        self.image.starts_with("http://") || self.image.starts_with("https://")
    }

    pub fn is_inline(&self) -> bool {
        self.image.starts_with("data:")
    }
}
