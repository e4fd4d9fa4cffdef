//! Text fragment model
//!
//! Normalized form of a single OCR detection. Fragments are only built
//! through [`TextFragment::from_raw`], which enforces the box and confidence
//! invariants at the recognition boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A point in image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Quadrilateral bounding box as reported by the recognizer (4 corners)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    points: [Point; 4],
}

impl BoundingBox {
    pub fn new(points: [Point; 4]) -> Self {
        Self { points }
    }

    /// Axis-aligned box from (x, y, width, height)
    pub fn from_rect(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new([
            Point { x, y },
            Point { x: x + width, y },
            Point {
                x: x + width,
                y: y + height,
            },
            Point { x, y: y + height },
        ])
    }

    pub fn points(&self) -> &[Point; 4] {
        &self.points
    }

    pub fn min_x(&self) -> f32 {
        self.points.iter().map(|p| p.x).fold(f32::INFINITY, f32::min)
    }

    pub fn max_x(&self) -> f32 {
        self.points.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn min_y(&self) -> f32 {
        self.points.iter().map(|p| p.y).fold(f32::INFINITY, f32::min)
    }

    pub fn max_y(&self) -> f32 {
        self.points.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn center_x(&self) -> f32 {
        (self.min_x() + self.max_x()) / 2.0
    }
}

/// One OCR detection: text, position and confidence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextFragment {
    index: usize,
    text: String,
    bbox: BoundingBox,
    confidence: f32,
}

impl TextFragment {
    /// Build a fragment from already-validated parts
    ///
    /// `index` is the fragment's position in the recognition output of its page.
    pub fn new(index: usize, text: impl Into<String>, bbox: BoundingBox, confidence: f32) -> Option<Self> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return None;
        }
        if bbox.points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return None;
        }
        Some(Self {
            index,
            text: text.into(),
            bbox,
            confidence,
        })
    }

    /// Validate a raw detection from the recognizer
    pub fn from_raw(index: usize, raw: &RawDetection) -> Result<Self, FragmentDefect> {
        let (bbox, text, confidence) = raw.parts().ok_or(FragmentDefect::UnrecognizedShape)?;
        let bbox = parse_bbox(bbox)?;
        let confidence = confidence
            .as_f64()
            .ok_or(FragmentDefect::NonNumericConfidence)? as f32;

        Self::new(index, text, bbox, confidence).ok_or(FragmentDefect::ConfidenceOutOfRange(confidence))
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Minimum y of the box
    pub fn top(&self) -> f32 {
        self.bbox.min_y()
    }

    pub fn left(&self) -> f32 {
        self.bbox.min_x()
    }

    pub fn center_x(&self) -> f32 {
        self.bbox.center_x()
    }
}

/// Detection as emitted by a recognizer, before validation
///
/// Accepts both the positional `[bbox, text, confidence]` tuple and the
/// `{"bbox", "text", "confidence"}` record. Any other item is kept as
/// `Unrecognized` so one bad entry never fails the whole list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawDetection {
    Tuple(Value, String, Value),
    Record {
        bbox: Value,
        text: String,
        confidence: Value,
    },
    Unrecognized(Value),
}

impl RawDetection {
    fn parts(&self) -> Option<(&Value, &str, &Value)> {
        match self {
            RawDetection::Tuple(bbox, text, confidence) => Some((bbox, text, confidence)),
            RawDetection::Record {
                bbox,
                text,
                confidence,
            } => Some((bbox, text, confidence)),
            RawDetection::Unrecognized(_) => None,
        }
    }

    /// Detection text, empty for unrecognized items
    pub fn text(&self) -> &str {
        self.parts().map_or("", |(_, text, _)| text)
    }
}

/// Reason a raw detection was dropped
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FragmentDefect {
    #[error("not a detection tuple or record")]
    UnrecognizedShape,
    #[error("bounding box has {0} points, expected 4")]
    WrongPointCount(usize),
    #[error("bounding box is not a list of points")]
    MalformedBox,
    #[error("non-numeric or non-finite coordinate")]
    NonNumericCoordinate,
    #[error("non-numeric confidence")]
    NonNumericConfidence,
    #[error("confidence {0} outside [0, 1]")]
    ConfidenceOutOfRange(f32),
}

fn parse_bbox(value: &Value) -> Result<BoundingBox, FragmentDefect> {
    let points = value.as_array().ok_or(FragmentDefect::MalformedBox)?;
    if points.len() != 4 {
        return Err(FragmentDefect::WrongPointCount(points.len()));
    }

    let mut parsed = [Point { x: 0.0, y: 0.0 }; 4];
    for (slot, point) in parsed.iter_mut().zip(points) {
        let coords = point.as_array().ok_or(FragmentDefect::MalformedBox)?;
        if coords.len() != 2 {
            return Err(FragmentDefect::MalformedBox);
        }
        let x = coords[0].as_f64().ok_or(FragmentDefect::NonNumericCoordinate)? as f32;
        let y = coords[1].as_f64().ok_or(FragmentDefect::NonNumericCoordinate)? as f32;
        if !x.is_finite() || !y.is_finite() {
            return Err(FragmentDefect::NonNumericCoordinate);
        }
        *slot = Point { x, y };
    }

    Ok(BoundingBox::new(parsed))
}
