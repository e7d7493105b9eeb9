use serde::{Deserialize, Deserializer, Serialize};

/// Axis-aligned rectangle in page-image pixels, `(x0, y0)` top-left and
/// `(x1, y1)` bottom-right. Serialized as `[x0, y0, x1, y1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BoundingBox {
    /// Corners are reordered so that `x0 <= x1` and `y0 <= y1`.
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// From the `left, top, width, height` form most OCR engines report.
    pub fn from_ltwh(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self::new(left, top, left + width, top + height)
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn center_x(&self) -> f64 {
        (self.x0 + self.x1) / 2.0
    }

    pub fn center_y(&self) -> f64 {
        (self.y0 + self.y1) / 2.0
    }

    /// Length of the shared vertical span with the band `[top, bottom]`.
    pub fn vertical_overlap(&self, top: f64, bottom: f64) -> f64 {
        (self.y1.min(bottom) - self.y0.max(top)).max(0.0)
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(v: [f64; 4]) -> Self {
        BoundingBox::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x0, b.y0, b.x1, b.y1]
    }
}

/// One piece of recognized text as reported by the OCR engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    pub text: String,
    /// Recognition confidence (0.0–1.0).
    #[serde(deserialize_with = "clamped_confidence")]
    pub confidence: f32,
    pub bbox: BoundingBox,
    #[serde(default)]
    pub page_no: u32,
}

impl TextFragment {
    pub fn new(text: impl Into<String>, confidence: f32, bbox: BoundingBox, page_no: u32) -> Self {
        Self {
            text: text.into(),
            confidence: clamp_confidence(confidence),
            bbox,
            page_no,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

fn clamp_confidence(c: f32) -> f32 {
    if c.is_nan() {
        0.0
    } else {
        c.clamp(0.0, 1.0)
    }
}

fn clamped_confidence<'de, D: Deserializer<'de>>(d: D) -> Result<f32, D::Error> {
    f32::deserialize(d).map(clamp_confidence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_normalizes_corners() {
        let b = BoundingBox::new(10.0, 20.0, 0.0, 5.0);
        assert_eq!(b, BoundingBox { x0: 0.0, y0: 5.0, x1: 10.0, y1: 20.0 });
        assert_eq!(b.width(), 10.0);
        assert_eq!(b.height(), 15.0);
    }

    #[test]
    fn bbox_from_ltwh() {
        let b = BoundingBox::from_ltwh(100.0, 50.0, 40.0, 10.0);
        assert_eq!(b.center_x(), 120.0);
        assert_eq!(b.center_y(), 55.0);
    }

    #[test]
    fn vertical_overlap_is_clamped_at_zero() {
        let b = BoundingBox::new(0.0, 10.0, 5.0, 20.0);
        assert_eq!(b.vertical_overlap(15.0, 30.0), 5.0);
        assert_eq!(b.vertical_overlap(25.0, 30.0), 0.0);
    }

    #[test]
    fn fragment_confidence_clamped() {
        let f = TextFragment::new("x", 1.7, BoundingBox::new(0.0, 0.0, 1.0, 1.0), 1);
        assert_eq!(f.confidence, 1.0);
        let f = TextFragment::new("x", f32::NAN, BoundingBox::new(0.0, 0.0, 1.0, 1.0), 1);
        assert_eq!(f.confidence, 0.0);
    }

    #[test]
    fn fragment_deserializes_bbox_array_and_clamps() {
        let json = r#"{"text":"Qty","confidence":-0.2,"bbox":[300,10,340,30]}"#;
        let f: TextFragment = serde_json::from_str(json).unwrap();
        assert_eq!(f.confidence, 0.0);
        assert_eq!(f.bbox.x1, 340.0);
        assert_eq!(f.page_no, 0);
    }

    #[test]
    fn blank_text_detected() {
        let f = TextFragment::new("   ", 0.9, BoundingBox::new(0.0, 0.0, 1.0, 1.0), 1);
        assert!(f.is_blank());
    }
}
