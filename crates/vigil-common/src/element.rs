use crate::error::ElementError;
use serde::{Deserialize, Serialize};

/// An integer pixel position on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1440,
            height: 900,
        }
    }
}

/// Pixel-space box `[x1, y1, x2, y2]` with `x1 < x2` and `y1 < y2`.
///
/// Serialized as a four-element array, matching what detection backends emit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self, ElementError> {
        // NaN fails both comparisons.
        if x1 < x2 && y1 < y2 {
            Ok(Self { x1, y1, x2, y2 })
        } else {
            Err(ElementError::InvalidBoundingBox { x1, y1, x2, y2 })
        }
    }

    pub fn x1(&self) -> f64 {
        self.x1
    }

    pub fn y1(&self) -> f64 {
        self.y1
    }

    pub fn x2(&self) -> f64 {
        self.x2
    }

    pub fn y2(&self) -> f64 {
        self.y2
    }

    /// Integer midpoint, truncated toward zero.
    pub fn center(&self) -> Point {
        Point::new(
            ((self.x1 + self.x2) / 2.0).trunc() as i64,
            ((self.y1 + self.y2) / 2.0).trunc() as i64,
        )
    }
}

impl TryFrom<[f64; 4]> for BoundingBox {
    type Error = ElementError;

    fn try_from([x1, y1, x2, y2]: [f64; 4]) -> Result<Self, Self::Error> {
        Self::new(x1, y1, x2, y2)
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// A UI element detected in a screenshot. Ids are unique within one
/// perception call only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ElementWire")]
pub struct UIElement {
    pub id: String,
    pub bbox: BoundingBox,
    #[serde(rename = "type")]
    pub element_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

#[derive(Deserialize)]
struct ElementWire {
    id: String,
    bbox: BoundingBox,
    #[serde(rename = "type")]
    element_type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

impl TryFrom<ElementWire> for UIElement {
    type Error = ElementError;

    fn try_from(wire: ElementWire) -> Result<Self, Self::Error> {
        if !(0.0..=1.0).contains(&wire.confidence) {
            return Err(ElementError::ConfidenceOutOfRange(wire.confidence));
        }
        Ok(Self {
            id: wire.id,
            bbox: wire.bbox,
            element_type: wire.element_type,
            text: wire.text,
            confidence: wire.confidence,
        })
    }
}

impl UIElement {
    pub fn new(id: impl Into<String>, bbox: BoundingBox, element_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            bbox,
            element_type: element_type.into(),
            text: None,
            confidence: default_confidence(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_center_truncates() {
        let b = BoundingBox::new(0.0, 0.0, 10.0, 10.0).unwrap();
        assert_eq!(b.center(), Point::new(5, 5));

        let b = BoundingBox::new(1.0, 2.0, 4.0, 7.0).unwrap();
        assert_eq!(b.center(), Point::new(2, 4));
    }

    #[test]
    fn test_rejects_inverted_box() {
        assert!(BoundingBox::new(10.0, 0.0, 0.0, 10.0).is_err());
        assert!(BoundingBox::new(0.0, 5.0, 10.0, 5.0).is_err());
        assert!(BoundingBox::new(f64::NAN, 0.0, 1.0, 1.0).is_err());
    }

    #[test]
    fn test_element_wire_shape() {
        let el: UIElement = serde_json::from_value(json!({
            "id": "yolo-0",
            "bbox": [10, 20, 30, 40],
            "type": "button"
        }))
        .unwrap();
        assert_eq!(el.id, "yolo-0");
        assert_eq!(el.element_type, "button");
        assert_eq!(el.confidence, 1.0);
        assert_eq!(el.bbox.center(), Point::new(20, 30));

        let bad = serde_json::from_value::<UIElement>(json!({
            "id": "x",
            "bbox": [30, 20, 10, 40],
            "type": "button"
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn test_element_confidence_must_be_a_probability() {
        let el: UIElement = serde_json::from_value(json!({
            "id": "yolo-1",
            "bbox": [0, 0, 5, 5],
            "type": "link",
            "confidence": 0.0
        }))
        .unwrap();
        assert_eq!(el.confidence, 0.0);

        for confidence in [1.2, -0.1] {
            let err = serde_json::from_value::<UIElement>(json!({
                "id": "yolo-1",
                "bbox": [0, 0, 5, 5],
                "type": "link",
                "confidence": confidence
            }))
            .unwrap_err();
            assert!(err.to_string().contains("outside [0, 1]"), "{err}");
        }
    }
}
