use crate::rect::Rect;
use serde::Serialize;

/*------------------------------------------------------------------------------
Detection struct
------------------------------------------------------------------------------*/

/// One detector output for the current frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub rect: Rect<f32>,
    pub class_label: i32,
    /// Identifier supplied by the detector, echoed back on the tracklet that
    /// claims this detection.
    pub index: i32,
    pub confidence: Option<f32>,
}

impl Detection {
    pub fn new(rect: Rect<f32>, class_label: i32, index: i32) -> Self {
        Self {
            rect,
            class_label,
            index,
            confidence: None,
        }
    }

    pub fn with_confidence(self, confidence: f32) -> Self {
        Self {
            confidence: Some(confidence),
            ..self
        }
    }
}
