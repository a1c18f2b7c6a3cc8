//! OCR engine interface
//!
//! Recognition is delegated to an external engine. Implementations wrap the
//! platform recognizer and report lines in upright space, already split into
//! the engine's own word-level elements.

use anyhow::Result;
use async_trait::async_trait;

use crate::capture::Frame;
use crate::geometry::{BoundingBox, Rotation};

/// External text recognizer
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize text in `frame`, rotated upright by `rotation`
    ///
    /// Bounding boxes in the returned lines are in upright space.
    async fn recognize(&self, frame: &Frame, rotation: Rotation) -> Result<Vec<RecognizedLine>>;
}

/// Single line as reported by the engine
#[derive(Debug, Clone)]
pub struct RecognizedLine {
    /// Recognized text
    pub text: String,
    /// Line bounds in upright space
    pub bounds: BoundingBox,
    /// Recognition confidence (0.0 - 1.0)
    pub confidence: f32,
    /// Engine language tag, if reported
    pub language: Option<String>,
    /// Word-level sub-elements in reading order
    pub elements: Vec<RecognizedElement>,
}

/// Word-level element inside a recognized line
#[derive(Debug, Clone)]
pub struct RecognizedElement {
    pub text: String,
    /// Element bounds in upright space
    pub bounds: BoundingBox,
    pub confidence: f32,
}
