//! Vision Layer
//!
//! Turns admitted frames into Japanese text annotations:
//! - OCR engine interface and Japanese line filtering (`detection`)
//! - Background brightness sampling for adaptive contrast (`luminance`)

pub mod detection;
pub mod luminance;
pub mod ocr;

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, SystemTime};

use serde::Serialize;

use crate::furigana::Reading;
use crate::geometry::BoundingBox;

pub use detection::{contains_kanji, is_japanese, is_kanji, japanese_ratio, TextDetector};
pub use luminance::LuminanceSampler;
pub use ocr::{OcrEngine, RecognizedElement, RecognizedLine};

/// Word-level segment of a detected line
#[derive(Debug, Clone, Serialize)]
pub struct DetectedWord {
    /// Word text
    pub text: String,
    /// Bounding box in upright space
    pub bounds: BoundingBox,
    /// Contains at least one kanji
    pub has_kanji: bool,
    /// Reading, once enrichment found one
    reading: Option<Reading>,
}

impl DetectedWord {
    pub fn new(text: impl Into<String>, bounds: BoundingBox) -> Self {
        let text = text.into();
        let has_kanji = contains_kanji(&text);
        Self {
            text,
            bounds,
            has_kanji,
            reading: None,
        }
    }

    pub fn reading(&self) -> Option<&Reading> {
        self.reading.as_ref()
    }

    /// Attach a reading; an existing reading is never replaced
    ///
    /// Returns true if the reading was attached.
    pub fn attach_reading(&mut self, reading: Reading) -> bool {
        if self.reading.is_some() {
            return false;
        }
        self.reading = Some(reading);
        true
    }
}

/// Japanese text line that survived filtering
#[derive(Debug, Clone, Serialize)]
pub struct DetectedLine {
    pub text: String,
    /// Recognition confidence (0.0 - 1.0)
    pub confidence: f32,
    /// Bounding box in upright space
    pub bounds: BoundingBox,
    /// Language tag
    pub language: String,
    /// Contains at least one kanji
    pub has_kanji: bool,
    /// Word segments in reading order
    pub words: Vec<DetectedWord>,
    /// Background brightness behind the line, when sampled
    pub background_luminance: Option<u8>,
}

/// Result of one detection pass
#[derive(Debug, Clone, Serialize)]
pub struct OcrResult {
    /// Wall-clock time the pass finished
    pub timestamp: SystemTime,
    /// Upright source dimensions (width, height)
    pub source_width: u32,
    pub source_height: u32,
    pub lines: Vec<DetectedLine>,
    /// Time spent in the OCR call and filtering
    pub processing_time: Duration,
}

impl OcrResult {
    /// Distinct kanji-bearing words still lacking a reading
    pub fn unresolved_kanji_words(&self) -> BTreeSet<String> {
        self.words()
            .filter(|w| w.has_kanji && w.reading.is_none())
            .map(|w| w.text.clone())
            .collect()
    }

    /// Attach readings to every matching word; returns how many were attached
    pub fn apply_readings(&mut self, readings: &HashMap<String, Reading>) -> usize {
        let mut attached = 0;
        for word in self.lines.iter_mut().flat_map(|l| l.words.iter_mut()) {
            if let Some(reading) = readings.get(&word.text) {
                if word.attach_reading(reading.clone()) {
                    attached += 1;
                }
            }
        }
        attached
    }

    /// Iterate all words across lines
    pub fn words(&self) -> impl Iterator<Item = &DetectedWord> {
        self.lines.iter().flat_map(|l| l.words.iter())
    }
}
