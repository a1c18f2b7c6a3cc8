//! Japanese text detection
//!
//! Wraps one OCR engine call per frame, drops lines that are mostly URLs,
//! digits or Latin text, and splits the survivors into word segments.

use std::sync::Arc;
use std::time::{Instant, SystemTime};

use tracing::{debug, warn};

use super::ocr::{OcrEngine, RecognizedLine};
use super::{DetectedLine, DetectedWord, OcrResult};
use crate::capture::Frame;
use crate::config::DetectionSettings;
use crate::error::PipelineError;
use crate::geometry::Rotation;

/// CJK Unified Ideographs and Extension A
pub fn is_kanji(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}')
}

/// Hiragana and katakana, including phonetic extensions and halfwidth forms
pub fn is_kana(c: char) -> bool {
    matches!(
        c,
        '\u{3040}'..='\u{309F}' | '\u{30A0}'..='\u{30FF}' | '\u{31F0}'..='\u{31FF}' | '\u{FF66}'..='\u{FF9F}'
    )
}

pub fn is_japanese(c: char) -> bool {
    is_kana(c) || is_kanji(c)
}

pub fn contains_kanji(text: &str) -> bool {
    text.chars().any(is_kanji)
}

/// Share of Japanese characters among the non-whitespace characters of `text`
///
/// The denominator counts non-whitespace characters only, so spaces the OCR
/// engine inserts between glyphs do not lower the ratio.
pub fn japanese_ratio(text: &str) -> f32 {
    let (japanese, total) = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .fold((0usize, 0usize), |(j, t), c| (j + is_japanese(c) as usize, t + 1));
    if total == 0 {
        return 0.0;
    }
    japanese as f32 / total as f32
}

/// OCR adapter producing filtered Japanese lines
pub struct TextDetector {
    engine: Arc<dyn OcrEngine>,
    settings: DetectionSettings,
}

impl TextDetector {
    pub fn new(engine: Arc<dyn OcrEngine>, settings: DetectionSettings) -> Self {
        Self { engine, settings }
    }

    pub fn settings(&self) -> &DetectionSettings {
        &self.settings
    }

    /// Whether a recognized line is kept
    pub fn accepts(&self, text: &str, confidence: f32) -> bool {
        if confidence < self.settings.min_confidence {
            return false;
        }
        if !text.chars().any(is_japanese) {
            return false;
        }
        japanese_ratio(text) >= self.settings.japanese_ratio_threshold
    }

    /// Run recognition on `frame` and keep the Japanese lines
    ///
    /// `source_dimensions` is the upright (width, height) the engine sees.
    /// Engine failures are returned as-is; there is no retry.
    pub async fn detect(&self, frame: &Frame, source_dimensions: (u32, u32)) -> Result<OcrResult, PipelineError> {
        let start = Instant::now();

        let rotation = frame.rotation().unwrap_or_else(|| {
            warn!("Frame {} has unsupported rotation {}, recognizing as upright", frame.seq, frame.rotation);
            Rotation::Deg0
        });

        let recognized = self
            .engine
            .recognize(frame, rotation)
            .await
            .map_err(PipelineError::Engine)?;

        let total = recognized.len();
        let lines: Vec<DetectedLine> = recognized
            .into_iter()
            .filter_map(|line| self.convert_line(line))
            .collect();

        let processing_time = start.elapsed();
        debug!(
            "Detection on frame {} complete in {:?}: {} of {} lines kept",
            frame.seq,
            processing_time,
            lines.len(),
            total
        );

        Ok(OcrResult {
            timestamp: SystemTime::now(),
            source_width: source_dimensions.0,
            source_height: source_dimensions.1,
            lines,
            processing_time,
        })
    }

    fn convert_line(&self, line: RecognizedLine) -> Option<DetectedLine> {
        if !self.accepts(&line.text, line.confidence) {
            debug!("Discarding non-Japanese line {:?}", line.text);
            return None;
        }

        // Engines that do not segment get the whole line as one word
        let words = if line.elements.is_empty() {
            vec![DetectedWord::new(line.text.clone(), line.bounds)]
        } else {
            line.elements
                .into_iter()
                .filter(|e| !e.text.trim().is_empty())
                .map(|e| DetectedWord::new(e.text, e.bounds))
                .collect()
        };

        Some(DetectedLine {
            has_kanji: contains_kanji(&line.text),
            language: line.language.unwrap_or_else(|| "ja".to_string()),
            text: line.text,
            confidence: line.confidence,
            bounds: line.bounds,
            words,
            background_luminance: None,
        })
    }
}
