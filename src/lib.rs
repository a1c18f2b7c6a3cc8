//! FuriganaLens - live camera furigana annotation core
//!
//! Throttles camera frames, filters OCR output down to Japanese text, maps
//! geometry between the upright and sensor orientations, samples background
//! brightness and attaches readings to kanji words through a tiered cache.
//!
//! The OCR engine, rendering and the camera itself are external: they plug in
//! through [`vision::OcrEngine`], [`pipeline::ScanOutcome`] and [`capture::Frame`].

pub mod capture;
pub mod config;
pub mod error;
pub mod furigana;
pub mod geometry;
pub mod pipeline;
pub mod storage;
pub mod vision;

pub use capture::Frame;
pub use config::AppConfig;
pub use error::{GeometryError, PipelineError, RemoteError, ResolveError};
pub use furigana::{FuriganaResolver, Reading};
pub use geometry::{BoundingBox, Rotation};
pub use pipeline::{OverlayState, ScanOutcome, ScanSession, Submission};
pub use vision::{DetectedLine, DetectedWord, OcrResult};
