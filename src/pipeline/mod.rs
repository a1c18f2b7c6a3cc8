//! Scanning Pipeline
//!
//! Runs admitted frames through detection, brightness sampling and furigana
//! enrichment. At most one pass is in flight per session, so outcomes are
//! delivered in admission order.
//!
//! Failed passes are reported, not hidden: it is up to the caller to keep the
//! previous overlay on screen, which [`OverlayState`] implements.

pub mod scheduler;

pub use scheduler::{Admission, FrameScheduler, PassGuard, SchedulerStats};

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::capture::Frame;
use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::furigana::FuriganaResolver;
use crate::vision::{LuminanceSampler, OcrEngine, OcrResult, TextDetector};

/// Output of one successful pass
#[derive(Debug, Clone, Serialize)]
pub struct AnnotatedFrame {
    /// Sequence number of the source frame
    pub seq: u64,
    pub result: OcrResult,
    /// Brightness of the frame center, when sampled
    pub global_luminance: Option<u8>,
    /// Number of words that received a reading in this pass
    pub annotated_words: usize,
}

/// Outcome of one pass as delivered to the caller
#[derive(Debug)]
pub struct ScanOutcome {
    pub seq: u64,
    pub result: Result<AnnotatedFrame, PipelineError>,
}

/// What happened to a submitted frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// A pass was started; its outcome arrives on the outcome channel
    Processing,
    /// The frame was dropped and released
    Skipped,
}

/// Stages of a pass shared with the background task
struct PassContext {
    detector: TextDetector,
    sampler: LuminanceSampler,
    sample_luminance: bool,
    resolver: Arc<FuriganaResolver>,
}

impl PassContext {
    async fn run(&self, frame: &Frame) -> Result<AnnotatedFrame, PipelineError> {
        let mut result = self.detector.detect(frame, frame.upright_dimensions()).await?;

        let mut global_luminance = None;
        if self.sample_luminance {
            if let Some(luma) = frame.luma() {
                global_luminance = self.sampler.sample_global_center(&luma, frame.rotation);
                for line in &mut result.lines {
                    line.background_luminance = self.sampler.sample_region(&luma, &line.bounds, frame.rotation);
                }
            }
        }

        let words = result.unresolved_kanji_words();
        let mut annotated_words = 0;
        if !words.is_empty() {
            match self.resolver.resolve_batch(words).await {
                Ok(readings) => annotated_words = result.apply_readings(&readings),
                // Words stay bare; the overlay still shows them
                Err(e) => warn!("Furigana enrichment failed for frame {}: {}", frame.seq, e),
            }
        }

        debug!(
            "Frame {} annotated: {} lines, {} words with readings",
            frame.seq,
            result.lines.len(),
            annotated_words
        );

        Ok(AnnotatedFrame {
            seq: frame.seq,
            result,
            global_luminance,
            annotated_words,
        })
    }
}

/// One active scanning session
pub struct ScanSession {
    scheduler: FrameScheduler,
    context: Arc<PassContext>,
    outcomes: Sender<ScanOutcome>,
    runtime: Handle,
}

impl ScanSession {
    /// Create a session on the current tokio runtime
    ///
    /// Returns the session and the receiver on which pass outcomes arrive.
    pub fn new(
        config: &AppConfig,
        engine: Arc<dyn OcrEngine>,
        resolver: Arc<FuriganaResolver>,
    ) -> Result<(Self, Receiver<ScanOutcome>)> {
        let runtime = Handle::try_current().context("ScanSession requires a tokio runtime")?;
        Ok(Self::with_runtime(config, engine, resolver, runtime))
    }

    /// Create a session spawning passes on `runtime`
    pub fn with_runtime(
        config: &AppConfig,
        engine: Arc<dyn OcrEngine>,
        resolver: Arc<FuriganaResolver>,
        runtime: Handle,
    ) -> (Self, Receiver<ScanOutcome>) {
        let (outcomes, receiver) = unbounded();
        let context = PassContext {
            detector: TextDetector::new(engine, config.detection.clone()),
            sampler: LuminanceSampler::from_settings(&config.luminance),
            sample_luminance: config.luminance.enabled,
            resolver,
        };

        let session = Self {
            scheduler: FrameScheduler::new(config.scheduler.sample_interval),
            context: Arc::new(context),
            outcomes,
            runtime,
        };
        (session, receiver)
    }

    /// Admit or drop `frame` without blocking
    ///
    /// A skipped frame is released before this returns. An admitted frame is
    /// processed on the runtime and released when its pass ends.
    pub fn submit(&self, frame: Frame) -> Submission {
        let guard = match self.scheduler.accept(frame.seq) {
            Admission::Process(guard) => guard,
            Admission::Skip => {
                drop(frame);
                return Submission::Skipped;
            }
        };

        let seq = frame.seq;
        let context = self.context.clone();
        let outcomes = self.outcomes.clone();
        let pass = self.runtime.clone();
        self.runtime.spawn(async move {
            // A panicking pass surfaces as a join error and still yields an outcome
            let result = match pass.spawn(async move { context.run(&frame).await }).await {
                Ok(result) => result,
                Err(e) => {
                    warn!("Pass for frame {} aborted: {}", seq, e);
                    Err(PipelineError::Aborted(e.to_string()))
                }
            };
            // Send before the guard drops so the next pass cannot overtake this one
            if outcomes.send(ScanOutcome { seq, result }).is_err() {
                debug!("Outcome receiver dropped, discarding frame {}", seq);
            }
            drop(guard);
        });

        Submission::Processing
    }

    /// Admit `frame` and run its pass on the caller's task
    ///
    /// Returns `None` when the frame was skipped.
    pub async fn process(&self, frame: Frame) -> Option<Result<AnnotatedFrame, PipelineError>> {
        let Admission::Process(_guard) = self.scheduler.accept(frame.seq) else {
            drop(frame);
            return None;
        };
        Some(self.context.run(&frame).await)
    }

    /// Whether a pass is currently running
    pub fn is_busy(&self) -> bool {
        self.scheduler.is_in_flight()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    pub fn resolver(&self) -> &FuriganaResolver {
        &self.context.resolver
    }
}

/// Caller-side overlay state
///
/// A failed pass leaves the previous overlay in place instead of clearing it,
/// so a transient engine error does not make annotations flicker.
#[derive(Debug, Default)]
pub struct OverlayState {
    current: Option<AnnotatedFrame>,
    last_error: Option<String>,
    consecutive_failures: u32,
}

impl OverlayState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a pass outcome; returns true if the overlay content changed
    pub fn apply(&mut self, outcome: ScanOutcome) -> bool {
        match outcome.result {
            Ok(frame) => {
                self.current = Some(frame);
                self.last_error = None;
                self.consecutive_failures = 0;
                true
            }
            Err(e) => {
                warn!("Pass for frame {} failed, keeping previous overlay: {}", outcome.seq, e);
                self.last_error = Some(e.to_string());
                self.consecutive_failures += 1;
                false
            }
        }
    }

    pub fn current(&self) -> Option<&AnnotatedFrame> {
        self.current.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::furigana::tests::MockRemote;
    use crate::geometry::{to_buffer_coords, to_upright_coords, BoundingBox, Rotation};
    use crate::vision::{RecognizedElement, RecognizedLine};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    const W: u32 = 640;
    const H: u32 = 480;

    /// Engine reporting one fixed line, tracking concurrent calls
    struct ScriptedEngine {
        lines: Vec<RecognizedLine>,
        delay: Duration,
        fail: bool,
        panic: bool,
        active: AtomicUsize,
        max_active: AtomicUsize,
        calls: AtomicUsize,
    }

    impl ScriptedEngine {
        fn new(lines: Vec<RecognizedLine>) -> Self {
            Self {
                lines,
                delay: Duration::ZERO,
                fail: false,
                panic: false,
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn panicking(mut self) -> Self {
            self.panic = true;
            self
        }
    }

    #[async_trait]
    impl OcrEngine for ScriptedEngine {
        async fn recognize(&self, _frame: &Frame, _rotation: Rotation) -> anyhow::Result<Vec<RecognizedLine>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);
            if self.panic {
                panic!("OCR engine bug");
            }
            if self.fail {
                anyhow::bail!("camera OCR crashed");
            }
            Ok(self.lines.clone())
        }
    }

    /// Line "今日は" whose first word starts at the upright image of `pixel`
    fn seeded_line(pixel: (i32, i32), rotation: i32) -> RecognizedLine {
        let (ux, uy) = to_upright_coords(pixel.0, pixel.1, W, H, rotation).unwrap();
        RecognizedLine {
            text: "今日は".to_string(),
            bounds: BoundingBox::from_xywh(ux, uy, 60, 20),
            confidence: 0.95,
            language: Some("ja".to_string()),
            elements: vec![
                RecognizedElement {
                    text: "今日".to_string(),
                    bounds: BoundingBox::from_xywh(ux, uy, 40, 20),
                    confidence: 0.95,
                },
                RecognizedElement {
                    text: "は".to_string(),
                    bounds: BoundingBox::from_xywh(ux + 40, uy, 20, 20),
                    confidence: 0.95,
                },
            ],
        }
    }

    fn frame(seq: u64, rotation: i32) -> Frame {
        Frame::from_luma(seq, W, H, rotation, vec![90; (W * H) as usize])
    }

    fn resolver_with(remote: Arc<MockRemote>) -> Arc<FuriganaResolver> {
        Arc::new(FuriganaResolver::new().with_remote(remote))
    }

    #[tokio::test]
    async fn test_end_to_end_rotated_frame() {
        let seed = (200, 379);
        let engine = Arc::new(ScriptedEngine::new(vec![seeded_line(seed, 90)]));
        let remote = Arc::new(MockRemote::with(&[("今日", "きょう")]));
        let (session, _outcomes) = ScanSession::new(&AppConfig::default(), engine, resolver_with(remote.clone())).unwrap();

        let annotated = session.process(frame(0, 90)).await.unwrap().unwrap();

        assert_eq!((annotated.result.source_width, annotated.result.source_height), (480, 640));
        assert_eq!(annotated.result.lines.len(), 1);
        let line = &annotated.result.lines[0];
        assert!(line.has_kanji);
        assert_eq!(line.background_luminance, Some(90));
        assert_eq!(annotated.global_luminance, Some(90));

        let today = &line.words[0];
        assert_eq!(today.text, "今日");
        assert_eq!(today.reading().map(|r| r.reading.as_str()), Some("きょう"));
        assert_eq!(to_buffer_coords(today.bounds.left, today.bounds.top, W, H, 90), Ok(seed));

        let particle = &line.words[1];
        assert!(!particle.has_kanji);
        assert!(particle.reading().is_none());

        assert_eq!(annotated.annotated_words, 1);
        assert_eq!(remote.call_count(), 1);
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn test_enrichment_failure_keeps_detection() {
        let engine = Arc::new(ScriptedEngine::new(vec![seeded_line((10, 10), 0)]));
        let (session, _outcomes) =
            ScanSession::new(&AppConfig::default(), engine, resolver_with(Arc::new(MockRemote::unreachable()))).unwrap();

        let annotated = session.process(frame(3, 0)).await.unwrap().unwrap();
        assert_eq!(annotated.result.lines.len(), 1);
        assert!(annotated.result.words().all(|w| w.reading().is_none()));
        assert_eq!(annotated.annotated_words, 0);
    }

    #[tokio::test]
    async fn test_luminance_disabled() {
        let mut config = AppConfig::default();
        config.luminance.enabled = false;
        let engine = Arc::new(ScriptedEngine::new(vec![seeded_line((10, 10), 0)]));
        let (session, _outcomes) =
            ScanSession::new(&config, engine, resolver_with(Arc::new(MockRemote::with(&[])))).unwrap();

        let annotated = session.process(frame(0, 0)).await.unwrap().unwrap();
        assert!(annotated.global_luminance.is_none());
        assert!(annotated.result.lines[0].background_luminance.is_none());
    }

    #[tokio::test]
    async fn test_process_skips_off_interval_frames() {
        let engine = Arc::new(ScriptedEngine::new(vec![]));
        let (session, _outcomes) =
            ScanSession::new(&AppConfig::default(), engine.clone(), resolver_with(Arc::new(MockRemote::with(&[])))).unwrap();

        assert!(session.process(frame(1, 0)).await.is_none());
        assert!(session.process(frame(2, 0)).await.is_none());
        assert!(session.process(frame(3, 0)).await.is_some());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_skipped_frame_released_synchronously() {
        let engine = Arc::new(ScriptedEngine::new(vec![]));
        let (session, _outcomes) =
            ScanSession::new(&AppConfig::default(), engine, resolver_with(Arc::new(MockRemote::with(&[])))).unwrap();

        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();
        let skipped = frame(1, 0).with_release(move || flag.store(true, Ordering::SeqCst));

        assert_eq!(session.submit(skipped), Submission::Skipped);
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_slow_engine_never_overlaps() {
        let engine = Arc::new(ScriptedEngine::new(vec![seeded_line((10, 10), 0)]).slow(Duration::from_millis(40)));
        let (session, outcomes) = ScanSession::new(
            &AppConfig::default(),
            engine.clone(),
            resolver_with(Arc::new(MockRemote::with(&[("今日", "きょう")]))),
        )
        .unwrap();

        let mut processing = Vec::new();
        for seq in 0..60 {
            if session.submit(frame(seq, 0)) == Submission::Processing {
                processing.push(seq);
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        while session.is_busy() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(engine.max_active.load(Ordering::SeqCst), 1);
        assert!(!processing.is_empty());
        assert!(processing.iter().all(|seq| seq % 3 == 0));
        // Busy periods drop frames that fall on the interval
        assert!(processing.len() < 20);

        let delivered: Vec<u64> = outcomes.try_iter().map(|o| o.seq).collect();
        assert_eq!(delivered, processing);

        let stats = session.stats();
        assert_eq!(stats.admitted as usize, processing.len());
        assert_eq!(stats.admitted + stats.skipped, 60);
    }

    #[tokio::test]
    async fn test_engine_failure_keeps_previous_overlay() {
        let good = Arc::new(ScriptedEngine::new(vec![seeded_line((10, 10), 0)]));
        let (session, outcomes) =
            ScanSession::new(&AppConfig::default(), good, resolver_with(Arc::new(MockRemote::with(&[])))).unwrap();
        let bad = Arc::new(ScriptedEngine::new(vec![]).failing());
        let (failing_session, failing_outcomes) =
            ScanSession::new(&AppConfig::default(), bad, resolver_with(Arc::new(MockRemote::with(&[])))).unwrap();

        let mut overlay = OverlayState::new();

        assert_eq!(session.submit(frame(0, 0)), Submission::Processing);
        let first = tokio::task::spawn_blocking(move || outcomes.recv().unwrap()).await.unwrap();
        assert!(overlay.apply(first));
        assert_eq!(overlay.current().unwrap().seq, 0);

        assert_eq!(failing_session.submit(frame(3, 0)), Submission::Processing);
        let failed = tokio::task::spawn_blocking(move || failing_outcomes.recv().unwrap())
            .await
            .unwrap();
        assert!(matches!(failed.result, Err(PipelineError::Engine(_))));
        assert!(!overlay.apply(failed));

        // Previous annotations survive the failure
        assert_eq!(overlay.current().unwrap().seq, 0);
        assert_eq!(overlay.consecutive_failures(), 1);
        assert!(overlay.last_error().unwrap().contains("camera OCR crashed"));

        // The failed pass released the scheduler
        while failing_session.is_busy() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(failing_session.submit(frame(6, 0)), Submission::Processing);
    }

    #[tokio::test]
    async fn test_panicking_pass_reports_outcome() {
        let engine = Arc::new(ScriptedEngine::new(vec![]).panicking());
        let (session, outcomes) =
            ScanSession::new(&AppConfig::default(), engine, resolver_with(Arc::new(MockRemote::with(&[])))).unwrap();

        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();
        let admitted = frame(0, 0).with_release(move || flag.store(true, Ordering::SeqCst));
        assert_eq!(session.submit(admitted), Submission::Processing);

        let outcome = tokio::task::spawn_blocking(move || outcomes.recv().unwrap()).await.unwrap();
        assert_eq!(outcome.seq, 0);
        assert!(matches!(outcome.result, Err(PipelineError::Aborted(_))));
        assert!(released.load(Ordering::SeqCst));

        let mut overlay = OverlayState::new();
        assert!(!overlay.apply(outcome));
        assert_eq!(overlay.consecutive_failures(), 1);

        while session.is_busy() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(session.submit(frame(3, 0)), Submission::Processing);
    }
}
