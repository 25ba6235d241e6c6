use serde::{Deserialize, Serialize};

use crate::{EmotionLabel, EmotionScores, MoodTunesError, Result};

/// Rectangle locating a detected face inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl FaceRegion {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Face detection thresholds. Fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    pub scale_factor: f64,
    pub min_neighbors: i32,
    pub min_size: (i32, i32),
}

impl DetectionParams {
    pub const FIXED: Self = Self {
        scale_factor: 1.1,
        min_neighbors: 5,
        min_size: (30, 30),
    };
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self::FIXED
    }
}

/// Result of the single non-blocking input poll made per iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    None,
    /// `s`: commit the held candidate and stop.
    Confirm,
    /// `q`: stop without a result.
    Abort,
}

impl Command {
    pub const CONFIRM_KEY: char = 's';
    pub const ABORT_KEY: char = 'q';

    /// Decodes a raw key code as reported by a window toolkit. Negative codes
    /// mean no key was pressed.
    pub fn from_key(code: i32) -> Self {
        if code < 0 {
            return Self::None;
        }
        match char::from((code & 0xFF) as u8) {
            Self::CONFIRM_KEY => Self::Confirm,
            Self::ABORT_KEY => Self::Abort,
            _ => Self::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    StoppedWithResult,
    StoppedWithoutResult,
}

/// How a capture run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Confirmed(EmotionLabel),
    Aborted,
    /// The device stopped yielding frames.
    StreamEnded,
}

impl CaptureOutcome {
    pub fn state(&self) -> LoopState {
        match self {
            Self::Confirmed(_) => LoopState::StoppedWithResult,
            Self::Aborted | Self::StreamEnded => LoopState::StoppedWithoutResult,
        }
    }

    pub fn label(&self) -> Option<&EmotionLabel> {
        match self {
            Self::Confirmed(label) => Some(label),
            _ => None,
        }
    }

    pub fn into_label(self) -> Option<EmotionLabel> {
        match self {
            Self::Confirmed(label) => Some(label),
            _ => None,
        }
    }
}

/// Camera device. Opening happens in the implementor's constructor, which
/// should fail with [`MoodTunesError::DeviceUnavailable`].
pub trait FrameSource {
    type Frame;

    /// Blocks until the next frame is available. `None` signals a
    /// disconnected device or the end of the stream.
    fn read_frame(&mut self) -> Option<Self::Frame>;

    fn release(&mut self) -> Result<()>;
}

pub trait FaceDetector<F> {
    fn detect(&mut self, frame: &F, params: &DetectionParams) -> Result<Vec<FaceRegion>>;
}

pub trait EmotionClassifier<F> {
    /// Scores the face cropped from `frame`. Empty when no facial features
    /// were found.
    fn classify(&mut self, frame: &F, face: &FaceRegion) -> Result<EmotionScores>;
}

/// Display sink that also delivers the interactive commands.
pub trait OutputSurface<F> {
    /// Draws the bounding box and, when present, the label onto the frame.
    fn annotate(&mut self, frame: &mut F, face: &FaceRegion, label: Option<&EmotionLabel>)
        -> Result<()>;

    fn present(&mut self, frame: &F) -> Result<()>;

    fn poll_command(&mut self) -> Result<Command>;

    fn close(&mut self) -> Result<()>;
}

/// Live frame-processing loop.
///
/// The loop owns the camera and the output surface for its whole lifetime.
/// Each iteration reads one frame, detects faces, classifies each face,
/// renders the annotated frame and polls once for an interactive command.
/// Only an explicit confirm commits a result; until then later frames keep
/// overwriting the held candidate. Device release and surface close happen
/// exactly once, on every exit path, including errors and drops.
pub struct CaptureLoop<S, D, C, O>
where
    S: FrameSource,
    D: FaceDetector<S::Frame>,
    C: EmotionClassifier<S::Frame>,
    O: OutputSurface<S::Frame>,
{
    source: S,
    detector: D,
    classifier: C,
    surface: O,
    params: DetectionParams,
    candidate: Option<EmotionLabel>,
    state: LoopState,
    frames_processed: usize,
    released: bool,
}

impl<S, D, C, O> CaptureLoop<S, D, C, O>
where
    S: FrameSource,
    D: FaceDetector<S::Frame>,
    C: EmotionClassifier<S::Frame>,
    O: OutputSurface<S::Frame>,
{
    /// Takes ownership of an already opened device. The loop starts in
    /// [`LoopState::Running`].
    pub fn new(source: S, detector: D, classifier: C, surface: O) -> Self {
        Self {
            source,
            detector,
            classifier,
            surface,
            params: DetectionParams::FIXED,
            candidate: None,
            state: LoopState::Running,
            frames_processed: 0,
            released: false,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn candidate(&self) -> Option<&EmotionLabel> {
        self.candidate.as_ref()
    }

    pub fn frames_processed(&self) -> usize {
        self.frames_processed
    }

    /// Drives the loop until a terminal state and releases the resources.
    pub fn run(&mut self) -> Result<CaptureOutcome> {
        if self.released {
            return Err(MoodTunesError::msg("capture loop has already finished"));
        }

        tracing::info!("capture loop running");
        let outcome = self.drive();
        if outcome.is_err() {
            self.state = LoopState::StoppedWithoutResult;
            self.candidate = None;
        }
        self.shutdown();
        outcome
    }

    fn drive(&mut self) -> Result<CaptureOutcome> {
        loop {
            if let Some(outcome) = self.step()? {
                self.state = outcome.state();
                tracing::info!(state = ?self.state, frames = self.frames_processed, "capture loop stopped");
                return Ok(outcome);
            }
        }
    }

    /// Runs one iteration. Returns the outcome once a terminal state is hit.
    fn step(&mut self) -> Result<Option<CaptureOutcome>> {
        let Some(mut frame) = self.source.read_frame() else {
            tracing::warn!("camera stopped delivering frames");
            self.candidate = None;
            return Ok(Some(CaptureOutcome::StreamEnded));
        };
        self.frames_processed += 1;

        let faces = self.detector.detect(&frame, &self.params)?;
        tracing::debug!(frame = self.frames_processed, faces = faces.len(), "faces detected");

        for face in &faces {
            let scores = self.classifier.classify(&frame, face)?;
            let label = scores.dominant().cloned();
            if let Some(label) = &label {
                tracing::debug!(emotion = %label, "candidate updated");
                self.candidate = Some(label.clone());
            }
            self.surface.annotate(&mut frame, face, label.as_ref())?;
        }

        self.surface.present(&frame)?;

        match self.surface.poll_command()? {
            Command::None => Ok(None),
            Command::Confirm => match self.candidate.take() {
                Some(label) => Ok(Some(CaptureOutcome::Confirmed(label))),
                None => {
                    tracing::warn!("confirm ignored, no emotion detected yet");
                    Ok(None)
                }
            },
            Command::Abort => {
                self.candidate = None;
                Ok(Some(CaptureOutcome::Aborted))
            }
        }
    }

    fn shutdown(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Err(err) = self.source.release() {
            tracing::warn!(%err, "failed to release camera");
        }
        if let Err(err) = self.surface.close() {
            tracing::warn!(%err, "failed to close output surface");
        }
    }
}

impl<S, D, C, O> Drop for CaptureLoop<S, D, C, O>
where
    S: FrameSource,
    D: FaceDetector<S::Frame>,
    C: EmotionClassifier<S::Frame>,
    O: OutputSurface<S::Frame>,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<S, D, C, O> std::fmt::Debug for CaptureLoop<S, D, C, O>
where
    S: FrameSource,
    D: FaceDetector<S::Frame>,
    C: EmotionClassifier<S::Frame>,
    O: OutputSurface<S::Frame>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureLoop")
            .field("state", &self.state)
            .field("candidate", &self.candidate)
            .field("frames_processed", &self.frames_processed)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::*;

    /// Scripted frame: classifier output per detected face plus the key the
    /// user presses after the frame is shown.
    #[derive(Debug, Clone, Default)]
    struct FakeFrame {
        faces: Vec<EmotionScores>,
        command: Option<Command>,
        overlays: Vec<Option<EmotionLabel>>,
    }

    #[derive(Default, Clone)]
    struct Counters {
        released: Rc<Cell<usize>>,
        closed: Rc<Cell<usize>>,
        presented: Rc<Cell<usize>>,
        overlays: Rc<RefCell<Vec<Option<EmotionLabel>>>>,
    }

    struct ScriptedCamera {
        frames: VecDeque<FakeFrame>,
        counters: Counters,
    }

    impl FrameSource for ScriptedCamera {
        type Frame = FakeFrame;

        fn read_frame(&mut self) -> Option<FakeFrame> {
            self.frames.pop_front()
        }

        fn release(&mut self) -> Result<()> {
            self.counters.released.set(self.counters.released.get() + 1);
            Ok(())
        }
    }

    struct IndexDetector {
        fail: bool,
    }

    impl FaceDetector<FakeFrame> for IndexDetector {
        fn detect(&mut self, frame: &FakeFrame, params: &DetectionParams) -> Result<Vec<FaceRegion>> {
            assert_eq!(*params, DetectionParams::FIXED);
            if self.fail {
                return Err(MoodTunesError::Vision("cascade failed".to_string()));
            }
            Ok((0..frame.faces.len() as i32)
                .map(|i| FaceRegion::new(i, 0, 40, 40))
                .collect())
        }
    }

    struct ScriptedClassifier;

    impl EmotionClassifier<FakeFrame> for ScriptedClassifier {
        fn classify(&mut self, frame: &FakeFrame, face: &FaceRegion) -> Result<EmotionScores> {
            Ok(frame.faces[face.x as usize].clone())
        }
    }

    struct RecordingSurface {
        pending: Command,
        counters: Counters,
    }

    impl OutputSurface<FakeFrame> for RecordingSurface {
        fn annotate(
            &mut self,
            frame: &mut FakeFrame,
            _face: &FaceRegion,
            label: Option<&EmotionLabel>,
        ) -> Result<()> {
            frame.overlays.push(label.cloned());
            Ok(())
        }

        fn present(&mut self, frame: &FakeFrame) -> Result<()> {
            self.counters.presented.set(self.counters.presented.get() + 1);
            self.counters
                .overlays
                .borrow_mut()
                .extend(frame.overlays.iter().cloned());
            self.pending = frame.command.unwrap_or(Command::None);
            Ok(())
        }

        fn poll_command(&mut self) -> Result<Command> {
            Ok(std::mem::replace(&mut self.pending, Command::None))
        }

        fn close(&mut self) -> Result<()> {
            self.counters.closed.set(self.counters.closed.get() + 1);
            Ok(())
        }
    }

    type TestLoop = CaptureLoop<ScriptedCamera, IndexDetector, ScriptedClassifier, RecordingSurface>;

    fn build(frames: Vec<FakeFrame>) -> (TestLoop, Counters) {
        let counters = Counters::default();
        let camera = ScriptedCamera {
            frames: frames.into(),
            counters: counters.clone(),
        };
        let surface = RecordingSurface {
            pending: Command::None,
            counters: counters.clone(),
        };
        let capture = CaptureLoop::new(camera, IndexDetector { fail: false }, ScriptedClassifier, surface);
        (capture, counters)
    }

    fn frame(faces: Vec<EmotionScores>, command: Option<Command>) -> FakeFrame {
        FakeFrame {
            faces,
            command,
            overlays: Vec::new(),
        }
    }

    fn scores(label: &str, score: f32) -> EmotionScores {
        [(label, score)].into_iter().collect()
    }

    fn assert_released_once(counters: &Counters) {
        assert_eq!(counters.released.get(), 1);
        assert_eq!(counters.closed.get(), 1);
    }

    #[test]
    fn confirm_commits_candidate_from_earlier_frame() {
        let (mut capture, counters) = build(vec![
            frame(vec![[("happy", 0.9), ("neutral", 0.1)].into_iter().collect()], None),
            frame(vec![], Some(Command::Confirm)),
        ]);

        let outcome = capture.run().unwrap();
        assert_eq!(outcome, CaptureOutcome::Confirmed(EmotionLabel::new("happy")));
        assert_eq!(capture.state(), LoopState::StoppedWithResult);
        assert_eq!(capture.frames_processed(), 2);
        assert_released_once(&counters);
    }

    #[test]
    fn latest_classified_frame_wins() {
        let (mut capture, _) = build(vec![
            frame(vec![scores("sad", 0.8)], None),
            frame(vec![EmotionScores::new()], None),
            frame(vec![scores("angry", 0.7)], None),
            frame(vec![EmotionScores::new()], Some(Command::Confirm)),
        ]);

        let outcome = capture.run().unwrap();
        assert_eq!(outcome.label().map(EmotionLabel::as_str), Some("angry"));
    }

    #[test]
    fn later_face_in_same_frame_overwrites_earlier_one() {
        let (mut capture, _) = build(vec![frame(
            vec![scores("sad", 0.9), scores("neutral", 0.6)],
            Some(Command::Confirm),
        )]);

        let outcome = capture.run().unwrap();
        assert_eq!(outcome.into_label(), Some(EmotionLabel::new("neutral")));
    }

    #[test]
    fn confirm_without_candidate_keeps_running() {
        let (mut capture, counters) = build(vec![
            frame(vec![], Some(Command::Confirm)),
            frame(vec![EmotionScores::new()], Some(Command::Confirm)),
            frame(vec![scores("surprised", 0.6)], None),
            frame(vec![], Some(Command::Confirm)),
        ]);

        let outcome = capture.run().unwrap();
        assert_eq!(outcome.label().map(EmotionLabel::as_str), Some("surprised"));
        assert_eq!(capture.frames_processed(), 4);
        assert_eq!(counters.presented.get(), 4);
    }

    #[test]
    fn abort_discards_held_candidate() {
        let (mut capture, counters) = build(vec![
            frame(vec![scores("happy", 0.9)], None),
            frame(vec![], Some(Command::Abort)),
            frame(vec![], Some(Command::Confirm)),
        ]);

        let outcome = capture.run().unwrap();
        assert_eq!(outcome, CaptureOutcome::Aborted);
        assert!(outcome.into_label().is_none());
        assert!(capture.candidate().is_none());
        assert_eq!(capture.state(), LoopState::StoppedWithoutResult);
        assert_released_once(&counters);
    }

    #[test]
    fn abort_before_any_face_yields_no_result() {
        let (mut capture, counters) = build(vec![frame(vec![], Some(Command::Abort))]);

        assert_eq!(capture.run().unwrap(), CaptureOutcome::Aborted);
        assert_released_once(&counters);
    }

    #[test]
    fn end_of_stream_stops_without_result() {
        let (mut capture, counters) = build(vec![frame(vec![scores("happy", 1.0)], None)]);

        let outcome = capture.run().unwrap();
        assert_eq!(outcome, CaptureOutcome::StreamEnded);
        assert!(outcome.label().is_none());
        assert_eq!(capture.state(), LoopState::StoppedWithoutResult);
        assert_released_once(&counters);
    }

    #[test]
    fn backend_error_still_releases_once() {
        let counters = Counters::default();
        let camera = ScriptedCamera {
            frames: vec![frame(vec![scores("happy", 1.0)], None)].into(),
            counters: counters.clone(),
        };
        let surface = RecordingSurface {
            pending: Command::None,
            counters: counters.clone(),
        };
        let mut capture = CaptureLoop::new(camera, IndexDetector { fail: true }, ScriptedClassifier, surface);

        let err = capture.run().unwrap_err();
        assert!(matches!(err, MoodTunesError::Vision(_)));
        assert_eq!(capture.state(), LoopState::StoppedWithoutResult);
        drop(capture);
        assert_released_once(&counters);
    }

    #[test]
    fn dropping_an_unrun_loop_releases_resources() {
        let (capture, counters) = build(vec![]);
        drop(capture);
        assert_released_once(&counters);
    }

    #[test]
    fn second_run_is_rejected_without_double_release() {
        let (mut capture, counters) = build(vec![frame(vec![], Some(Command::Abort))]);
        capture.run().unwrap();
        assert!(capture.run().is_err());
        drop(capture);
        assert_released_once(&counters);
    }

    #[test]
    fn overlays_carry_labels_only_for_classified_faces() {
        let (mut capture, counters) = build(vec![frame(
            vec![scores("happy", 0.5), EmotionScores::new()],
            Some(Command::Abort),
        )]);
        capture.run().unwrap();

        let overlays = counters.overlays.borrow();
        assert_eq!(
            overlays.as_slice(),
            &[Some(EmotionLabel::new("happy")), None]
        );
    }

    #[test]
    fn decodes_interactive_keys() {
        assert_eq!(Command::from_key('s' as i32), Command::Confirm);
        assert_eq!(Command::from_key('q' as i32), Command::Abort);
        assert_eq!(Command::from_key(0x100 | 'q' as i32), Command::Abort);
        assert_eq!(Command::from_key('x' as i32), Command::None);
        assert_eq!(Command::from_key(-1), Command::None);
    }

    #[test]
    fn detection_params_are_fixed() {
        let params = DetectionParams::default();
        assert_eq!(params.scale_factor, 1.1);
        assert_eq!(params.min_neighbors, 5);
        assert_eq!(params.min_size, (30, 30));
    }
}
