#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Result, anyhow};
use posegame::{
    body::BODY_LANDMARK_COUNT,
    pipeline::{Classifier, ClassifierLoader, FrameSource, LandmarkModel, PoseBackend},
    types::{BodyPose, Frame, Landmark, LandmarkResult, Verdict},
};

pub const FRAME_INTERVAL_MS: u64 = 33;

/// What the stub camera does once its scripted frames run out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AfterScript {
    Close,
    Repeat,
    Fail,
}

/// Camera and landmark model driven by a script. Each entry is the nose x
/// coordinate of the body in that frame, or `None` for an empty frame.
#[derive(Clone)]
pub struct StubBackend {
    pub script: Vec<Option<f32>>,
    pub after: AfterScript,
    pub frame_delay: Duration,
    pub open_error: Option<&'static str>,
    pub landmarker_error: Option<&'static str>,
    pub released: Arc<AtomicUsize>,
}

impl StubBackend {
    pub fn new(script: Vec<Option<f32>>, after: AfterScript) -> Self {
        Self {
            script,
            after,
            frame_delay: Duration::from_millis(1),
            open_error: None,
            landmarker_error: None,
            released: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl PoseBackend for StubBackend {
    type Source = StubSource;
    type Landmarker = StubLandmarker;

    fn label(&self) -> &'static str {
        "stub"
    }

    fn open_source(&mut self) -> Result<StubSource> {
        if let Some(message) = self.open_error {
            return Err(anyhow!(message));
        }
        Ok(StubSource {
            script: self.script.clone(),
            after: self.after,
            delay: self.frame_delay,
            position: 0,
            last_timestamp_ms: 0,
            open: true,
            released: self.released.clone(),
        })
    }

    fn load_landmarker(&mut self) -> Result<StubLandmarker> {
        match self.landmarker_error {
            Some(message) => Err(anyhow!(message)),
            None => Ok(StubLandmarker),
        }
    }
}

pub struct StubSource {
    script: Vec<Option<f32>>,
    after: AfterScript,
    delay: Duration,
    position: usize,
    last_timestamp_ms: u64,
    open: bool,
    released: Arc<AtomicUsize>,
}

impl FrameSource for StubSource {
    fn read(&mut self) -> Result<Frame> {
        thread::sleep(self.delay);

        let index = match self.after {
            AfterScript::Repeat if !self.script.is_empty() => self.position % self.script.len(),
            _ if self.position < self.script.len() => self.position,
            AfterScript::Close => {
                self.open = false;
                return Err(anyhow!("camera closed"));
            }
            _ => return Err(anyhow!("camera stopped delivering frames")),
        };

        let sequence = self.position as u64;
        self.position += 1;
        if self.after == AfterScript::Close && self.position >= self.script.len() {
            self.open = false;
        }

        // The body marker travels inside the frame so the landmarker can
        // recover it: alpha 0 means nobody, red carries the nose x.
        let (red, alpha) = match self.script[index] {
            Some(x) => ((x * 255.0).round() as u8, 255),
            None => (0, 0),
        };
        self.last_timestamp_ms = sequence * FRAME_INTERVAL_MS;
        Ok(Frame {
            rgba: vec![red, 0, 0, alpha],
            width: 1,
            height: 1,
            timestamp_ms: self.last_timestamp_ms,
            sequence,
        })
    }

    fn timestamp_ms(&self) -> u64 {
        self.last_timestamp_ms
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn release(&mut self) {
        self.open = false;
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct StubLandmarker;

impl LandmarkModel for StubLandmarker {
    fn detect(&mut self, frame: &Frame, timestamp_ms: u64) -> Result<LandmarkResult> {
        if frame.rgba[3] == 0 {
            return Ok(LandmarkResult::empty(timestamp_ms));
        }
        let x = frame.rgba[0] as f32 / 255.0;
        Ok(LandmarkResult {
            timestamp_ms,
            bodies: vec![BodyPose::new(vec![
                Landmark::new(x, 0.5, 0.0, 1.0);
                BODY_LANDMARK_COUNT
            ])],
        })
    }
}

/// Label 1 when the nose is in the right half of the frame.
pub struct ThresholdClassifier;

impl Classifier for ThresholdClassifier {
    fn predict(&mut self, features: &[f32]) -> Result<Verdict> {
        Ok(Verdict(if features[0] > 0.5 { 1 } else { 0 }))
    }
}

/// Hands out [`ThresholdClassifier`]s and counts how often it was asked to.
#[derive(Clone, Default)]
pub struct CountingLoader {
    pub loads: Arc<AtomicUsize>,
    pub missing: Vec<PathBuf>,
}

impl CountingLoader {
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ClassifierLoader for CountingLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn Classifier>> {
        if self.missing.iter().any(|missing| missing == path) {
            return Err(anyhow!("no such model: {}", path.display()));
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ThresholdClassifier))
    }
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Always answers with the same label.
pub struct FixedClassifier(pub i64);

impl Classifier for FixedClassifier {
    fn predict(&mut self, _features: &[f32]) -> Result<Verdict> {
        Ok(Verdict(self.0))
    }
}

/// Gives each model file its own fixed label so verdicts show which
/// classifier produced them.
#[derive(Clone, Default)]
pub struct LabelLoader {
    pub labels: Vec<(PathBuf, i64)>,
    pub fallback: i64,
    pub loads: Arc<AtomicUsize>,
}

impl LabelLoader {
    pub fn new(fallback: i64) -> Self {
        Self {
            fallback,
            ..Self::default()
        }
    }

    pub fn with_label(mut self, path: impl Into<PathBuf>, label: i64) -> Self {
        self.labels.push((path.into(), label));
        self
    }

    pub fn label_for(&self, path: &Path) -> i64 {
        self.labels
            .iter()
            .find(|(known, _)| known == path)
            .map(|(_, label)| *label)
            .unwrap_or(self.fallback)
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ClassifierLoader for LabelLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn Classifier>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FixedClassifier(self.label_for(path))))
    }
}
