#[cfg(feature = "camera-nokhwa")]
pub mod camera;
pub mod classifier;
pub mod landmarker;
pub mod skeleton;

use std::{path::Path, sync::Arc};

use anyhow::Result;

use crate::{
    error::StepError,
    features::{self, FeatureVector},
    types::{Frame, LandmarkResult, Verdict},
};

/// A camera-like producer of sequential frames. Owned by the worker thread for
/// its whole run.
pub trait FrameSource {
    fn read(&mut self) -> Result<Frame>;
    /// Timestamp of the most recently read frame, in milliseconds.
    fn timestamp_ms(&self) -> u64;
    fn is_open(&self) -> bool;
    fn release(&mut self);
}

/// Pose landmark detector used in blocking, timestamp-ordered mode.
pub trait LandmarkModel {
    fn detect(&mut self, frame: &Frame, timestamp_ms: u64) -> Result<LandmarkResult>;
}

#[cfg_attr(test, mockall::automock)]
pub trait Classifier: Send {
    fn predict(&mut self, features: &[f32]) -> Result<Verdict>;
}

pub trait ClassifierLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Box<dyn Classifier>>;
}

/// Opens the per-run handles. Both calls happen on the worker thread, so the
/// handles themselves do not need to be `Send`.
pub trait PoseBackend: Send + 'static {
    type Source: FrameSource;
    type Landmarker: LandmarkModel;

    fn label(&self) -> &'static str;
    fn open_source(&mut self) -> Result<Self::Source>;
    fn load_landmarker(&mut self) -> Result<Self::Landmarker>;
}

/// Keeps detector timestamps non-decreasing even if the camera clock jumps
/// backwards.
#[derive(Debug, Default)]
pub struct FrameClock {
    last_ms: Option<u64>,
}

impl FrameClock {
    pub fn observe(&mut self, timestamp_ms: u64) -> u64 {
        let ts = match self.last_ms {
            Some(last) if timestamp_ms < last => {
                log::debug!("camera clock went backwards ({timestamp_ms}ms < {last}ms), clamping");
                last
            }
            _ => timestamp_ms,
        };
        self.last_ms = Some(ts);
        ts
    }
}

/// Everything derived from one frame before classification.
#[derive(Clone, Debug)]
pub struct Observation {
    pub frame: Arc<Frame>,
    pub landmarks: Arc<LandmarkResult>,
    pub features: Option<FeatureVector>,
}

/// Reads one frame, runs the landmark model on it and flattens the result.
pub fn detect<S, L>(
    source: &mut S,
    landmarker: &mut L,
    clock: &mut FrameClock,
) -> Result<Observation, StepError>
where
    S: FrameSource + ?Sized,
    L: LandmarkModel + ?Sized,
{
    let frame = source.read().map_err(StepError::Capture)?;
    let timestamp_ms = clock.observe(source.timestamp_ms());
    let landmarks = landmarker
        .detect(&frame, timestamp_ms)
        .map_err(StepError::Landmarks)?;
    let features = features::extract(&landmarks);

    log::trace!(
        "frame #{} at {timestamp_ms}ms: {} bodies",
        frame.sequence,
        landmarks.bodies.len()
    );

    Ok(Observation {
        frame: Arc::new(frame),
        landmarks: Arc::new(landmarks),
        features,
    })
}

/// Scores a feature vector. Without one the classifier is not consulted.
pub fn classify(
    features: Option<&[f32]>,
    classifier: &mut dyn Classifier,
) -> Result<Verdict, StepError> {
    match features {
        Some(features) => classifier.predict(features).map_err(StepError::Classifier),
        None => Ok(Verdict::NO_DETECTION),
    }
}

/// One full unit of work: frame, landmarks, verdict.
pub fn step<S, L>(
    source: &mut S,
    landmarker: &mut L,
    classifier: &mut dyn Classifier,
    clock: &mut FrameClock,
) -> Result<(Observation, Verdict), StepError>
where
    S: FrameSource + ?Sized,
    L: LandmarkModel + ?Sized,
{
    let observation = detect(source, landmarker, clock)?;
    let verdict = classify(observation.features.as_deref(), classifier)?;
    Ok((observation, verdict))
}
