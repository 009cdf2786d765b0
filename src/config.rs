use std::{collections::HashMap, fs, path::Path, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::{
    error::PoseError,
    exercise::{Exercise, ExerciseModels},
    history::DEFAULT_HISTORY_CAPACITY,
    worker::WorkerSettings,
};

#[derive(Debug, Deserialize, Default)]
pub struct PoseConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    /// Device index as enumerated by the platform backend.
    #[serde(default)]
    pub index: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// Pose landmark ONNX model.
    #[serde(default = "default_landmarker")]
    pub landmarker: PathBuf,
    /// Classifier used by exercises without an entry in `exercises`.
    #[serde(default = "default_classifier")]
    pub classifier: PathBuf,
    #[serde(default)]
    pub exercises: HashMap<Exercise, PathBuf>,
    /// Minimum pose presence score for a body to be reported.
    #[serde(default = "default_presence_threshold")]
    pub presence_threshold: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    #[serde(default)]
    pub exercise: Exercise,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Failed iterations in a row before the worker gives up.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// How long a controller waits for the worker to yield. 0 waits forever.
    #[serde(default = "default_guard_timeout_ms")]
    pub guard_timeout_ms: u64,
}

fn default_landmarker() -> PathBuf { PathBuf::from("models/pose_landmark_full.onnx") }
fn default_classifier() -> PathBuf { PathBuf::from("models/exercise_default.onnx") }
fn default_presence_threshold() -> f32 { 0.5 }
fn default_history_capacity() -> usize { DEFAULT_HISTORY_CAPACITY }
fn default_max_consecutive_failures() -> u32 { 30 }
fn default_guard_timeout_ms() -> u64 { 2_000 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self { index: 0 }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            landmarker: default_landmarker(),
            classifier: default_classifier(),
            exercises: HashMap::new(),
            presence_threshold: default_presence_threshold(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            exercise: Exercise::default(),
            history_capacity: default_history_capacity(),
            max_consecutive_failures: default_max_consecutive_failures(),
            guard_timeout_ms: default_guard_timeout_ms(),
        }
    }
}

impl PoseConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: PoseConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PoseError> {
        if self.worker.history_capacity == 0 {
            return Err(PoseError::Config(
                "worker.history_capacity must be at least 1".to_string(),
            ));
        }
        if self.worker.max_consecutive_failures == 0 {
            return Err(PoseError::Config(
                "worker.max_consecutive_failures must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.models.presence_threshold) {
            return Err(PoseError::Config(format!(
                "models.presence_threshold {} is outside 0..=1",
                self.models.presence_threshold
            )));
        }
        Ok(())
    }

    pub fn exercise_models(&self) -> ExerciseModels {
        self.models
            .exercises
            .iter()
            .fold(ExerciseModels::new(&self.models.classifier), |models, (ex, path)| {
                models.with_model(*ex, path)
            })
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        let timeout = match self.worker.guard_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        WorkerSettings {
            history_capacity: self.worker.history_capacity,
            max_consecutive_failures: self.worker.max_consecutive_failures,
            guard_timeout: timeout,
        }
    }
}
