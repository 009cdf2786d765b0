use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exercise {
    JumpingJack,
    HighKnees,
    LegRaise,
    ArmCircles,
    Squat,
    Deadlift,
    Plank,
    Pushup,
    #[default]
    Crunch,
    LatRaise,
    OverheadPress,
    Curl,
    TricepExtension,
}

impl Exercise {
    pub const ALL: [Exercise; 13] = [
        Exercise::JumpingJack,
        Exercise::HighKnees,
        Exercise::LegRaise,
        Exercise::ArmCircles,
        Exercise::Squat,
        Exercise::Deadlift,
        Exercise::Plank,
        Exercise::Pushup,
        Exercise::Crunch,
        Exercise::LatRaise,
        Exercise::OverheadPress,
        Exercise::Curl,
        Exercise::TricepExtension,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Exercise::JumpingJack => "jumping_jack",
            Exercise::HighKnees => "high_knees",
            Exercise::LegRaise => "leg_raise",
            Exercise::ArmCircles => "arm_circles",
            Exercise::Squat => "squat",
            Exercise::Deadlift => "deadlift",
            Exercise::Plank => "plank",
            Exercise::Pushup => "pushup",
            Exercise::Crunch => "crunch",
            Exercise::LatRaise => "lat_raise",
            Exercise::OverheadPress => "overhead_press",
            Exercise::Curl => "curl",
            Exercise::TricepExtension => "tricep_extension",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Exercise::JumpingJack => "Jumping jack",
            Exercise::HighKnees => "High knees",
            Exercise::LegRaise => "Leg raise",
            Exercise::ArmCircles => "Arm circles",
            Exercise::Squat => "Squat",
            Exercise::Deadlift => "Deadlift",
            Exercise::Plank => "Plank",
            Exercise::Pushup => "Push-up",
            Exercise::Crunch => "Crunch",
            Exercise::LatRaise => "Lateral raise",
            Exercise::OverheadPress => "Overhead press",
            Exercise::Curl => "Curl",
            Exercise::TricepExtension => "Tricep extension",
        }
    }
}

impl fmt::Display for Exercise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown exercise `{0}`")]
pub struct UnknownExercise(pub String);

impl FromStr for Exercise {
    type Err = UnknownExercise;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Exercise::ALL
            .into_iter()
            .find(|e| e.key() == s)
            .ok_or_else(|| UnknownExercise(s.to_string()))
    }
}

/// Which classifier file each exercise is scored with. Exercises without an
/// explicit entry share the default model.
#[derive(Clone, Debug)]
pub struct ExerciseModels {
    default_model: PathBuf,
    overrides: HashMap<Exercise, PathBuf>,
}

impl ExerciseModels {
    pub fn new(default_model: impl Into<PathBuf>) -> Self {
        Self {
            default_model: default_model.into(),
            overrides: HashMap::new(),
        }
    }

    pub fn with_model(mut self, exercise: Exercise, path: impl Into<PathBuf>) -> Self {
        self.overrides.insert(exercise, path.into());
        self
    }

    pub fn model_for(&self, exercise: Exercise) -> &Path {
        self.overrides
            .get(&exercise)
            .map(PathBuf::as_path)
            .unwrap_or(self.default_model.as_path())
    }

    pub fn default_model(&self) -> &Path {
        &self.default_model
    }

    /// True when switching between the two exercises needs a different model.
    pub fn requires_reload(&self, from: Exercise, to: Exercise) -> bool {
        self.model_for(from) != self.model_for(to)
    }
}
