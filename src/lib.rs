//! Pose tracking core for a camera-driven exercise game.
//!
//! A single [`worker::PoseWorker`] reads frames, runs a landmark model and an
//! exercise classifier on every frame, and keeps a short history of verdicts
//! that game code polls from its own thread.

pub mod body;
pub mod config;
pub mod error;
pub mod exercise;
pub mod features;
pub mod history;
pub mod pipeline;
pub mod types;
pub mod worker;

pub use error::{PoseError, PoseResult};
pub use exercise::{Exercise, ExerciseModels};
pub use worker::{PoseWorker, WorkerSettings, WorkerState};
