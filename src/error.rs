use std::{path::PathBuf, time::Duration};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoseError {
    #[error("worker was already started")]
    AlreadyStarted,
    #[error("another pose worker is already running")]
    AnotherWorkerRunning,
    #[error("failed to start capture backend: {0:#}")]
    Backend(#[source] anyhow::Error),
    #[error("failed to load classifier from {}: {source:#}", path.display())]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("worker did not yield the pipeline state within {0:?}")]
    GuardTimeout(Duration),
    #[error("worker thread panicked")]
    WorkerPanicked,
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type PoseResult<T> = Result<T, PoseError>;

/// Why a single worker iteration was skipped.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("frame capture failed: {0:#}")]
    Capture(#[source] anyhow::Error),
    #[error("landmark inference failed: {0:#}")]
    Landmarks(#[source] anyhow::Error),
    #[error("classifier inference failed: {0:#}")]
    Classifier(#[source] anyhow::Error),
}
