use std::{env, sync::Arc, thread, time::Duration};

use anyhow::{Context, Result};
use posegame::{
    PoseWorker, WorkerState,
    body::BodyPart,
    config::PoseConfig,
    exercise::Exercise,
    history::positive_ratio,
    pipeline::{camera::NokhwaBackend, classifier::OrtClassifierLoader},
};

const REPORT_INTERVAL: Duration = Duration::from_millis(500);

fn main() -> Result<()> {
    env_logger::init();

    // posegame [config.toml] [exercise]
    let mut args = env::args().skip(1);
    let config = match args.next() {
        Some(path) => PoseConfig::load(&path)?,
        None => PoseConfig::default(),
    };
    let exercise = match args.next() {
        Some(name) => name.parse::<Exercise>()?,
        None => config.worker.exercise,
    };

    let worker = PoseWorker::new(
        config.worker_settings(),
        config.exercise_models(),
        Arc::new(OrtClassifierLoader),
        exercise,
    )
    .context("failed to create pose worker")?;

    worker
        .start(NokhwaBackend::new(
            config.camera.index,
            &config.models.landmarker,
            config.models.presence_threshold,
        ))
        .context("failed to start pose worker")?;

    log::info!("tracking {}", worker.active_exercise().display_name());

    while worker.state() == WorkerState::Running {
        thread::sleep(REPORT_INTERVAL);

        let history = worker.history();
        let ((x, y, _), visibility) = worker.landmark_point(BodyPart::Nose);
        log::info!(
            "{}: {:.0}% of last {} frames on form, nose at ({x:.2}, {y:.2}) vis {visibility:.2}",
            worker.active_exercise(),
            positive_ratio(history.iter()) * 100.0,
            history.len(),
        );
    }

    worker.join()?;
    if let Some(err) = worker.last_error() {
        log::error!("pose worker gave up: {err}");
    }
    Ok(())
}
