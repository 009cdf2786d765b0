pub mod guard;
pub mod registry;

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, PoisonError, RwLock,
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::anyhow;
use crossbeam_channel::bounded;

use crate::{
    body::BodyPart,
    error::{PoseError, PoseResult, StepError},
    exercise::{Exercise, ExerciseModels},
    features::FeatureVector,
    history::{DEFAULT_HISTORY_CAPACITY, ResultHistory},
    pipeline::{self, Classifier, ClassifierLoader, FrameClock, FrameSource, LandmarkModel, PoseBackend},
    types::{Frame, LandmarkResult, Verdict},
};

use self::{
    guard::{Guard, GuardPhase},
    registry::WorkerRegistry,
};

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Debug)]
pub struct WorkerSettings {
    pub history_capacity: usize,
    /// Failed iterations in a row after which the worker stops itself.
    pub max_consecutive_failures: u32,
    /// Upper bound on how long a controller waits for the worker to yield.
    pub guard_timeout: Option<Duration>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_consecutive_failures: 30,
            guard_timeout: Some(Duration::from_secs(2)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

struct ActiveModel {
    path: PathBuf,
    classifier: Box<dyn Classifier>,
}

/// State the worker writes every iteration. Only touched while holding the
/// guard.
struct PipelineState {
    frame: Option<Arc<Frame>>,
    landmarks: Option<Arc<LandmarkResult>>,
    features: Option<FeatureVector>,
    exercise: Exercise,
    model: ActiveModel,
    history: ResultHistory,
}

/// Copies of the latest values for readers that can live with one iteration
/// of staleness. Each field is replaced as a whole, so a reader sees either
/// the old or the new value, but two fields may come from different
/// iterations.
struct Published {
    frame: RwLock<Option<Arc<Frame>>>,
    landmarks: RwLock<Option<Arc<LandmarkResult>>>,
    history: RwLock<Arc<[Verdict]>>,
    exercise: RwLock<Exercise>,
    model_path: RwLock<PathBuf>,
}

fn read<T: Clone>(lock: &RwLock<T>) -> T {
    lock.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn write<T>(lock: &RwLock<T>, value: T) {
    *lock.write().unwrap_or_else(PoisonError::into_inner) = value;
}

struct Shared {
    guard: Guard<PipelineState>,
    published: Published,
    stop: AtomicBool,
    state: Mutex<WorkerState>,
    consecutive_failures: AtomicU32,
    last_error: Mutex<Option<String>>,
}

impl Shared {
    fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, from: WorkerState, to: WorkerState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == from {
            *state = to;
            true
        } else {
            false
        }
    }

    fn set_state(&self, to: WorkerState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }

    fn record_error(&self, message: String) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(message);
    }

    fn publish_history(&self, history: &ResultHistory) {
        write(&self.published.history, history.snapshot().into());
    }
}

/// Consistent view of the pipeline taken between two worker iterations.
#[derive(Clone, Debug)]
pub struct PoseSnapshot {
    pub frame: Option<Arc<Frame>>,
    pub landmarks: Option<Arc<LandmarkResult>>,
    pub features: Option<FeatureVector>,
    pub history: Vec<Verdict>,
    pub exercise: Exercise,
}

impl PoseSnapshot {
    pub fn landmark_point(&self, part: BodyPart) -> ((f32, f32, f32), f32) {
        self.landmarks
            .as_ref()
            .map(|result| result.point(part))
            .unwrap_or(((0.0, 0.0, 0.0), 0.0))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExerciseSwitch {
    pub previous: Exercise,
    pub current: Exercise,
    /// Whether a different classifier file had to be loaded.
    pub reloaded: bool,
}

/// Background pose estimation and exercise scoring.
///
/// The worker thread owns the camera and the landmark model for its whole
/// run. The classifier, the verdict history and the latest frame/landmarks
/// live behind a [`Guard`]; the accessors without `consistent` in their name
/// read published copies and never wait on the worker.
pub struct PoseWorker {
    id: u64,
    shared: Arc<Shared>,
    settings: WorkerSettings,
    models: ExerciseModels,
    loader: Arc<dyn ClassifierLoader>,
    registry: WorkerRegistry,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl PoseWorker {
    /// Loads the classifier for `exercise` up front; a worker that cannot
    /// score anything is never constructed.
    pub fn new(
        settings: WorkerSettings,
        models: ExerciseModels,
        loader: Arc<dyn ClassifierLoader>,
        exercise: Exercise,
    ) -> PoseResult<Self> {
        if settings.history_capacity == 0 {
            return Err(PoseError::Config(
                "history capacity must be at least 1".to_string(),
            ));
        }
        if settings.max_consecutive_failures == 0 {
            return Err(PoseError::Config(
                "max consecutive failures must be at least 1".to_string(),
            ));
        }

        let path = models.model_for(exercise).to_path_buf();
        let classifier = load_classifier(loader.as_ref(), &path)?;
        log::info!("loaded {exercise} classifier from {}", path.display());

        let history = ResultHistory::new(settings.history_capacity);
        let published = Published {
            frame: RwLock::new(None),
            landmarks: RwLock::new(None),
            history: RwLock::new(Arc::from(Vec::new())),
            exercise: RwLock::new(exercise),
            model_path: RwLock::new(path.clone()),
        };
        let state = PipelineState {
            frame: None,
            landmarks: None,
            features: None,
            exercise,
            model: ActiveModel { path, classifier },
            history,
        };

        Ok(Self {
            id: NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed),
            shared: Arc::new(Shared {
                guard: Guard::new(state),
                published,
                stop: AtomicBool::new(false),
                state: Mutex::new(WorkerState::Idle),
                consecutive_failures: AtomicU32::new(0),
                last_error: Mutex::new(None),
            }),
            settings,
            models,
            loader,
            registry: WorkerRegistry::global(),
            handle: Mutex::new(None),
        })
    }

    /// Uses `registry` instead of the process-wide one for the single
    /// running worker check.
    pub fn with_registry(mut self, registry: WorkerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Opens the backend on a new thread and begins the capture loop.
    ///
    /// Returns once the camera and landmark model are ready, or with the
    /// error that prevented them from opening. A failed start leaves the
    /// worker stopped; it never reports running.
    pub fn start<B: PoseBackend>(&self, mut backend: B) -> PoseResult<()> {
        let mut handle_slot = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if self.shared.state() != WorkerState::Idle || handle_slot.is_some() {
            return Err(PoseError::AlreadyStarted);
        }
        let registry_slot = self.registry.claim(self.id)?;

        log::info!("starting pose worker {} with {} backend", self.id, backend.label());

        let (ready_tx, ready_rx) = bounded::<anyhow::Result<()>>(1);
        let shared = self.shared.clone();
        let max_failures = self.settings.max_consecutive_failures;
        let worker_id = self.id;

        let spawned = thread::Builder::new()
            .name(format!("pose-worker-{worker_id}"))
            .spawn(move || {
                let _registry_slot = registry_slot;

                let mut source = match backend.open_source() {
                    Ok(source) => source,
                    Err(err) => {
                        shared.set_state(WorkerState::Stopped);
                        let _ = ready_tx.send(Err(err.context("failed to open frame source")));
                        return;
                    }
                };
                let landmarker = match backend.load_landmarker() {
                    Ok(landmarker) => landmarker,
                    Err(err) => {
                        source.release();
                        shared.set_state(WorkerState::Stopped);
                        let _ = ready_tx.send(Err(err.context("failed to load landmark model")));
                        return;
                    }
                };

                shared.transition(WorkerState::Idle, WorkerState::Running);
                let _ = ready_tx.send(Ok(()));

                run_worker_loop(&shared, source, landmarker, max_failures);

                shared.set_state(WorkerState::Stopped);
                log::info!("pose worker {worker_id} stopped");
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                self.shared.set_state(WorkerState::Stopped);
                return Err(PoseError::Backend(anyhow!(err).context("failed to spawn worker thread")));
            }
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {
                *handle_slot = Some(handle);
                Ok(())
            }
            Ok(Err(err)) => {
                log::error!("pose worker {} failed to start: {err:?}", self.id);
                let _ = handle.join();
                Err(PoseError::Backend(err))
            }
            Err(_) => {
                let _ = handle.join();
                self.shared.set_state(WorkerState::Stopped);
                Err(PoseError::WorkerPanicked)
            }
        }
    }

    /// Asks the loop to exit after the current iteration. Does not wait; the
    /// camera is released by the worker thread on its way out. Use
    /// [`PoseWorker::join`] to wait for that.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        if !self.shared.transition(WorkerState::Running, WorkerState::Stopping) {
            self.shared.transition(WorkerState::Idle, WorkerState::Stopped);
        }
    }

    /// Waits for the worker thread to exit. Returns immediately if it was
    /// never started or has already been joined.
    pub fn join(&self) -> PoseResult<()> {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => handle.join().map_err(|_| {
                self.shared.set_state(WorkerState::Stopped);
                PoseError::WorkerPanicked
            }),
            None => Ok(()),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    pub fn guard_phase(&self) -> GuardPhase {
        self.shared.guard.phase()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.shared.consecutive_failures.load(Ordering::Relaxed)
    }

    /// The error that made the worker give up, if any.
    pub fn last_error(&self) -> Option<String> {
        self.shared
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        read(&self.shared.published.frame)
    }

    pub fn latest_landmarks(&self) -> Option<Arc<LandmarkResult>> {
        read(&self.shared.published.landmarks)
    }

    /// Recent verdicts, oldest first.
    pub fn history(&self) -> Vec<Verdict> {
        read(&self.shared.published.history).to_vec()
    }

    pub fn active_exercise(&self) -> Exercise {
        read(&self.shared.published.exercise)
    }

    /// Position and visibility of one landmark on the most recent detection,
    /// zeros when nobody is in frame.
    pub fn landmark_point(&self, part: BodyPart) -> ((f32, f32, f32), f32) {
        self.latest_landmarks()
            .map(|result| result.point(part))
            .unwrap_or(((0.0, 0.0, 0.0), 0.0))
    }

    /// Latest frame with the detected skeleton drawn over it, `None` before
    /// the first frame. Waits for the worker like [`PoseWorker::consistent_snapshot`].
    pub fn annotated_frame(&self) -> PoseResult<Option<Frame>> {
        let snapshot = self.consistent_snapshot()?;
        let Some(frame) = snapshot.frame else {
            return Ok(None);
        };
        Ok(Some(match snapshot.landmarks {
            Some(landmarks) => pipeline::skeleton::annotate(&frame, &landmarks),
            None => frame.as_ref().clone(),
        }))
    }

    /// Frame, landmarks, features and history from the same iteration.
    pub fn consistent_snapshot(&self) -> PoseResult<PoseSnapshot> {
        self.shared
            .guard
            .access(self.settings.guard_timeout, |state| PoseSnapshot {
                frame: state.frame.clone(),
                landmarks: state.landmarks.clone(),
                features: state.features.clone(),
                history: state.history.snapshot(),
                exercise: state.exercise,
            })
    }

    /// Switches the tracked exercise and clears the verdict history.
    ///
    /// A new classifier is loaded only if `exercise` maps to a different file
    /// than the one in use. Loading happens before the worker is asked to
    /// step aside, so the worker is paused only for the swap itself.
    pub fn set_active_exercise(&self, exercise: Exercise) -> PoseResult<ExerciseSwitch> {
        let target = self.models.model_for(exercise).to_path_buf();
        let preloaded = if read(&self.shared.published.model_path) != target {
            Some(load_classifier(self.loader.as_ref(), &target)?)
        } else {
            None
        };

        let switch = self
            .shared
            .guard
            .access(self.settings.guard_timeout, |state| {
                let reloaded = if state.model.path != target {
                    let classifier = match preloaded {
                        Some(classifier) => classifier,
                        None => load_classifier(self.loader.as_ref(), &target)?,
                    };
                    state.model = ActiveModel {
                        path: target.clone(),
                        classifier,
                    };
                    write(&self.shared.published.model_path, target.clone());
                    true
                } else {
                    false
                };

                let previous = state.exercise;
                state.exercise = exercise;
                state.history.clear();
                write(&self.shared.published.exercise, exercise);
                self.shared.publish_history(&state.history);

                Ok::<_, PoseError>(ExerciseSwitch {
                    previous,
                    current: exercise,
                    reloaded,
                })
            })??;

        log::info!(
            "exercise {} -> {}{}",
            switch.previous,
            switch.current,
            if switch.reloaded { " (classifier reloaded)" } else { "" }
        );
        Ok(switch)
    }

    /// Replaces the classifier with a fresh load from `path`, keeping the
    /// current exercise. Used after retraining a model on disk.
    pub fn reload_classifier(&self, path: impl AsRef<Path>) -> PoseResult<()> {
        let path = path.as_ref().to_path_buf();
        let classifier = load_classifier(self.loader.as_ref(), &path)?;
        self.shared
            .guard
            .access(self.settings.guard_timeout, |state| {
                state.model = ActiveModel {
                    path: path.clone(),
                    classifier,
                };
                state.history.clear();
                write(&self.shared.published.model_path, path.clone());
                self.shared.publish_history(&state.history);
            })?;
        log::info!("classifier reloaded from {}", path.display());
        Ok(())
    }
}

impl Drop for PoseWorker {
    fn drop(&mut self) {
        self.stop();
        if let Err(err) = self.join() {
            log::error!("pose worker {} did not shut down cleanly: {err}", self.id);
        }
    }
}

fn load_classifier(loader: &dyn ClassifierLoader, path: &Path) -> PoseResult<Box<dyn Classifier>> {
    loader.load(path).map_err(|source| PoseError::ModelLoad {
        path: path.to_path_buf(),
        source,
    })
}

fn run_worker_loop<S, L>(shared: &Shared, mut source: S, mut landmarker: L, max_failures: u32)
where
    S: FrameSource,
    L: LandmarkModel,
{
    let mut held = shared.guard.hold();
    let mut clock = FrameClock::default();

    while !shared.stop.load(Ordering::SeqCst) && source.is_open() {
        let observation = match pipeline::detect(&mut source, &mut landmarker, &mut clock) {
            Ok(observation) => observation,
            Err(err) => {
                held.checkpoint();
                if record_failure(shared, err, max_failures) {
                    break;
                }
                continue;
            }
        };

        held.frame = Some(observation.frame.clone());
        held.landmarks = Some(observation.landmarks.clone());
        held.features = observation.features.clone();
        write(&shared.published.frame, Some(observation.frame));
        write(&shared.published.landmarks, Some(observation.landmarks));

        held.checkpoint();

        let state = &mut *held;
        match pipeline::classify(
            observation.features.as_deref(),
            state.model.classifier.as_mut(),
        ) {
            Ok(verdict) => {
                state.history.push(verdict);
                shared.publish_history(&state.history);
                shared.consecutive_failures.store(0, Ordering::Relaxed);
                log::trace!("verdict {verdict} for {}", state.exercise);
            }
            Err(err) => {
                if record_failure(shared, err, max_failures) {
                    break;
                }
            }
        }
    }

    drop(held);
    source.release();
}

/// Counts a skipped iteration. Returns true once the worker should give up.
fn record_failure(shared: &Shared, err: StepError, max_failures: u32) -> bool {
    let failures = shared.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
    if failures >= max_failures {
        log::error!("giving up after {failures} failed iterations in a row: {err}");
        shared.record_error(err.to_string());
        true
    } else {
        log::warn!("skipping iteration ({failures}/{max_failures}): {err}");
        false
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::pipeline::MockClassifier;

    struct MockLoader {
        loads: AtomicUsize,
    }

    impl ClassifierLoader for MockLoader {
        fn load(&self, _path: &Path) -> anyhow::Result<Box<dyn Classifier>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockClassifier::new()))
        }
    }

    fn new_worker(settings: WorkerSettings) -> PoseResult<PoseWorker> {
        PoseWorker::new(
            settings,
            ExerciseModels::new("default.onnx"),
            Arc::new(MockLoader {
                loads: AtomicUsize::new(0),
            }),
            Exercise::Squat,
        )
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let settings = WorkerSettings {
            history_capacity: 0,
            ..WorkerSettings::default()
        };
        assert!(matches!(new_worker(settings), Err(PoseError::Config(_))));
    }

    #[test]
    fn test_new_worker_is_idle() {
        let worker = new_worker(WorkerSettings::default()).unwrap();
        assert_eq!(worker.state(), WorkerState::Idle);
        assert_eq!(worker.guard_phase(), GuardPhase::Idle);
        assert_eq!(worker.active_exercise(), Exercise::Squat);
        assert!(worker.history().is_empty());
    }

    #[test]
    fn test_stop_before_start() {
        let worker = new_worker(WorkerSettings::default()).unwrap();
        worker.stop();
        assert_eq!(worker.state(), WorkerState::Stopped);
        assert!(worker.join().is_ok());
    }

    #[test]
    fn test_reload_clears_history() {
        let worker = new_worker(WorkerSettings::default()).unwrap();
        worker
            .shared
            .guard
            .access(None, |state| state.history.push(Verdict(1)))
            .unwrap();
        assert_eq!(worker.consistent_snapshot().unwrap().history.len(), 1);

        worker.reload_classifier("retrained.onnx").unwrap();
        let snapshot = worker.consistent_snapshot().unwrap();
        assert!(snapshot.history.is_empty());
        assert_eq!(snapshot.exercise, Exercise::Squat);
    }

    #[test]
    fn test_annotated_frame_reports_guard_timeout() {
        let settings = WorkerSettings {
            guard_timeout: Some(Duration::from_millis(20)),
            ..WorkerSettings::default()
        };
        let worker = new_worker(settings).unwrap();
        assert!(matches!(worker.annotated_frame(), Ok(None)));

        let shared = worker.shared.clone();
        let (held_tx, held_rx) = crossbeam_channel::bounded(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);
        let holder = thread::spawn(move || {
            let _held = shared.guard.hold();
            held_tx.send(()).unwrap();
            let _ = release_rx.recv();
        });
        held_rx.recv().unwrap();

        assert!(matches!(
            worker.annotated_frame(),
            Err(PoseError::GuardTimeout(_))
        ));

        release_tx.send(()).unwrap();
        holder.join().unwrap();
        assert!(matches!(worker.annotated_frame(), Ok(None)));
    }
}
