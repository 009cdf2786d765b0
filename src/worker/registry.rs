use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::error::{PoseError, PoseResult};

/// Tracks which worker currently owns the camera. Only one may run per
/// registry; production code shares [`WorkerRegistry::global`].
#[derive(Clone, Debug, Default)]
pub struct WorkerRegistry {
    active: Arc<Mutex<Option<u64>>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> Self {
        static GLOBAL: OnceLock<WorkerRegistry> = OnceLock::new();
        GLOBAL.get_or_init(WorkerRegistry::new).clone()
    }

    /// Claims the slot for `worker_id`. The slot is freed when the returned
    /// handle is dropped.
    pub fn claim(&self, worker_id: u64) -> PoseResult<RegistrySlot> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        match *active {
            Some(owner) => {
                log::warn!("worker {worker_id} rejected, worker {owner} is already running");
                Err(PoseError::AnotherWorkerRunning)
            }
            None => {
                *active = Some(worker_id);
                Ok(RegistrySlot {
                    registry: self.clone(),
                    worker_id,
                })
            }
        }
    }

    pub fn active_worker(&self) -> Option<u64> {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
pub struct RegistrySlot {
    registry: WorkerRegistry,
    worker_id: u64,
}

impl Drop for RegistrySlot {
    fn drop(&mut self) {
        let mut active = self
            .registry
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *active == Some(self.worker_id) {
            *active = None;
        }
    }
}
