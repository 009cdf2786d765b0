//! Hand-off protocol between the worker, which holds the pipeline state for
//! its whole run, and controllers that occasionally need exclusive access.
//!
//! A controller first registers a request (the "flag" goes down), then takes
//! the state lock, which only becomes free once the worker reaches a
//! checkpoint and steps aside. When done it drops the lock *before*
//! withdrawing its request, and the worker re-acquires only after every
//! pending request is withdrawn.

use std::{
    ops::{Deref, DerefMut},
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use crate::error::{PoseError, PoseResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardPhase {
    /// No worker holds the state and nobody asked for it.
    Idle,
    /// The worker holds the state and runs freely.
    Open,
    /// A controller asked for access and is waiting for or about to take the lock.
    Yielding,
    /// A controller holds the state.
    Mutating,
}

#[derive(Debug, Default)]
struct Signals {
    /// Controllers that asked for access and have not finished yet.
    pending: usize,
    worker_holding: bool,
    mutating: bool,
}

pub struct Guard<T> {
    data: Mutex<T>,
    signals: Mutex<Signals>,
    changed: Condvar,
}

impl<T> Guard<T> {
    pub fn new(value: T) -> Self {
        Self {
            data: Mutex::new(value),
            signals: Mutex::new(Signals::default()),
            changed: Condvar::new(),
        }
    }

    pub fn phase(&self) -> GuardPhase {
        let signals = self.signals();
        if signals.mutating {
            GuardPhase::Mutating
        } else if signals.worker_holding {
            GuardPhase::Open
        } else if signals.pending > 0 {
            GuardPhase::Yielding
        } else {
            GuardPhase::Idle
        }
    }

    /// Takes the state for the worker. Waits for in-flight controller
    /// requests first so a starting worker cannot cut in on a mutation.
    pub fn hold(&self) -> Held<'_, T> {
        let mut signals = self.signals();
        assert!(
            !signals.worker_holding,
            "pipeline state is already held by a worker"
        );
        while signals.pending > 0 {
            signals = self.wait(signals);
        }
        signals.worker_holding = true;
        drop(signals);

        Held {
            guard: self,
            data: Some(self.lock_data()),
        }
    }

    /// Runs `f` with exclusive access to the state, waiting for the worker to
    /// step aside. Gives up with [`PoseError::GuardTimeout`] if the worker
    /// does not reach a checkpoint in time; `None` waits indefinitely.
    pub fn access<R>(&self, timeout: Option<Duration>, f: impl FnOnce(&mut T) -> R) -> PoseResult<R> {
        let request = Request::register(self);
        request.wait_for_worker(timeout)?;

        let mut mutation = Mutation::begin(self);
        let result = f(&mut *mutation.data);
        drop(mutation);

        drop(request);
        Ok(result)
    }

    fn signals(&self) -> MutexGuard<'_, Signals> {
        self.signals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_data(&self) -> MutexGuard<'_, T> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, signals: MutexGuard<'a, Signals>) -> MutexGuard<'a, Signals> {
        self.changed
            .wait(signals)
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_mutating(&self, mutating: bool) {
        self.signals().mutating = mutating;
    }
}

/// An outstanding controller request. Withdrawn on drop, which also covers a
/// controller closure that panics.
struct Request<'a, T> {
    guard: &'a Guard<T>,
}

impl<'a, T> Request<'a, T> {
    fn register(guard: &'a Guard<T>) -> Self {
        guard.signals().pending += 1;
        Self { guard }
    }

    fn wait_for_worker(&self, timeout: Option<Duration>) -> PoseResult<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut signals = self.guard.signals();
        while signals.worker_holding {
            signals = match deadline {
                None => self.guard.wait(signals),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(PoseError::GuardTimeout(timeout.unwrap_or_default()));
                    }
                    self.guard
                        .changed
                        .wait_timeout(signals, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
        Ok(())
    }
}

impl<T> Drop for Request<'_, T> {
    fn drop(&mut self) {
        let mut signals = self.guard.signals();
        assert!(
            signals.pending > 0,
            "guard access withdrawn without a matching request"
        );
        signals.pending -= 1;
        drop(signals);
        self.guard.changed.notify_all();
    }
}

/// A controller's lock on the state. Clears the mutating mark before the
/// lock itself is released.
struct Mutation<'a, T> {
    guard: &'a Guard<T>,
    data: MutexGuard<'a, T>,
}

impl<'a, T> Mutation<'a, T> {
    fn begin(guard: &'a Guard<T>) -> Self {
        let data = guard.lock_data();
        guard.set_mutating(true);
        Self { guard, data }
    }
}

impl<T> Drop for Mutation<'_, T> {
    fn drop(&mut self) {
        self.guard.set_mutating(false);
    }
}

/// The worker's long-lived hold on the state.
pub struct Held<'a, T> {
    guard: &'a Guard<T>,
    data: Option<MutexGuard<'a, T>>,
}

impl<T> Held<'_, T> {
    /// Steps aside if a controller asked for access, returning once every
    /// pending request is done. Returns whether it yielded.
    pub fn checkpoint(&mut self) -> bool {
        if self.guard.signals().pending == 0 {
            return false;
        }

        self.data = None;
        let mut signals = self.guard.signals();
        signals.worker_holding = false;
        self.guard.changed.notify_all();
        while signals.pending > 0 {
            signals = self.guard.wait(signals);
        }
        signals.worker_holding = true;
        drop(signals);

        self.data = Some(self.guard.lock_data());
        true
    }
}

impl<T> Deref for Held<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.data
            .as_deref()
            .expect("pipeline state is held outside of checkpoints")
    }
}

impl<T> DerefMut for Held<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.data
            .as_deref_mut()
            .expect("pipeline state is held outside of checkpoints")
    }
}

impl<T> Drop for Held<'_, T> {
    fn drop(&mut self) {
        self.data = None;
        self.guard.signals().worker_holding = false;
        self.guard.changed.notify_all();
    }
}
