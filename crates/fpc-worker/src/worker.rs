//! The background worker and its control handle.
//!
//! One thread, named `fpc-worker`, serializes every sensor operation. It
//! drives a current-thread tokio runtime so handlers can wait on the finger
//! interrupt and the wake slot at the same time.
//!
//! Callers never touch the thread directly. They request a state through
//! [`Worker::request_transition`], which stores it in the [`WakeSlot`] and
//! wakes whatever the worker is blocked on. The worker consumes the slot,
//! publishes the state it entered and notifies waiters through a condition
//! variable.

#![allow(async_fn_in_trait)]

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use fpc_core::{
    Error, Result,
    constants::{DEFAULT_TRANSITION_TIMEOUT_MS, WORKER_THREAD_NAME},
};
use fpc_hardware::{WakeReceiver, WakeSlot};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::state::{STATE_COUNT, StateTransition, WorkerState};

const MAX_HISTORY_SIZE: usize = 32;

/// Worker tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// How long [`Worker::wait_for_transition`] waits for the worker to
    /// acknowledge, in milliseconds.
    pub transition_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            transition_timeout_ms: DEFAULT_TRANSITION_TIMEOUT_MS,
        }
    }
}

impl WorkerConfig {
    pub fn transition_timeout(&self) -> Duration {
        Duration::from_millis(self.transition_timeout_ms)
    }
}

/// What the worker runs in each state.
///
/// Handlers run on the worker thread inside its runtime, so their futures
/// need not be `Send`. The enroll and authenticate loops must return once a
/// transition becomes pending.
pub trait WorkHandler: Send + 'static {
    /// Called on entering `Idle`. Must return once a transition is pending.
    async fn run_idle(&mut self, wake: &mut WakeReceiver<WorkerState>) {
        if let Err(e) = wake.pending().await {
            warn!(error = %e, "idle wait ended without a transition");
        }
    }

    async fn run_enroll(&mut self);

    async fn run_authenticate(&mut self);
}

#[derive(Debug)]
struct Published {
    current: WorkerState,
    // Times each state was entered, indexed by `WorkerState::index`.
    entries: [u64; STATE_COUNT],
    history: VecDeque<StateTransition>,
}

#[derive(Debug)]
struct Shared {
    slot: WakeSlot<WorkerState>,
    published: Mutex<Published>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, Published>> {
        self.published
            .lock()
            .map_err(|_| Error::Poisoned("worker state lock".into()))
    }

    /// Worker side. Take the pending transition, defaulting to `Idle`, and
    /// publish it.
    fn consume_next_state(&self) -> WorkerState {
        let next = self.slot.take().unwrap_or(WorkerState::Idle);
        self.publish(next);
        next
    }

    fn publish(&self, state: WorkerState) {
        {
            // The worker thread keeps running with a poisoned lock; callers
            // see the poison on their side.
            let mut published = self
                .published
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let from = published.current;
            published.current = state;
            published.entries[state.index()] += 1;
            published.history.push_back(StateTransition::new(from, state));
            if published.history.len() > MAX_HISTORY_SIZE {
                published.history.pop_front();
            }
        }
        self.changed.notify_all();
        debug!(state = %state, "worker entered state");
    }
}

/// Handle to the background worker.
///
/// Dropping the handle stops the worker and joins its thread.
#[derive(Debug)]
pub struct Worker {
    shared: Arc<Shared>,
    requests: Mutex<()>,
    config: WorkerConfig,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    /// Spawn the worker thread.
    ///
    /// `slot` is the wake slot the handler observes for cancellation; the
    /// worker takes transitions out of it.
    ///
    /// # Errors
    ///
    /// Returns the fatal `Error::WorkerUnavailable` if the runtime or the
    /// thread cannot be created.
    pub fn start<H: WorkHandler>(
        config: WorkerConfig,
        slot: WakeSlot<WorkerState>,
        handler: H,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::WorkerUnavailable(format!("worker runtime: {e}")))?;

        let shared = Arc::new(Shared {
            slot,
            published: Mutex::new(Published {
                current: WorkerState::Invalid,
                entries: [0; STATE_COUNT],
                history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
            }),
            changed: Condvar::new(),
        });

        let wake = shared.slot.subscribe();
        let thread_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || runtime.block_on(run(thread_shared, wake, handler)))
            .map_err(|e| Error::WorkerUnavailable(format!("spawn {WORKER_THREAD_NAME}: {e}")))?;

        info!(
            timeout_ms = config.transition_timeout_ms,
            "worker thread started"
        );
        Ok(Self {
            shared,
            requests: Mutex::new(()),
            config,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// State the worker last entered.
    pub fn state(&self) -> WorkerState {
        self.shared
            .lock()
            .map(|published| published.current)
            .unwrap_or(WorkerState::Invalid)
    }

    /// Most recent transitions, oldest first.
    pub fn history(&self) -> Vec<StateTransition> {
        self.shared
            .lock()
            .map(|published| published.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Ask the worker to move to `target` without waiting.
    ///
    /// Returns the transition this request displaced, if one was still
    /// pending.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidStateTransition` when a capture loop is running and
    ///   `target` is `Pause`, `Enroll` or `Authenticate`.
    /// - `Error::WorkerUnavailable` when the worker thread is gone.
    pub fn request_transition(&self, target: WorkerState) -> Result<Option<WorkerState>> {
        let _requests = self.lock_requests()?;
        self.request_locked(target)
    }

    fn request_locked(&self, target: WorkerState) -> Result<Option<WorkerState>> {
        if self.shared.slot.is_closed() {
            return Err(Error::WorkerUnavailable(format!(
                "worker thread exited, cannot enter {target}"
            )));
        }

        let current = self.shared.lock()?.current;
        // A pending transition means the running loop is already on its way
        // out, so the new request simply replaces it.
        if current.refuses(target) && !self.shared.slot.is_pending() {
            debug!(from = %current, to = %target, "transition refused");
            return Err(Error::InvalidStateTransition {
                from: current.to_string(),
                to: target.to_string(),
            });
        }

        let displaced = self.shared.slot.send(target);
        if let Some(displaced) = displaced {
            warn!(
                displaced = %displaced,
                requested = %target,
                "pending transition overridden"
            );
        }
        debug!(from = %current, to = %target, "transition requested");
        Ok(displaced)
    }

    /// Request `target` and block until the worker has entered it.
    ///
    /// # Errors
    ///
    /// Everything [`Worker::request_transition`] returns, plus the fatal
    /// `Error::TransitionTimeout` when the worker does not acknowledge within
    /// the configured timeout.
    pub fn wait_for_transition(&self, target: WorkerState) -> Result<()> {
        let baseline = {
            let _requests = self.lock_requests()?;
            let baseline = self.shared.lock()?.entries[target.index()];
            self.request_locked(target)?;
            baseline
        };

        let timeout = self.config.transition_timeout();
        let published = self.shared.lock()?;
        let (_published, result) = self
            .shared
            .changed
            .wait_timeout_while(published, timeout, |p| {
                p.entries[target.index()] <= baseline
            })
            .map_err(|_| Error::Poisoned("worker state lock".into()))?;

        if result.timed_out() {
            error!(
                state = %target,
                timeout_ms = self.config.transition_timeout_ms,
                "worker did not acknowledge transition"
            );
            return Err(Error::TransitionTimeout {
                state: target.to_string(),
                timeout_ms: self.config.transition_timeout_ms,
            });
        }
        Ok(())
    }

    /// Park the worker in `Pause` and wait until it is there.
    pub fn pause(&self) -> Result<()> {
        self.wait_for_transition(WorkerState::Pause)
    }

    /// Return the worker to `Idle` without waiting. Cancels a running
    /// capture loop.
    pub fn resume(&self) -> Result<()> {
        self.request_transition(WorkerState::Idle).map(|_| ())
    }

    /// Stop the worker and join its thread. Calling it again is a no-op.
    pub fn stop(&self) -> Result<()> {
        let mut thread = self
            .thread
            .lock()
            .map_err(|_| Error::Poisoned("worker thread handle".into()))?;
        let Some(handle) = thread.take() else {
            return Ok(());
        };

        self.wait_for_transition(WorkerState::Stop)?;
        handle
            .join()
            .map_err(|_| Error::WorkerUnavailable("worker thread panicked".into()))?;
        info!("worker thread stopped");
        Ok(())
    }

    fn lock_requests(&self) -> Result<MutexGuard<'_, ()>> {
        self.requests
            .lock()
            .map_err(|_| Error::Poisoned("worker request lock".into()))
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "worker did not stop cleanly");
        }
    }
}

async fn run<H: WorkHandler>(
    shared: Arc<Shared>,
    mut wake: WakeReceiver<WorkerState>,
    mut handler: H,
) {
    loop {
        match shared.consume_next_state() {
            WorkerState::Idle => handler.run_idle(&mut wake).await,
            WorkerState::Pause => {
                if wake.pending().await.is_err() {
                    break;
                }
            }
            WorkerState::Enroll => {
                handler.run_enroll().await;
                shared.publish(WorkerState::Idle);
            }
            WorkerState::Authenticate => {
                handler.run_authenticate().await;
                shared.publish(WorkerState::Idle);
            }
            WorkerState::Stop => break,
            WorkerState::Invalid => {}
        }
    }
    debug!("worker loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nothing;

    impl WorkHandler for Nothing {
        async fn run_enroll(&mut self) {}

        async fn run_authenticate(&mut self) {}
    }

    fn wait_until(worker: &Worker, state: WorkerState) {
        for _ in 0..400 {
            if worker.state() == state {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("worker never reached {state}, stuck in {}", worker.state());
    }

    #[test]
    fn test_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.transition_timeout(), Duration::from_secs(3));
        let parsed: WorkerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_starts_idle() {
        let worker = Worker::start(WorkerConfig::default(), WakeSlot::new(), Nothing).unwrap();
        wait_until(&worker, WorkerState::Idle);
    }

    #[test]
    fn test_finished_loop_reverts_to_idle() {
        let worker = Worker::start(WorkerConfig::default(), WakeSlot::new(), Nothing).unwrap();
        worker.wait_for_transition(WorkerState::Enroll).unwrap();
        wait_until(&worker, WorkerState::Idle);

        let entered: Vec<_> = worker.history().iter().map(|t| t.to).collect();
        assert!(entered.contains(&WorkerState::Enroll));
        assert_eq!(entered.last(), Some(&WorkerState::Idle));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let worker = Worker::start(WorkerConfig::default(), WakeSlot::new(), Nothing).unwrap();
        worker.stop().unwrap();
        assert_eq!(worker.state(), WorkerState::Stop);
        worker.stop().unwrap();
        assert!(matches!(
            worker.request_transition(WorkerState::Idle),
            Err(Error::WorkerUnavailable(_))
        ));
    }
}
