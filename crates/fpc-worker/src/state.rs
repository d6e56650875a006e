//! Worker states and transition records.
//!
//! # States
//!
//! - `Invalid`: the worker thread has not consumed its first transition yet
//! - `Idle`: accepting new work
//! - `Pause`: sensor held idle until the next transition
//! - `Enroll` / `Authenticate`: a capture loop is running
//! - `Stop`: terminal, the thread exits
//!
//! # Request rules
//!
//! While a capture loop runs, requests for another long-running state or for
//! `Pause` are refused. `Idle` (cancel / resume) and `Stop` are always
//! accepted.
//!
//! ```
//! use fpc_worker::WorkerState;
//!
//! assert!(WorkerState::Enroll.refuses(WorkerState::Authenticate));
//! assert!(WorkerState::Enroll.refuses(WorkerState::Pause));
//! assert!(!WorkerState::Enroll.refuses(WorkerState::Idle));
//! assert!(!WorkerState::Idle.refuses(WorkerState::Enroll));
//! ```

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Number of [`WorkerState`] variants.
pub(crate) const STATE_COUNT: usize = 6;

/// State of the background worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Invalid,
    Idle,
    Pause,
    Authenticate,
    Enroll,
    Stop,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Invalid => "Invalid",
            WorkerState::Idle => "Idle",
            WorkerState::Pause => "Pause",
            WorkerState::Authenticate => "Authenticate",
            WorkerState::Enroll => "Enroll",
            WorkerState::Stop => "Stop",
        };
        f.write_str(name)
    }
}

impl WorkerState {
    /// Whether a capture loop runs in this state.
    pub fn is_active(self) -> bool {
        matches!(self, WorkerState::Enroll | WorkerState::Authenticate)
    }

    /// Whether a request for `target` must be refused while the worker is in
    /// this state.
    pub fn refuses(self, target: WorkerState) -> bool {
        self.is_active()
            && matches!(
                target,
                WorkerState::Pause | WorkerState::Enroll | WorkerState::Authenticate
            )
    }

    pub(crate) fn index(self) -> usize {
        match self {
            WorkerState::Invalid => 0,
            WorkerState::Idle => 1,
            WorkerState::Pause => 2,
            WorkerState::Authenticate => 3,
            WorkerState::Enroll => 4,
            WorkerState::Stop => 5,
        }
    }
}

/// Record of a state the worker entered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: WorkerState,
    pub to: WorkerState,

    /// Not serialized; set to the deserialization time when read back.
    #[serde(skip, default = "Instant::now")]
    pub timestamp: Instant,
}

impl StateTransition {
    pub fn new(from: WorkerState, to: WorkerState) -> Self {
        Self {
            from,
            to,
            timestamp: Instant::now(),
        }
    }
}
