//! Background worker state machine.
//!
//! A single thread runs every long-running sensor operation. Callers move it
//! between states with [`Worker::request_transition`] and friends; the
//! [`WorkHandler`] passed at start decides what each state does.
//!
//! # Examples
//!
//! ```
//! use fpc_hardware::WakeSlot;
//! use fpc_worker::{WorkHandler, Worker, WorkerConfig, WorkerState};
//!
//! struct Noop;
//!
//! impl WorkHandler for Noop {
//!     async fn run_enroll(&mut self) {}
//!     async fn run_authenticate(&mut self) {}
//! }
//!
//! let worker = Worker::start(WorkerConfig::default(), WakeSlot::new(), Noop).unwrap();
//! worker.pause().unwrap();
//! assert_eq!(worker.state(), WorkerState::Pause);
//! worker.resume().unwrap();
//! worker.stop().unwrap();
//! ```

pub mod state;
pub mod worker;

pub use state::{StateTransition, WorkerState};
pub use worker::{WorkHandler, Worker, WorkerConfig};
