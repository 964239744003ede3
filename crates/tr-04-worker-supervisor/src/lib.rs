//! # Worker Supervisor
//!
//! Keeps exactly one submission worker running. When the active worker
//! reports a broker connection failure, the supervisor discards it and builds
//! a replacement through a `WorkerFactory` (which typically re-resolves the
//! broker address). Callers hold a `RunningWorker` whose `stop()` always
//! reaches the worker that is current at that moment.
//!
//! ```text
//!  start_with_discovery ─→ factory.create() ─→ subscribe ─→ start()
//!                                                   │
//!              ┌────────── failure ─────────────────┘
//!              ↓
//!  monitor: factory.create() ─→ subscribe ─→ start()   (retry every
//!                                                       retry_interval)
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod error;
pub mod ports;
pub mod supervisor;

pub use error::SupervisorError;
pub use ports::{SupervisedWorker, WorkerFactory};
pub use supervisor::{start_with_discovery, RunningWorker, SupervisorConfig};
