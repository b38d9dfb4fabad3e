//! # cohort
//!
//! Process-lifecycle runtime: a priority-ordered pub/sub bus with an explicit
//! state machine, tasks bound to its lifecycle, cross-process start
//! synchronization, child-process supervision, and an authenticated
//! point-to-point connection channel.
//!
//! ## Architecture
//! ```text
//!                    ┌──────────────────────────────────────────┐
//!                    │                 Process                   │
//!                    │  run() / run_until()   signals ─► exit()  │
//!                    └───────────────┬──────────────────────────┘
//!                                    │ owns exactly one
//!                                    ▼
//!   Tasks ── TaskBinding ──►  ┌────────────┐  ◄── LogWriter (log)
//!   SubBusTask (nested bus)   │    Bus     │  ◄── ChildWatch (main)
//!   Supervisor (on stop)      │ start/stop │
//!   Listener / Client         │   /exit    │
//!                             └─────┬──────┘
//!                                   │ on start (cohort roles)
//!                     ┌─────────────┴─────────────┐
//!                     ▼                           ▼
//!               SyncGate (parent)           SyncWaiter (child)
//!               release cohort              park until released
//! ```
//!
//! ## Lifecycle contract
//! Every component hangs off one [`Bus`]: publishing an event dispatches to
//! its subscribers in ascending priority order, sequentially, on the
//! publishing task. `start`, `stop`, `exit`, `reset`, `log`, and `main` are
//! the reserved channels; [`Task`]s bind their hooks to the first four,
//! [`Bus::block`] publishes `main` every poll interval, and everything logs
//! by publishing on `log`.
//!
//! ## Quick start
//! ```no_run
//! use std::sync::Arc;
//!
//! use cohort::{Bus, Config, Process, Task, TaskError};
//!
//! struct Greeter;
//!
//! #[async_trait::async_trait]
//! impl Task for Greeter {
//!     fn name(&self) -> &str {
//!         "greeter"
//!     }
//!
//!     async fn on_start(&self, bus: &Bus) -> Result<(), TaskError> {
//!         bus.log(cohort::LogLevel::Info, "hello").await;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), cohort::ProcessError> {
//!     let process = Process::new(Config::default());
//!     process.register_task(Arc::new(Greeter)).await;
//!     process.run().await
//! }
//! ```
//!
//! ## Modules
//! - [`events`](crate::events) — event model, subscriber registry, the bus
//! - [`tasks`](crate::tasks) — task contract, bindings, sub-bus composition
//! - [`process`](crate::process) — run loops, signals, OS child handles
//! - [`sync`](crate::sync) — cohort start handshake (gate/waiter)
//! - [`conn`](crate::conn) — authenticated connection channel
//! - [`supervisor`](crate::supervisor) — child reaper task
//! - [`subscribers`](crate::subscribers) — built-in bus consumers

pub mod config;
pub mod conn;
pub mod error;
pub mod events;
pub mod process;
pub mod subscribers;
pub mod supervisor;
pub mod sync;
pub mod tasks;

pub use config::Config;
pub use conn::{Client, EndpointState, Listener, Wire, WireSink, WireStream};
pub use error::{ConnectionError, ProcessError, SyncError, TaskError};
pub use events::{
    channel, Bus, BusState, Event, Handler, HandlerFn, HandlerRef, LogLevel, LogRecord, Payload,
};
pub use process::{ChildHandle, OsChild, Process};
pub use subscribers::LogWriter;
pub use supervisor::Supervisor;
pub use sync::{SyncGate, SyncWaiter};
pub use tasks::{SubBusTask, Task, TaskBinding, TaskRef, DEFAULT_PRIORITY};
