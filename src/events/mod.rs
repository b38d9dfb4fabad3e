//! Lifecycle events: data model, subscriber registry, and the bus.
//!
//! This module groups the event **data model** (channels, payloads, log
//! records), the **registry** of priority-ordered subscribers, and the
//! [`Bus`] state machine that dispatches to them.
//!
//! ## Contents
//! - [`Event`], [`Payload`], [`LogRecord`], [`channel`] — event data model
//! - [`Handler`], [`HandlerFn`], [`HandlerRef`] — subscriber callbacks
//! - [`Bus`], [`BusState`] — the lifecycle state machine
//!
//! ## Quick reference
//! - **Publishers**: `Process`, every `Task` hook, connection endpoints,
//!   `Bus::block` (the `main` tick), `Bus::log`.
//! - **Consumers**: anything registered through `Bus::subscribe`; the core
//!   wires `TaskBinding` hooks, `ChildWatch`, and `LogWriter` this way.

mod bus;
mod event;
mod registry;

pub use bus::{Bus, BusState};
pub use event::{channel, Event, LogLevel, LogRecord, Payload};
pub use registry::{Handler, HandlerFn, HandlerRef};
