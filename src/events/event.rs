//! # Events carried by the lifecycle bus.
//!
//! An [`Event`] pairs a channel name with a [`Payload`] and carries ordering
//! metadata (a globally unique sequence number and a wall-clock timestamp).
//!
//! ## Reserved channels
//! The core reserves six channel names, collected in the [`channel`] module:
//! `start`, `stop`, `exit`, `reset`, `log`, and `main` (the recurring tick
//! published by [`Bus::block`](crate::Bus::block)). Any other string is free
//! for collaborators to publish and subscribe on.
//!
//! ## Ordering guarantees
//! `seq` increases monotonically across all events in the process; use it to
//! restore global publish order when events are recorded out of band.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Reserved channel names of the lifecycle contract.
pub mod channel {
    /// Published by `Bus::start` while transitioning to `Started`.
    pub const START: &str = "start";
    /// Published by `Bus::stop` while transitioning to `Stopped`.
    pub const STOP: &str = "stop";
    /// Published by `Bus::exit` before the state reaches `Exiting`.
    pub const EXIT: &str = "exit";
    /// Reset hook; never published by the core itself.
    pub const RESET: &str = "reset";
    /// Log records published by `Bus::log`.
    pub const LOG: &str = "log";
    /// Recurring tick published by `Bus::block` every poll interval.
    pub const MAIN: &str = "main";
}

/// Severity of a [`LogRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// A log message travelling over the bus `log` channel.
///
/// Publishing logs as events decouples every component from any concrete
/// logger; the process installs a [`LogWriter`](crate::LogWriter) consumer
/// that forwards records to `tracing`.
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Severity of the message.
    pub level: LogLevel,
    /// The message text.
    pub message: String,
}

/// Payload attached to an [`Event`].
///
/// The lifecycle channels carry [`Payload::Empty`]; `log` carries
/// [`Payload::Log`]; connection endpoints deliver inbound frames as
/// [`Payload::Frame`]. [`Payload::Text`] is for free-form collaborator events.
#[derive(Debug, Clone)]
pub enum Payload {
    /// No payload (lifecycle and tick events).
    Empty,
    /// A log record on the `log` channel.
    Log(LogRecord),
    /// An inbound wire frame (opaque self-describing value).
    Frame(serde_json::Value),
    /// Free-form text payload for collaborator-defined channels.
    Text(String),
}

/// A single published event.
#[derive(Debug, Clone)]
pub struct Event {
    /// Channel this event was published on.
    pub channel: String,
    /// Attached payload.
    pub payload: Payload,
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp taken at publish time.
    pub at: SystemTime,
}

impl Event {
    /// Creates an event on `channel`, stamping sequence and timestamp.
    pub fn new(channel: impl Into<String>, payload: Payload) -> Self {
        Self {
            channel: channel.into(),
            payload,
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
        }
    }

    /// Shorthand for a `log`-channel event.
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::new(
            channel::LOG,
            Payload::Log(LogRecord {
                level,
                message: message.into(),
            }),
        )
    }
}
