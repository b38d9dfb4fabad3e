//! # Task abstraction.
//!
//! A [`Task`] is a unit of work whose life is driven by bus lifecycle events:
//! its `on_start`/`on_stop`/`on_reset` hooks are invoked by the `start`,
//! `stop`, and `reset` channels once the task is bound to a bus through a
//! [`TaskBinding`](crate::TaskBinding).
//!
//! ## Priorities
//! Each hook carries an explicit declared priority (lower runs first,
//! default 50). Startup ordering and shutdown ordering are conventionally
//! mirror-inverted: core infrastructure starts with low numbers and stops
//! with high numbers, so late-starting dependents stop first.
//!
//! ## Contract
//! - Hooks must tolerate `on_stop` running even when `on_start` never did
//!   (failed startup still tears down every subscriber).
//! - Hooks run on the publishing task; delegate blocking work elsewhere.

use async_trait::async_trait;

use crate::error::TaskError;
use crate::events::Bus;

/// Default hook priority.
pub const DEFAULT_PRIORITY: u32 = 50;

/// # A unit of work bound to bus lifecycle events.
///
/// Default hook implementations are no-ops, so a task only overrides what it
/// needs.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use cohort::{Bus, LogLevel, Task, TaskError};
///
/// struct Heartbeat;
///
/// #[async_trait]
/// impl Task for Heartbeat {
///     fn name(&self) -> &str { "heartbeat" }
///
///     async fn on_start(&self, bus: &Bus) -> Result<(), TaskError> {
///         bus.log(LogLevel::Info, "heartbeat up").await;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Returns a stable, human-readable task name.
    fn name(&self) -> &str;

    /// Priority of the `start` hook (lower runs first).
    fn start_priority(&self) -> u32 {
        DEFAULT_PRIORITY
    }

    /// Priority of the `stop` hook (lower runs first; declare high to stop
    /// late, i.e. after dependents).
    fn stop_priority(&self) -> u32 {
        DEFAULT_PRIORITY
    }

    /// Priority of the `reset` hook.
    fn reset_priority(&self) -> u32 {
        DEFAULT_PRIORITY
    }

    /// Invoked by the bus `start` event.
    async fn on_start(&self, bus: &Bus) -> Result<(), TaskError> {
        let _ = bus;
        Ok(())
    }

    /// Invoked by the bus `stop` event.
    ///
    /// Must tolerate being called when [`on_start`](Task::on_start) never ran.
    async fn on_stop(&self, bus: &Bus) -> Result<(), TaskError> {
        let _ = bus;
        Ok(())
    }

    /// Invoked by the bus `reset` event.
    async fn on_reset(&self, bus: &Bus) -> Result<(), TaskError> {
        let _ = bus;
        Ok(())
    }
}

/// Shared handle to a task (`Arc<dyn Task>`).
pub type TaskRef = std::sync::Arc<dyn Task>;
