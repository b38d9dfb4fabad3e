//! # Task abstractions and bus bindings.
//!
//! This module provides the task-side of the lifecycle contract:
//! - [`Task`] — trait with lifecycle hooks and declared priorities
//! - [`TaskRef`] — shared reference to a task (`Arc<dyn Task>`)
//! - [`TaskBinding`] — idempotent subscribe/unsubscribe of a task to a bus
//! - [`SubBusTask`] — hierarchical composition over a nested bus

mod binding;
mod sub_bus;
mod task;

pub use binding::TaskBinding;
pub use sub_bus::SubBusTask;
pub use task::{Task, TaskRef, DEFAULT_PRIORITY};
