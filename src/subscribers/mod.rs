//! Built-in bus subscribers.
//!
//! Components publish their logs as `log`-channel events; subscribers here
//! turn those events into side effects. The core ships [`LogWriter`], which
//! forwards records to the `tracing` facade.

mod log;

pub use log::LogWriter;
