//! Process layer: the bus owner, its run loops, and OS child handles.
//!
//! - [`Process`] — one OS process, one bus, registered tasks, signal wiring
//! - [`ChildHandle`] / [`OsChild`] — the narrow OS-process interface used by
//!   the supervisor and the fan-in watcher

mod child;
mod process;
mod shutdown;

pub use child::{ChildHandle, OsChild};
pub use process::Process;
