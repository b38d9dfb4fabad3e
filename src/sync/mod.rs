//! Fan-out start handshake: release a cohort of child processes at once.
//!
//! A [`SyncGate`] (parent) and N [`SyncWaiter`]s (children) form a barrier
//! across process boundaries: each child's bus parks in `start()` until the
//! parent's bus — after a configured grace delay — notifies them all, so the
//! whole cohort begins running its tasks at effectively the same instant.
//!
//! The rendezvous is a loopback TCP exchange rather than a shared condition
//! variable: same observable semantics, but selectable, timeout-capable, and
//! portable.
//!
//! ```text
//!  parent                       child 1..N
//!  ──────                       ──────────
//!  SyncGate::bind(addr)
//!  spawn children ────────────► SyncWaiter::new(addr)
//!  bus.start():                 bus.start():
//!    sleep(sync_delay)            connect + block on read  ◄── wait point
//!    gate.release_all() ────────► release byte ─► proceed with `start`
//!    proceed with `start`
//! ```

mod gate;
mod waiter;

pub use gate::SyncGate;
pub use waiter::SyncWaiter;
