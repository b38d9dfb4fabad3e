//! # Authenticated point-to-point connection channel.
//!
//! Endpoints exchange opaque self-describing values over length-delimited TCP
//! frames, after a mutual keyed challenge-response handshake. There is no
//! routing, persistence, or delivery guarantee beyond TCP's — this is a
//! channel, not a broker.
//!
//! ## Architecture
//! ```text
//!  Client                                    Listener
//!  ──────                                    ────────
//!  connect loop (bounded retries)  ──TCP──►  accept loop (cancellable)
//!        │                                        │
//!        ▼                                        ▼
//!   Wire handshake  ◄── mutual HMAC auth ──►  Wire handshake
//!        │                                        │
//!   receive pump ──► inbound queue           per-conn pump ──► inbound queue
//! ```
//!
//! Both endpoints implement [`Task`](crate::Task): register them with a
//! process and the bus lifecycle starts and stops their loops.
//!
//! ### Notes
//! - [`Wire`] is the framed, authenticated stream both sides share.
//! - [`EndpointState`] is one-way: once an endpoint stops it never runs again.

mod client;
mod listener;
mod wire;

pub use client::Client;
pub use listener::Listener;
pub use wire::{Wire, WireSink, WireStream};

/// Lifecycle of a connection endpoint.
///
/// Endpoints move `Created → Running → Stopped` and never back: a stopped
/// endpoint refuses to start again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// Constructed, loops not yet spawned.
    Created,
    /// Loops running (for a client: connection established).
    Running,
    /// Stopped, permanently.
    Stopped,
}
