//! # Global runtime configuration.
//!
//! Provides [`Config`] — centralized settings for a [`Process`](crate::Process)
//! and the connection endpoints it owns.
//!
//! Config is used in two ways:
//! 1. **Process creation**: `Process::new(config)` and the synchronizing /
//!    synchronized variants.
//! 2. **Client endpoints**: `Client::new(addr, key, &config)` reads the retry
//!    and polling knobs.
//!
//! ## Sentinel values
//! - `handshake_timeout = None` → unbounded wait on the start handshake
//!   (the base design; opt into a bound explicitly)
//! - `connect_attempts` is clamped to a minimum of 1 by the client

use std::time::Duration;

/// Global configuration for a process runtime.
///
/// ## Field semantics
/// - `interval`: poll interval of the blocking run loop (`main` tick cadence)
/// - `sync_delay`: grace period the releasing parent sleeps before notifying
///   its cohort, giving children time to reach the wait point
/// - `handshake_timeout`: optional bound on a child's handshake wait
/// - `connect_attempts`: bounded connect retries before permanent give-up
/// - `connect_backoff`: fixed sleep between failed connect attempts
/// - `poll_timeout`: receive-poll timeout of an established client connection
#[derive(Clone, Debug)]
pub struct Config {
    /// Poll interval for [`Bus::block`](crate::Bus::block); each tick publishes
    /// the recurring `main` event.
    pub interval: Duration,

    /// Grace period a synchronizing parent sleeps before releasing children.
    pub sync_delay: Duration,

    /// Optional bound on the synchronized child's handshake wait.
    ///
    /// `None` preserves the unbounded wait: a child that is never released
    /// blocks forever. Set a bound to surface
    /// [`SyncError::HandshakeTimeout`](crate::SyncError::HandshakeTimeout)
    /// instead.
    pub handshake_timeout: Option<Duration>,

    /// Maximum connection attempts a client makes before giving up permanently.
    pub connect_attempts: u32,

    /// Fixed backoff between failed connection attempts.
    pub connect_backoff: Duration,

    /// Receive-poll timeout on an established client connection.
    pub poll_timeout: Duration,
}

impl Config {
    /// Returns the connect attempt bound clamped to a minimum of 1.
    #[inline]
    pub fn connect_attempts_clamped(&self) -> u32 {
        self.connect_attempts.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `interval = 100ms` (run-loop tick)
    /// - `sync_delay = 1s` (cohort release grace)
    /// - `handshake_timeout = None` (unbounded wait)
    /// - `connect_attempts = 3`
    /// - `connect_backoff = 10s`
    /// - `poll_timeout = 1s`
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            sync_delay: Duration::from_secs(1),
            handshake_timeout: None,
            connect_attempts: 3,
            connect_backoff: Duration::from_secs(10),
            poll_timeout: Duration::from_secs(1),
        }
    }
}
