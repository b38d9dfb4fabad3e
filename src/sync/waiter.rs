//! # Child side of the cohort start handshake.
//!
//! [`SyncWaiter`] connects to the parent's [`SyncGate`](super::SyncGate) and
//! blocks until the release byte arrives. The base design waits without
//! bound — a child whose parent never notifies stalls forever; pass a timeout
//! to surface [`SyncError::HandshakeTimeout`] instead.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::error::SyncError;

/// Blocks a child bus's `start()` until the parent releases the cohort.
pub struct SyncWaiter {
    addr: SocketAddr,
    timeout: Option<Duration>,
}

impl SyncWaiter {
    /// Creates a waiter with an unbounded wait (the base design).
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            timeout: None,
        }
    }

    /// Creates a waiter whose wait is bounded by `timeout`.
    pub fn with_timeout(addr: SocketAddr, timeout: Duration) -> Self {
        Self {
            addr,
            timeout: Some(timeout),
        }
    }

    /// Registers at the gate and waits for the release notification.
    pub async fn wait(&self) -> Result<(), SyncError> {
        match self.timeout {
            None => self.rendezvous().await.map_err(SyncError::from),
            Some(bound) => match tokio::time::timeout(bound, self.rendezvous()).await {
                Ok(done) => done.map_err(SyncError::from),
                Err(_elapsed) => Err(SyncError::HandshakeTimeout { timeout: bound }),
            },
        }
    }

    async fn rendezvous(&self) -> std::io::Result<()> {
        let mut stream = TcpStream::connect(self.addr).await?;
        let mut release = [0u8; 1];
        stream.read_exact(&mut release).await?;
        Ok(())
    }
}
