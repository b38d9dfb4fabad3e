//! # Parent side of the cohort start handshake.
//!
//! [`SyncGate`] is the notify-all half of the barrier: it binds a loopback
//! listener, collects waiting children on a dedicated accept task, and
//! releases them all at once when the parent bus starts.
//!
//! ## Rules
//! - Registration is passive: a child counts as waiting once its rendezvous
//!   connection is accepted; the parent's grace delay exists to give children
//!   time to get here.
//! - After [`release_all`](SyncGate::release_all), late joiners are released
//!   immediately instead of waiting for a notification that already happened.
//! - Dropping the gate cancels the accept task.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Byte written to each waiter when the cohort is released.
pub(crate) const RELEASE: u8 = 0x01;

/// Process-shared notify-all point releasing a cohort of children at once.
pub struct SyncGate {
    local: SocketAddr,
    waiters: Arc<Mutex<Vec<TcpStream>>>,
    released: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl SyncGate {
    /// Binds the gate and starts accepting waiters.
    ///
    /// Bind to port 0 to let the OS pick; hand [`local_addr`](Self::local_addr)
    /// to the children (e.g. via an environment variable).
    pub async fn bind(addr: SocketAddr) -> std::io::Result<Arc<Self>> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        let waiters = Arc::new(Mutex::new(Vec::new()));
        let released = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        tokio::spawn(accept_loop(
            listener,
            waiters.clone(),
            released.clone(),
            cancel.clone(),
        ));

        Ok(Arc::new(Self {
            local,
            waiters,
            released,
            cancel,
        }))
    }

    /// The bound rendezvous address children should connect to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Releases every currently waiting child; returns how many were woken.
    ///
    /// Children registering afterwards are released immediately on arrival,
    /// so a straggler no longer deadlocks on a notification it missed.
    pub async fn release_all(&self) -> usize {
        self.released.store(true, Ordering::SeqCst);
        let mut waiters = self.waiters.lock().await;
        let mut woken = 0;
        for mut stream in waiters.drain(..) {
            if stream.write_all(&[RELEASE]).await.is_ok() {
                woken += 1;
            }
        }
        woken
    }

    /// Number of children currently parked at the gate.
    pub async fn waiting(&self) -> usize {
        self.waiters.lock().await.len()
    }
}

impl Drop for SyncGate {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept_loop(
    listener: TcpListener,
    waiters: Arc<Mutex<Vec<TcpStream>>>,
    released: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            accepted = listener.accept() => match accepted {
                Ok((mut stream, _peer)) => {
                    if released.load(Ordering::SeqCst) {
                        let _ = stream.write_all(&[RELEASE]).await;
                    } else {
                        waiters.lock().await.push(stream);
                    }
                }
                Err(err) => {
                    tracing::debug!(error = %err, "sync gate accept failed");
                }
            }
        }
    }
}
