//! # Listener endpoint: accept, authenticate, pump.
//!
//! A [`Listener`] binds its socket eagerly at construction (so the address is
//! claimed — and observable — before the bus starts) and spawns its accept
//! loop from `on_start`. Every accepted connection runs the wire handshake;
//! authenticated peers get a pump task that feeds inbound frames into one
//! shared queue, which [`recv`](Listener::recv) drains.
//!
//! ## Rules
//! - Peers that fail authentication are logged and dropped; the accept loop
//!   keeps running.
//! - `stop()` is idempotent: it cancels the accept loop and every pump,
//!   clears the tracked-connection list, and returns promptly even while the
//!   accept loop is parked waiting for a peer.
//! - A stopped listener refuses to start again.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::conn::wire::Wire;
use crate::conn::EndpointState;
use crate::error::{ConnectionError, TaskError};
use crate::events::{Bus, LogLevel};
use crate::tasks::Task;

/// Accepting endpoint of the connection channel.
pub struct Listener {
    inner: Arc<ListenerInner>,
}

struct ListenerInner {
    name: String,
    secret: Vec<u8>,
    local_addr: SocketAddr,
    state: Mutex<EndpointState>,
    socket: Mutex<Option<TcpListener>>,
    cancel: CancellationToken,
    conns: Mutex<Vec<SocketAddr>>,
    // Dropped by stop() so a parked recv() observes closure.
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<Value>>>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Value>>,
}

impl Listener {
    /// Binds `addr` immediately and returns the endpoint in `Created` state.
    pub async fn bind(addr: SocketAddr, secret: impl Into<Vec<u8>>) -> std::io::Result<Self> {
        let socket = TcpListener::bind(addr).await?;
        let local_addr = socket.local_addr()?;
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Ok(Self {
            inner: Arc::new(ListenerInner {
                name: format!("listener:{local_addr}"),
                secret: secret.into(),
                local_addr,
                state: Mutex::new(EndpointState::Created),
                socket: Mutex::new(Some(socket)),
                cancel: CancellationToken::new(),
                conns: Mutex::new(Vec::new()),
                inbound_tx: Mutex::new(Some(inbound_tx)),
                inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            }),
        })
    }

    /// The bound local address (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Current endpoint state.
    pub fn state(&self) -> EndpointState {
        *lock(&self.inner.state)
    }

    /// Number of currently tracked authenticated connections.
    pub fn connections(&self) -> usize {
        lock(&self.inner.conns).len()
    }

    /// Awaits the next inbound frame from any connected peer.
    ///
    /// Returns [`ConnectionError::Closed`] once the listener is stopped and
    /// the queue is drained.
    pub async fn recv(&self) -> Result<Value, ConnectionError> {
        self.inner
            .inbound_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(ConnectionError::Closed)
    }

    /// Stops the endpoint: cancels the accept loop and every connection pump,
    /// clears the tracked list. Idempotent.
    pub fn stop(&self) {
        {
            let mut state = lock(&self.inner.state);
            if *state == EndpointState::Stopped {
                return;
            }
            *state = EndpointState::Stopped;
        }
        self.inner.cancel.cancel();
        lock(&self.inner.inbound_tx).take();
        lock(&self.inner.conns).clear();
    }
}

impl ListenerInner {
    async fn accept_loop(self: Arc<Self>, socket: TcpListener, bus: Bus) {
        loop {
            let accepted = tokio::select! {
                () = self.cancel.cancelled() => return,
                accepted = socket.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(self.clone().serve_conn(stream, peer, bus.clone()));
                }
                Err(err) => {
                    bus.log(LogLevel::Warn, format!("accept failed: {err}")).await;
                }
            }
        }
    }

    async fn serve_conn(self: Arc<Self>, stream: TcpStream, peer: SocketAddr, bus: Bus) {
        let mut wire = match Wire::accept(stream, &self.secret).await {
            Ok(wire) => wire,
            Err(err) => {
                bus.log(
                    LogLevel::Warn,
                    format!("rejected connection from {peer}: {err}"),
                )
                .await;
                return;
            }
        };
        bus.log(LogLevel::Info, format!("accepted connection from {peer}"))
            .await;
        lock(&self.conns).push(peer);

        loop {
            let frame = tokio::select! {
                () = self.cancel.cancelled() => break,
                frame = wire.recv() => frame,
            };
            match frame {
                Ok(value) => {
                    // Frames arriving after stop() are discarded.
                    if let Some(tx) = lock(&self.inbound_tx).as_ref() {
                        let _ = tx.send(value);
                    }
                }
                Err(ConnectionError::Closed) => {
                    bus.log(LogLevel::Info, format!("{peer} disconnected")).await;
                    break;
                }
                Err(err) => {
                    bus.log(
                        LogLevel::Warn,
                        format!("connection to {peer} failed: {err}"),
                    )
                    .await;
                    break;
                }
            }
        }
        lock(&self.conns).retain(|tracked| *tracked != peer);
    }
}

#[async_trait]
impl Task for Listener {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn on_start(&self, bus: &Bus) -> Result<(), TaskError> {
        {
            let mut state = lock(&self.inner.state);
            match *state {
                EndpointState::Created => *state = EndpointState::Running,
                EndpointState::Running => return Ok(()),
                EndpointState::Stopped => {
                    return Err(TaskError::fail("listener already stopped"))
                }
            }
        }
        let socket = lock(&self.inner.socket)
            .take()
            .ok_or_else(|| TaskError::fail("listener socket already consumed"))?;
        bus.log(
            LogLevel::Info,
            format!("listening on {}", self.inner.local_addr),
        )
        .await;
        tokio::spawn(self.inner.clone().accept_loop(socket, bus.clone()));
        Ok(())
    }

    async fn on_stop(&self, bus: &Bus) -> Result<(), TaskError> {
        bus.log(
            LogLevel::Info,
            format!("stopping listener on {}", self.inner.local_addr),
        )
        .await;
        self.stop();
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
