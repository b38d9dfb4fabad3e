//! # Client endpoint: bounded connect retries, then a receive pump.
//!
//! A [`Client`] targets one listener address. `on_start` spawns the
//! connect/receive loop: up to `connect_attempts` tries with a fixed
//! `connect_backoff` between failures, then a permanent give-up — the
//! endpoint stops and never retries again. Once connected, the state flips
//! to `Running`, the receive side polls in `poll_timeout` slices, and every
//! inbound frame is queued for [`recv`](Client::recv) and echoed onto the
//! owning bus's `log` channel.
//!
//! ## Rules
//! - `send`/`recv` before the connection is established (or after stop)
//!   return [`ConnectionError::NotConnected`]; after a permanent give-up they
//!   return [`ConnectionError::Exhausted`] instead.
//! - Any transport error on an established connection stops the endpoint.
//! - An authentication rejection is permanent: no retry burns the remaining
//!   attempts against a peer that will keep refusing.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::conn::wire::{Wire, WireSink};
use crate::conn::EndpointState;
use crate::error::{ConnectionError, TaskError};
use crate::events::{Bus, LogLevel};
use crate::tasks::Task;

/// Connecting endpoint of the connection channel.
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    name: String,
    addr: SocketAddr,
    secret: Vec<u8>,
    attempts: u32,
    backoff: Duration,
    poll_timeout: Duration,
    state: Mutex<EndpointState>,
    exhausted: AtomicBool,
    cancel: CancellationToken,
    outbound: tokio::sync::Mutex<Option<WireSink>>,
    inbound_tx: mpsc::UnboundedSender<Value>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Value>>,
}

impl Client {
    /// Creates a client for `addr`; retry and polling knobs come from `cfg`.
    pub fn new(addr: SocketAddr, secret: impl Into<Vec<u8>>, cfg: &Config) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(ClientInner {
                name: format!("client:{addr}"),
                addr,
                secret: secret.into(),
                attempts: cfg.connect_attempts_clamped(),
                backoff: cfg.connect_backoff,
                poll_timeout: cfg.poll_timeout,
                state: Mutex::new(EndpointState::Created),
                exhausted: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                outbound: tokio::sync::Mutex::new(None),
                inbound_tx,
                inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            }),
        }
    }

    /// Current endpoint state; `Running` only while a connection is live.
    pub fn state(&self) -> EndpointState {
        *lock(&self.inner.state)
    }

    /// Sends `value` over the established connection.
    pub async fn send<T: Serialize>(&self, value: &T) -> Result<(), ConnectionError> {
        if self.state() != EndpointState::Running {
            return Err(self.inner.disconnected_error());
        }
        let encoded = serde_json::to_vec(value)?;
        let mut outbound = self.inner.outbound.lock().await;
        let sink = outbound.as_mut().ok_or(ConnectionError::NotConnected)?;
        sink.send(Bytes::from(encoded))
            .await
            .map_err(ConnectionError::Io)
    }

    /// Awaits the next inbound frame.
    pub async fn recv(&self) -> Result<Value, ConnectionError> {
        if self.state() != EndpointState::Running {
            return Err(self.inner.disconnected_error());
        }
        self.inner
            .inbound_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(ConnectionError::Closed)
    }

    /// Stops the endpoint: halts the loop and drops the connection.
    /// Idempotent; a stopped client never reconnects.
    pub fn stop(&self) {
        self.inner.halt();
    }
}

impl ClientInner {
    /// The error a disconnected endpoint reports: [`ConnectionError::Exhausted`]
    /// after the retry budget is spent, [`ConnectionError::NotConnected`]
    /// otherwise.
    fn disconnected_error(&self) -> ConnectionError {
        if self.exhausted.load(Ordering::SeqCst) {
            ConnectionError::Exhausted {
                attempts: self.attempts,
            }
        } else {
            ConnectionError::NotConnected
        }
    }

    /// Marks the endpoint stopped and cancels the loop. Idempotent.
    fn halt(&self) {
        {
            let mut state = lock(&self.state);
            if *state == EndpointState::Stopped {
                return;
            }
            *state = EndpointState::Stopped;
        }
        self.cancel.cancel();
    }

    async fn client_loop(self: Arc<Self>, bus: Bus) {
        let Some(wire) = self.establish(&bus).await else {
            self.halt();
            return;
        };
        if self.cancel.is_cancelled() {
            return;
        }
        *lock(&self.state) = EndpointState::Running;
        bus.log(LogLevel::Info, format!("connected to {}", self.addr))
            .await;

        let (sink, mut stream) = wire.split();
        *self.outbound.lock().await = Some(sink);

        loop {
            let polled = tokio::select! {
                () = self.cancel.cancelled() => break,
                polled = tokio::time::timeout(self.poll_timeout, stream.next()) => polled,
            };
            let frame = match polled {
                // Poll slice elapsed with nothing inbound; go around.
                Err(_elapsed) => continue,
                Ok(None) => {
                    bus.log(LogLevel::Info, format!("{} closed the connection", self.addr))
                        .await;
                    break;
                }
                Ok(Some(Err(err))) => {
                    bus.log(
                        LogLevel::Warn,
                        format!("connection to {} failed: {err}", self.addr),
                    )
                    .await;
                    break;
                }
                Ok(Some(Ok(frame))) => frame,
            };
            match serde_json::from_slice::<Value>(&frame) {
                Ok(value) => {
                    bus.log(
                        LogLevel::Debug,
                        format!("received from {}: {value}", self.addr),
                    )
                    .await;
                    // Receiver only drops on endpoint teardown.
                    let _ = self.inbound_tx.send(value);
                }
                Err(err) => {
                    bus.log(
                        LogLevel::Warn,
                        format!("undecodable frame from {}: {err}", self.addr),
                    )
                    .await;
                }
            }
        }
        self.halt();
        *self.outbound.lock().await = None;
    }

    /// Bounded connect retries; `None` means permanent give-up.
    async fn establish(&self, bus: &Bus) -> Option<Wire> {
        for attempt in 1..=self.attempts {
            if self.cancel.is_cancelled() {
                return None;
            }
            bus.log(
                LogLevel::Info,
                format!(
                    "connecting to {} (attempt {attempt}/{})",
                    self.addr, self.attempts
                ),
            )
            .await;
            match Wire::connect(self.addr, &self.secret).await {
                Ok(wire) => return Some(wire),
                Err(ConnectionError::AuthRejected) => {
                    bus.log(
                        LogLevel::Error,
                        format!("{} rejected our credentials", self.addr),
                    )
                    .await;
                    return None;
                }
                Err(err) => {
                    bus.log(
                        LogLevel::Warn,
                        format!("connection to {} failed: {err}", self.addr),
                    )
                    .await;
                }
            }
            if attempt < self.attempts {
                tokio::select! {
                    () = self.cancel.cancelled() => return None,
                    () = tokio::time::sleep(self.backoff) => {}
                }
            }
        }
        self.exhausted.store(true, Ordering::SeqCst);
        bus.log(
            LogLevel::Error,
            format!(
                "giving up on {} after {} attempts",
                self.addr, self.attempts
            ),
        )
        .await;
        None
    }
}

#[async_trait]
impl Task for Client {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn on_start(&self, bus: &Bus) -> Result<(), TaskError> {
        {
            let state = lock(&self.inner.state);
            match *state {
                EndpointState::Created => {}
                EndpointState::Running => return Ok(()),
                EndpointState::Stopped => {
                    return Err(TaskError::fail("client already stopped"))
                }
            }
        }
        tokio::spawn(self.inner.clone().client_loop(bus.clone()));
        Ok(())
    }

    async fn on_stop(&self, bus: &Bus) -> Result<(), TaskError> {
        bus.log(
            LogLevel::Info,
            format!("stopping client for {}", self.inner.addr),
        )
        .await;
        self.stop();
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
