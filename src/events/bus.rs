//! # Lifecycle bus: explicit state machine + priority-ordered pub/sub.
//!
//! [`Bus`] is the backbone every component publishes to or subscribes on. It
//! owns its state enum and subscriber registry explicitly — there is no
//! process-wide singleton; each [`Process`](crate::Process) (or nested
//! sub-bus) owns its instance and passes references.
//!
//! ## Architecture
//! ```text
//! Publishers (any task):                Dispatch (on the publishing task):
//!   Process  ──┐
//!   Tasks    ──┼── publish(channel) ──► snapshot handlers for channel
//!   Endpoints──┤                        │ ascending priority, stable ties
//!   block()  ──┘                        ▼
//!                                handler 1 ─► handler 2 ─► ... ─► handler N
//!                                 │ Err/panic caught, logged, dispatch continues
//!                                 └─ may unsubscribe itself/siblings mid-flight
//! ```
//!
//! ## State machine
//! ```text
//! Idle ──start()──► Starting ──► Started ──stop()──► Stopping ──► Stopped
//!                                   │                               │
//!                                   └────────── exit() ────────────►│
//!                                                                   ▼
//!                                                                Exiting
//! ```
//! `start()` on a started bus and `stop()` on a stopped bus are no-ops;
//! `exit()` is idempotent, performs the stop transition first when needed
//! (so termination publishes `stop` then `exit`), and wakes any
//! [`block`](Bus::block) caller.
//!
//! ## Rules
//! - `publish` is synchronous sequential on the publishing task: no internal
//!   pool, no cross-publisher ordering. Handlers must be fast or delegate.
//! - Handler failures are isolated per subscriber and reported via `tracing`
//!   (not re-published on `log`, to avoid recursion).
//! - A bus constructed with a sync role performs the cohort handshake inside
//!   `start()`, before the `start` event fires.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;

use crate::error::{SyncError, TaskError};
use crate::events::event::{channel, Event, LogLevel, Payload};
use crate::events::registry::{HandlerRef, Registry};
use crate::sync::{SyncGate, SyncWaiter};

/// Bus lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusState {
    /// Created, never started.
    Idle,
    /// `start` dispatch in progress.
    Starting,
    /// Running.
    Started,
    /// `stop` dispatch in progress.
    Stopping,
    /// Stopped; may be started again or exited.
    Stopped,
    /// Terminal; `block()` returns.
    Exiting,
}

/// Role a bus plays in the cohort start handshake.
enum SyncRole {
    /// Plain bus, no handshake.
    None,
    /// Parent: sleep the grace delay, then release every waiting child.
    Releasing { gate: Arc<SyncGate>, delay: Duration },
    /// Child: wait for the parent's release before starting.
    Awaiting { waiter: Arc<SyncWaiter> },
}

struct BusInner {
    registry: Registry,
    state: watch::Sender<BusState>,
    sync: SyncRole,
}

/// The pub/sub lifecycle state machine.
///
/// Cheap to clone (`Arc`-backed); all clones share state and subscribers.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    /// Creates a plain bus with no handshake role.
    pub fn new() -> Self {
        Self::with_role(SyncRole::None)
    }

    /// Creates a parent bus that releases `gate`'s waiters on `start()`,
    /// after sleeping `delay` to let children reach their wait point.
    pub fn synchronizing(gate: Arc<SyncGate>, delay: Duration) -> Self {
        Self::with_role(SyncRole::Releasing { gate, delay })
    }

    /// Creates a child bus that blocks in `start()` until its parent
    /// releases it.
    pub fn synchronized(waiter: Arc<SyncWaiter>) -> Self {
        Self::with_role(SyncRole::Awaiting { waiter })
    }

    fn with_role(sync: SyncRole) -> Self {
        let (state, _) = watch::channel(BusState::Idle);
        Self {
            inner: Arc::new(BusInner {
                registry: Registry::new(),
                state,
                sync,
            }),
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> BusState {
        *self.inner.state.borrow()
    }

    fn set_state(&self, next: BusState) {
        self.inner.state.send_replace(next);
    }

    /// Registers `handler` under `channel` with the given priority
    /// (lower runs first; ties keep subscription order).
    ///
    /// No uniqueness constraint — the same handler may be registered under
    /// multiple channels.
    pub fn subscribe(&self, channel: &str, handler: &HandlerRef, priority: u32) {
        self.inner.registry.subscribe(channel, handler, priority);
    }

    /// Removes `handler` from `channel`; idempotent, no-op when absent.
    ///
    /// Safe to call from within a running handler: the removed handler is
    /// skipped for the remainder of the in-flight dispatch.
    pub fn unsubscribe(&self, channel: &str, handler: &HandlerRef) {
        self.inner.registry.unsubscribe(channel, handler);
    }

    /// Invokes every subscriber of `channel` in ascending priority order,
    /// sequentially, on the calling task.
    ///
    /// Returns each handler's result in invocation order. A handler that
    /// fails or panics is caught and logged and does **not** abort dispatch
    /// to the remaining subscribers.
    pub async fn publish(&self, channel: &str, payload: Payload) -> Vec<Result<(), TaskError>> {
        self.dispatch(Event::new(channel, payload)).await
    }

    async fn dispatch(&self, event: Event) -> Vec<Result<(), TaskError>> {
        let channel = event.channel.as_str();
        let handlers = self.inner.registry.snapshot(channel);
        let mut results = Vec::with_capacity(handlers.len());

        for handler in handlers {
            // A handler earlier in this dispatch may have unsubscribed this one.
            if !self.inner.registry.contains(channel, &handler) {
                continue;
            }
            let fut = handler.on_event(self, &event);
            match std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(())) => results.push(Ok(())),
                Ok(Err(err)) => {
                    tracing::warn!(
                        channel,
                        label = err.as_label(),
                        error = %err,
                        "handler failed during dispatch"
                    );
                    results.push(Err(err));
                }
                Err(panic) => {
                    let info = panic_info(panic.as_ref());
                    tracing::warn!(channel, info = %info, "handler panicked during dispatch");
                    results.push(Err(TaskError::Panicked { info }));
                }
            }
        }
        results
    }

    /// Starts the bus: performs the handshake role (if any), transitions to
    /// `Starting`, publishes `start`, transitions to `Started`.
    ///
    /// No-op when already starting or started. A stopped bus may be started
    /// again.
    pub async fn start(&self) -> Result<(), SyncError> {
        if matches!(self.state(), BusState::Starting | BusState::Started) {
            return Ok(());
        }
        match &self.inner.sync {
            SyncRole::None => {}
            SyncRole::Releasing { gate, delay } => {
                tokio::time::sleep(*delay).await;
                self.log(LogLevel::Info, "releasing children").await;
                let released = gate.release_all().await;
                self.log(LogLevel::Debug, format!("released {released} children"))
                    .await;
            }
            SyncRole::Awaiting { waiter } => {
                self.log(LogLevel::Info, "syncing on main process").await;
                waiter.wait().await?;
            }
        }
        self.set_state(BusState::Starting);
        self.publish(channel::START, Payload::Empty).await;
        self.set_state(BusState::Started);
        Ok(())
    }

    /// Stops the bus: transitions to `Stopping`, publishes `stop`,
    /// transitions to `Stopped`. No-op unless currently started.
    pub async fn stop(&self) {
        if !matches!(self.state(), BusState::Starting | BusState::Started) {
            return;
        }
        self.set_state(BusState::Stopping);
        self.publish(channel::STOP, Payload::Empty).await;
        self.set_state(BusState::Stopped);
    }

    /// Exits the bus: stops it first when needed (publishing `stop`), then
    /// publishes `exit` and transitions to `Exiting`, waking any
    /// [`block`](Bus::block) caller. Idempotent.
    pub async fn exit(&self) {
        if self.state() == BusState::Exiting {
            return;
        }
        self.stop().await;
        self.publish(channel::EXIT, Payload::Empty).await;
        self.set_state(BusState::Exiting);
    }

    /// Parks the calling task until the bus exits, publishing the recurring
    /// `main` tick every `interval`.
    ///
    /// This is the process's main loop when no richer reactor is used; the
    /// `exit()` transition wakes it immediately.
    pub async fn block(&self, interval: Duration) {
        loop {
            if self.state() == BusState::Exiting {
                return;
            }
            self.publish(channel::MAIN, Payload::Empty).await;
            // A `main` subscriber may have exited the bus just now.
            if self.state() == BusState::Exiting {
                return;
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.exited() => return,
            }
        }
    }

    /// Resolves once the bus reaches `Exiting`.
    pub async fn exited(&self) {
        let mut rx = self.inner.state.subscribe();
        loop {
            if *rx.borrow_and_update() == BusState::Exiting {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Publishes a log record on the `log` channel.
    ///
    /// Consumers (e.g. the process's [`LogWriter`](crate::LogWriter))
    /// subscribe to it; nothing is written when no consumer is registered.
    pub async fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.dispatch(Event::log(level, message)).await;
    }
}

/// Extracts a printable message from a caught panic payload.
fn panic_info(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::events::registry::HandlerFn;

    fn recorder(trace: Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> HandlerRef {
        HandlerFn::arc(move |_bus, _ev| {
            let trace = trace.clone();
            async move {
                trace.lock().unwrap().push(tag);
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn dispatch_follows_ascending_priority() {
        let bus = Bus::new();
        let trace = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe("ev", &recorder(trace.clone(), "late"), 80);
        bus.subscribe("ev", &recorder(trace.clone(), "early"), 10);
        bus.subscribe("ev", &recorder(trace.clone(), "mid"), 50);

        bus.publish("ev", Payload::Empty).await;
        assert_eq!(*trace.lock().unwrap(), vec!["early", "mid", "late"]);
    }

    #[tokio::test]
    async fn equal_priority_keeps_subscription_order() {
        let bus = Bus::new();
        let trace = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe("ev", &recorder(trace.clone(), "first"), 50);
        bus.subscribe("ev", &recorder(trace.clone(), "second"), 50);
        bus.subscribe("ev", &recorder(trace.clone(), "third"), 50);

        bus.publish("ev", Payload::Empty).await;
        assert_eq!(*trace.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn failing_handler_does_not_abort_dispatch() {
        let bus = Bus::new();
        let trace = Arc::new(Mutex::new(Vec::new()));

        let failing: HandlerRef =
            HandlerFn::arc(|_bus, _ev| async { Err(TaskError::fail("boom")) });
        bus.subscribe("ev", &failing, 10);
        bus.subscribe("ev", &recorder(trace.clone(), "survivor"), 20);

        let results = bus.publish("ev", Payload::Empty).await;
        assert_eq!(results.len(), 2);
        assert!(results[0].is_err());
        assert!(results[1].is_ok());
        assert_eq!(*trace.lock().unwrap(), vec!["survivor"]);
    }

    #[tokio::test]
    async fn panicking_handler_is_caught_and_isolated() {
        let bus = Bus::new();
        let trace = Arc::new(Mutex::new(Vec::new()));

        let panicking: HandlerRef = HandlerFn::arc(|_bus, _ev| async {
            panic!("handler exploded");
        });
        bus.subscribe("ev", &panicking, 10);
        bus.subscribe("ev", &recorder(trace.clone(), "survivor"), 20);

        let results = bus.publish("ev", Payload::Empty).await;
        assert!(matches!(
            results[0],
            Err(TaskError::Panicked { ref info }) if info.contains("exploded")
        ));
        assert_eq!(*trace.lock().unwrap(), vec!["survivor"]);
    }

    #[tokio::test]
    async fn unsubscribe_mid_dispatch_skips_remaining_iteration() {
        let bus = Bus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let target: HandlerRef = {
            let hits = hits.clone();
            HandlerFn::arc(move |_bus, _ev| {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
        };
        let target_for_remover = target.clone();
        let remover: HandlerRef = HandlerFn::arc(move |bus, ev| {
            let target = target_for_remover.clone();
            async move {
                bus.unsubscribe(&ev.channel, &target);
                Ok(())
            }
        });

        // Remover runs first and removes the target before its turn.
        bus.subscribe("ev", &remover, 10);
        bus.subscribe("ev", &target, 20);

        bus.publish("ev", Payload::Empty).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        // Subsequent publishes are unaffected by the removed registration.
        bus.publish("ev", Payload::Empty).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unsubscribe_of_unregistered_handler_is_noop() {
        let bus = Bus::new();
        let stranger: HandlerRef = HandlerFn::arc(|_bus, _ev| async { Ok(()) });
        bus.unsubscribe("ev", &stranger);
        assert!(bus.publish("ev", Payload::Empty).await.is_empty());
    }

    #[tokio::test]
    async fn state_machine_walks_the_full_cycle() {
        let bus = Bus::new();
        assert_eq!(bus.state(), BusState::Idle);

        let states = Arc::new(Mutex::new(Vec::new()));
        let observer: HandlerRef = {
            let states = states.clone();
            HandlerFn::arc(move |bus, ev| {
                let states = states.clone();
                async move {
                    states.lock().unwrap().push((ev.channel.clone(), bus.state()));
                    Ok(())
                }
            })
        };
        bus.subscribe(channel::START, &observer, 50);
        bus.subscribe(channel::STOP, &observer, 50);
        bus.subscribe(channel::EXIT, &observer, 50);

        bus.start().await.unwrap();
        assert_eq!(bus.state(), BusState::Started);
        bus.exit().await;
        assert_eq!(bus.state(), BusState::Exiting);

        let seen = states.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                ("start".to_string(), BusState::Starting),
                ("stop".to_string(), BusState::Stopping),
                ("exit".to_string(), BusState::Stopped),
            ]
        );
    }

    #[tokio::test]
    async fn start_when_started_and_stop_when_stopped_are_noops() {
        let bus = Bus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter: HandlerRef = {
            let hits = hits.clone();
            HandlerFn::arc(move |_bus, _ev| {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
        };
        bus.subscribe(channel::START, &counter, 50);
        bus.subscribe(channel::STOP, &counter, 50);

        bus.start().await.unwrap();
        bus.start().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        bus.stop().await;
        bus.stop().await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(bus.state(), BusState::Stopped);
    }

    #[tokio::test]
    async fn exit_is_idempotent() {
        let bus = Bus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter: HandlerRef = {
            let hits = hits.clone();
            HandlerFn::arc(move |_bus, _ev| {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
        };
        bus.subscribe(channel::EXIT, &counter, 50);

        bus.start().await.unwrap();
        bus.exit().await;
        bus.exit().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn block_returns_when_a_tick_handler_exits_the_bus() {
        let bus = Bus::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let exiter: HandlerRef = {
            let ticks = ticks.clone();
            HandlerFn::arc(move |bus, _ev| {
                let ticks = ticks.clone();
                async move {
                    if ticks.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                        bus.exit().await;
                    }
                    Ok(())
                }
            })
        };
        bus.subscribe(channel::MAIN, &exiter, 50);

        bus.start().await.unwrap();
        bus.block(Duration::from_millis(100)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert_eq!(bus.state(), BusState::Exiting);
    }

    #[tokio::test]
    async fn log_publishes_a_record_on_the_log_channel() {
        let bus = Bus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink: HandlerRef = {
            let seen = seen.clone();
            HandlerFn::arc(move |_bus, ev| {
                let seen = seen.clone();
                async move {
                    if let Payload::Log(rec) = &ev.payload {
                        seen.lock().unwrap().push((rec.level, rec.message.clone()));
                    }
                    Ok(())
                }
            })
        };
        bus.subscribe(channel::LOG, &sink, 10);

        bus.log(LogLevel::Warn, "attention").await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(LogLevel::Warn, "attention".to_string())]
        );
    }

    #[test]
    fn panic_info_extracts_str_and_string_payloads() {
        let caught = std::panic::catch_unwind(|| panic!("plain")).unwrap_err();
        assert_eq!(panic_info(caught.as_ref()), "plain");

        let caught = std::panic::catch_unwind(|| panic!("formatted {}", 7)).unwrap_err();
        assert_eq!(panic_info(caught.as_ref()), "formatted 7");
    }
}
