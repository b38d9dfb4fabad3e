//! # Process: one OS process, one bus, some tasks.
//!
//! A [`Process`] wraps exactly one [`Bus`], wires OS termination signals into
//! `bus.exit()`, registers tasks, and blocks the calling task on a run loop.
//!
//! ## Run loops
//! - [`run`](Process::run) — the plain loop: `bus.start()` then
//!   `bus.block(interval)`, which publishes the recurring `main` tick.
//! - [`run_until`](Process::run_until) — the reactor variant: a spawned
//!   ticker keeps `main` subscribers serviced while an external driver future
//!   blocks; when the driver returns (or the bus exits), `bus.exit()` runs.
//!
//! Every variant performs exactly one `start`/`stop`/`exit` cycle per
//! execution, whichever loop backs it.
//!
//! ## Cohort variants
//! - [`Process::synchronizing`] — the parent: its bus sleeps the grace delay
//!   and releases the gate on start, and a [`ChildWatch`] subscribed to
//!   `main` exits the bus once no tracked child is alive (fan-in).
//! - [`Process::synchronized`] — a child: its bus parks in `start()` until
//!   the parent releases the cohort (fan-out).

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{ProcessError, TaskError};
use crate::events::{channel, Bus, Event, Handler, HandlerRef, LogLevel, Payload};
use crate::process::child::ChildHandle;
use crate::process::shutdown;
use crate::subscribers::LogWriter;
use crate::sync::{SyncGate, SyncWaiter};
use crate::tasks::{TaskBinding, TaskRef, DEFAULT_PRIORITY};

/// Tracked OS children, shared between the process and its fan-in watcher.
type ChildSet = Arc<tokio::sync::Mutex<Vec<Arc<dyn ChildHandle>>>>;

/// One OS process owning exactly one bus and its registered tasks.
pub struct Process {
    cfg: Config,
    bus: Bus,
    bindings: Mutex<Vec<Arc<TaskBinding>>>,
    children: ChildSet,
}

impl Process {
    /// Creates a plain process with its own bus.
    pub fn new(cfg: Config) -> Self {
        Self::with_bus(cfg, Bus::new())
    }

    /// Creates the cohort parent: releases `gate` on start and exits once no
    /// tracked child remains alive.
    pub fn synchronizing(cfg: Config, gate: Arc<SyncGate>) -> Self {
        let bus = Bus::synchronizing(gate, cfg.sync_delay);
        let process = Self::with_bus(cfg, bus);
        ChildWatch::install(&process.bus, process.children.clone());
        process
    }

    /// Creates a cohort child: its bus waits for the parent's release
    /// before starting.
    pub fn synchronized(cfg: Config, waiter: Arc<SyncWaiter>) -> Self {
        let bus = Bus::synchronized(waiter);
        Self::with_bus(cfg, bus)
    }

    fn with_bus(cfg: Config, bus: Bus) -> Self {
        let writer: HandlerRef = Arc::new(LogWriter::default());
        bus.subscribe(channel::LOG, &writer, 10);
        Self {
            cfg,
            bus,
            bindings: Mutex::new(Vec::new()),
            children: Arc::new(tokio::sync::Mutex::new(Vec::new())),
        }
    }

    /// The process's bus.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// The process's configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Subscribes `task` to the process bus; returns its binding.
    pub async fn register_task(&self, task: TaskRef) -> Arc<TaskBinding> {
        self.bus
            .log(
                LogLevel::Info,
                format!("registering task: {}", task.name()),
            )
            .await;
        let binding = Arc::new(TaskBinding::new(task));
        binding.subscribe(&self.bus).await;
        self.lock_bindings().push(binding.clone());
        binding
    }

    /// Unsubscribes a previously registered task.
    pub async fn unregister_task(&self, binding: &Arc<TaskBinding>) {
        self.bus
            .log(
                LogLevel::Info,
                format!("unregistering task: {}", binding.task().name()),
            )
            .await;
        binding.unsubscribe().await;
        self.lock_bindings()
            .retain(|kept| !Arc::ptr_eq(kept, binding));
    }

    /// Adds an OS child to the tracked set (fan-in watches this list).
    pub async fn track_child(&self, handle: Arc<dyn ChildHandle>) {
        self.children.lock().await.push(handle);
    }

    /// Starts the bus and blocks on the plain run loop until exit.
    ///
    /// Termination signals invoke `bus.exit()`, which wakes the loop.
    pub async fn run(&self) -> Result<(), ProcessError> {
        self.bus
            .log(
                LogLevel::Info,
                format!("process pid: {}", std::process::id()),
            )
            .await;
        let _signal_guard = self.spawn_signal_watch().drop_guard();
        self.bus.start().await?;
        self.bus.block(self.cfg.interval).await;
        Ok(())
    }

    /// Starts the bus, then blocks on an external `driver` future instead of
    /// the plain loop; a spawned ticker keeps publishing `main` meanwhile.
    ///
    /// When the driver returns — or the bus exits first — the lifecycle is
    /// wound down with `bus.exit()`.
    pub async fn run_until<F>(&self, driver: F) -> Result<(), ProcessError>
    where
        F: Future<Output = ()> + Send,
    {
        self.bus
            .log(
                LogLevel::Info,
                format!("process pid: {}", std::process::id()),
            )
            .await;
        let _signal_guard = self.spawn_signal_watch().drop_guard();

        let ticker_stop = CancellationToken::new();
        let ticker = {
            let bus = self.bus.clone();
            let interval = self.cfg.interval;
            let stop = ticker_stop.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = stop.cancelled() => return,
                        _ = tokio::time::sleep(interval) => {
                            bus.publish(channel::MAIN, Payload::Empty).await;
                        }
                    }
                }
            })
        };

        self.bus.start().await?;
        tokio::select! {
            () = driver => {}
            () = self.bus.exited() => {}
        }
        ticker_stop.cancel();
        let _ = ticker.await;
        self.bus.exit().await;
        Ok(())
    }

    /// Spawns the OS-signal watcher; cancel the returned token to wind it
    /// down once its run loop is over.
    fn spawn_signal_watch(&self) -> CancellationToken {
        let stop = CancellationToken::new();
        tokio::spawn(signal_watch(self.bus.clone(), stop.clone()));
        stop
    }

    fn lock_bindings(&self) -> std::sync::MutexGuard<'_, Vec<Arc<TaskBinding>>> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exits `bus` on a termination signal, unless `stop` is cancelled first
/// (the run loop finished on its own).
async fn signal_watch(bus: Bus, stop: CancellationToken) {
    tokio::select! {
        () = stop.cancelled() => {}
        outcome = shutdown::wait_for_termination() => {
            if outcome.is_ok() {
                bus.log(LogLevel::Info, "termination signal, shutting down bus")
                    .await;
                bus.exit().await;
            }
        }
    }
}

/// Fan-in detection: a `main`-tick subscriber that exits the parent bus once
/// no tracked child process is alive.
///
/// The check is a liveness poll, naturally rate-limited to the run loop's
/// tick interval. On success it unsubscribes itself before exiting.
struct ChildWatch {
    children: ChildSet,
    me: Mutex<Option<HandlerRef>>,
}

impl ChildWatch {
    fn install(bus: &Bus, children: ChildSet) {
        let watch = Arc::new(ChildWatch {
            children,
            me: Mutex::new(None),
        });
        let handler: HandlerRef = watch.clone();
        *watch.me.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler.clone());
        bus.subscribe(channel::MAIN, &handler, DEFAULT_PRIORITY);
    }

    async fn any_alive(&self) -> bool {
        let children = self.children.lock().await;
        for child in children.iter() {
            if child.is_alive().await {
                return true;
            }
        }
        false
    }
}

#[async_trait]
impl Handler for ChildWatch {
    async fn on_event(&self, bus: &Bus, _event: &Event) -> Result<(), TaskError> {
        if self.any_alive().await {
            return Ok(());
        }
        bus.log(
            LogLevel::Info,
            "no more children still running, exiting main process",
        )
        .await;
        let me = self
            .me
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(me) = me {
            bus.unsubscribe(channel::MAIN, &me);
        }
        bus.exit().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::events::BusState;
    use crate::tasks::Task;

    struct FakeChild {
        alive: AtomicBool,
    }

    #[async_trait]
    impl ChildHandle for FakeChild {
        fn pid(&self) -> Option<u32> {
            Some(4242)
        }
        async fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }
        async fn terminate(&self) -> io::Result<()> {
            self.alive.store(false, Ordering::SeqCst);
            Ok(())
        }
        async fn join(&self) -> io::Result<()> {
            Ok(())
        }
    }

    struct ExitAfter {
        limit: usize,
    }

    #[async_trait]
    impl Task for ExitAfter {
        fn name(&self) -> &str {
            "exit-after"
        }

        async fn on_start(&self, bus: &Bus) -> Result<(), TaskError> {
            struct Tick {
                ticks: AtomicUsize,
                limit: usize,
            }
            #[async_trait]
            impl Handler for Tick {
                async fn on_event(&self, bus: &Bus, _ev: &Event) -> Result<(), TaskError> {
                    if self.ticks.fetch_add(1, Ordering::SeqCst) + 1 >= self.limit {
                        bus.exit().await;
                    }
                    Ok(())
                }
            }
            let tick: HandlerRef = Arc::new(Tick {
                ticks: AtomicUsize::new(0),
                limit: self.limit,
            });
            bus.subscribe(channel::MAIN, &tick, DEFAULT_PRIORITY);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_completes_when_a_task_exits_the_bus() {
        let process = Process::new(Config {
            interval: Duration::from_millis(20),
            ..Config::default()
        });
        process
            .register_task(Arc::new(ExitAfter { limit: 3 }))
            .await;

        process.run().await.unwrap();
        assert_eq!(process.bus().state(), BusState::Exiting);
    }

    #[tokio::test(start_paused = true)]
    async fn synchronizing_process_exits_when_children_are_gone() {
        let gate = SyncGate::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let process = Process::synchronizing(
            Config {
                interval: Duration::from_millis(20),
                sync_delay: Duration::from_millis(10),
                ..Config::default()
            },
            gate,
        );
        process
            .track_child(Arc::new(FakeChild {
                alive: AtomicBool::new(false),
            }))
            .await;

        // First tick observes no live child and exits the bus.
        process.run().await.unwrap();
        assert_eq!(process.bus().state(), BusState::Exiting);
    }

    #[tokio::test]
    async fn signal_watch_winds_down_when_its_token_is_cancelled() {
        let bus = Bus::new();
        let stop = CancellationToken::new();
        let watcher = tokio::spawn(signal_watch(bus.clone(), stop.clone()));

        stop.cancel();
        tokio::time::timeout(Duration::from_secs(1), watcher)
            .await
            .unwrap()
            .unwrap();
        // Winding down is not a termination signal.
        assert_eq!(bus.state(), BusState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn run_until_exits_the_bus_after_the_driver_returns() {
        let process = Process::new(Config {
            interval: Duration::from_millis(20),
            ..Config::default()
        });
        process
            .run_until(async {
                tokio::time::sleep(Duration::from_millis(100)).await;
            })
            .await
            .unwrap();
        assert_eq!(process.bus().state(), BusState::Exiting);
    }
}
