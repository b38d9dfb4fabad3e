//! # Supervisor: force-terminate and reap tracked children on shutdown.
//!
//! The [`Supervisor`] is a [`Task`]: register it with a process and hand it
//! every spawned child via [`supervise`](Supervisor::supervise). When the bus
//! stops, it walks the tracked handles — terminating the ones still alive,
//! reaping all of them — and clears the list.
//!
//! ## Rules
//! - A handle that is already dead skips termination but is still reaped.
//! - A failed terminate or reap is logged and the walk continues; no error
//!   escapes `on_stop` (mirrors the bus's own failure isolation).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::TaskError;
use crate::events::{Bus, LogLevel};
use crate::process::ChildHandle;
use crate::tasks::Task;

/// Tracks child-process handles and kills/reaps them during shutdown.
#[derive(Default)]
pub struct Supervisor {
    supervised: Mutex<Vec<Arc<dyn ChildHandle>>>,
}

impl Supervisor {
    /// Creates a supervisor with an empty tracked list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a child handle to the tracked list.
    pub async fn supervise(&self, handle: Arc<dyn ChildHandle>) {
        self.supervised.lock().await.push(handle);
    }

    /// Number of currently tracked handles.
    pub async fn supervised_count(&self) -> usize {
        self.supervised.lock().await.len()
    }
}

#[async_trait]
impl Task for Supervisor {
    fn name(&self) -> &str {
        "supervisor"
    }

    /// Stops late so supervised infrastructure outlives its dependents.
    fn stop_priority(&self) -> u32 {
        80
    }

    async fn on_stop(&self, bus: &Bus) -> Result<(), TaskError> {
        let mut tracked = self.supervised.lock().await;
        for child in tracked.drain(..) {
            let pid = child.pid().unwrap_or(0);
            bus.log(LogLevel::Info, format!("killing child {pid}")).await;
            if child.is_alive().await {
                if let Err(err) = child.terminate().await {
                    bus.log(
                        LogLevel::Warn,
                        format!("failed to terminate child {pid}: {err}"),
                    )
                    .await;
                }
            }
            if let Err(err) = child.join().await {
                bus.log(
                    LogLevel::Warn,
                    format!("failed to reap child {pid}: {err}"),
                )
                .await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;
    use crate::tasks::TaskBinding;

    struct FakeChild {
        pid: u32,
        alive: AtomicBool,
        terminated: AtomicUsize,
        joined: AtomicUsize,
        fail_terminate: bool,
    }

    impl FakeChild {
        fn alive(pid: u32) -> Arc<Self> {
            Arc::new(Self {
                pid,
                alive: AtomicBool::new(true),
                terminated: AtomicUsize::new(0),
                joined: AtomicUsize::new(0),
                fail_terminate: false,
            })
        }

        fn dead(pid: u32) -> Arc<Self> {
            Arc::new(Self {
                pid,
                alive: AtomicBool::new(false),
                terminated: AtomicUsize::new(0),
                joined: AtomicUsize::new(0),
                fail_terminate: false,
            })
        }

        fn stubborn(pid: u32) -> Arc<Self> {
            Arc::new(Self {
                pid,
                alive: AtomicBool::new(true),
                terminated: AtomicUsize::new(0),
                joined: AtomicUsize::new(0),
                fail_terminate: true,
            })
        }
    }

    #[async_trait]
    impl ChildHandle for FakeChild {
        fn pid(&self) -> Option<u32> {
            Some(self.pid)
        }
        async fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }
        async fn terminate(&self) -> io::Result<()> {
            self.terminated.fetch_add(1, Ordering::SeqCst);
            if self.fail_terminate {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "eperm"));
            }
            self.alive.store(false, Ordering::SeqCst);
            Ok(())
        }
        async fn join(&self) -> io::Result<()> {
            self.joined.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn stop_terminates_live_reaps_dead_and_clears_the_list() {
        let bus = Bus::new();
        let supervisor = Arc::new(Supervisor::new());
        let live = FakeChild::alive(100);
        let dead = FakeChild::dead(200);
        supervisor.supervise(live.clone()).await;
        supervisor.supervise(dead.clone()).await;

        let binding = TaskBinding::new(supervisor.clone());
        binding.subscribe(&bus).await;
        bus.start().await.unwrap();
        bus.stop().await;

        // Live child: terminated and reaped.
        assert_eq!(live.terminated.load(Ordering::SeqCst), 1);
        assert_eq!(live.joined.load(Ordering::SeqCst), 1);
        // Dead child: termination skipped, reap still attempted.
        assert_eq!(dead.terminated.load(Ordering::SeqCst), 0);
        assert_eq!(dead.joined.load(Ordering::SeqCst), 1);
        assert_eq!(supervisor.supervised_count().await, 0);
    }

    #[tokio::test]
    async fn failed_termination_does_not_stop_the_walk() {
        let bus = Bus::new();
        let supervisor = Arc::new(Supervisor::new());
        let stubborn = FakeChild::stubborn(300);
        let next = FakeChild::alive(400);
        supervisor.supervise(stubborn.clone()).await;
        supervisor.supervise(next.clone()).await;

        let binding = TaskBinding::new(supervisor.clone());
        binding.subscribe(&bus).await;
        bus.start().await.unwrap();

        // Stop must not propagate the EPERM out of the handler.
        let results = bus.publish(crate::events::channel::STOP, crate::events::Payload::Empty).await;
        assert!(results.iter().all(|r| r.is_ok()));

        assert_eq!(stubborn.joined.load(Ordering::SeqCst), 1);
        assert_eq!(next.terminated.load(Ordering::SeqCst), 1);
        assert_eq!(next.joined.load(Ordering::SeqCst), 1);
        assert_eq!(supervisor.supervised_count().await, 0);
    }
}
