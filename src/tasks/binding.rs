//! # Task-to-bus binding.
//!
//! A [`TaskBinding`] connects a [`Task`]'s lifecycle hooks to a concrete
//! [`Bus`]: `subscribe` registers the three hooks on `start`/`stop`/`reset`
//! at the task's declared priorities, `unsubscribe` reverses it. Both are
//! idempotent, and a binding may be re-subscribed to a *different* bus after
//! unsubscribing — the sub-bus pattern relies on this.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::TaskError;
use crate::events::{channel, Bus, Event, Handler, HandlerRef, LogLevel};
use crate::tasks::task::TaskRef;

/// Which lifecycle hook an adapter dispatches to.
#[derive(Clone, Copy)]
enum Hook {
    Start,
    Stop,
    Reset,
}

/// Adapter registered on the bus for one lifecycle hook of one task.
struct LifecycleHook {
    task: TaskRef,
    hook: Hook,
}

#[async_trait]
impl Handler for LifecycleHook {
    async fn on_event(&self, bus: &Bus, _event: &Event) -> Result<(), TaskError> {
        match self.hook {
            Hook::Start => self.task.on_start(bus).await,
            Hook::Stop => self.task.on_stop(bus).await,
            Hook::Reset => self.task.on_reset(bus).await,
        }
    }
}

/// Registrations held while a binding is subscribed.
struct Bound {
    bus: Bus,
    hooks: Vec<(&'static str, HandlerRef)>,
}

/// Binds a task's lifecycle hooks to a bus; constructed detached.
pub struct TaskBinding {
    task: TaskRef,
    bound: Mutex<Option<Bound>>,
}

impl TaskBinding {
    /// Creates a detached binding (not yet subscribed to any bus).
    pub fn new(task: TaskRef) -> Self {
        Self {
            task,
            bound: Mutex::new(None),
        }
    }

    /// The bound task.
    pub fn task(&self) -> &TaskRef {
        &self.task
    }

    /// True when currently subscribed to a bus.
    pub fn is_subscribed(&self) -> bool {
        self.lock().is_some()
    }

    /// Registers the task's lifecycle hooks on `bus`.
    ///
    /// Idempotent: a second call while bound is a no-op (even against a
    /// different bus). Unsubscribe first to move a task between buses.
    pub async fn subscribe(&self, bus: &Bus) {
        {
            let mut bound = self.lock();
            if bound.is_some() {
                return;
            }

            let hooks: Vec<(&'static str, HandlerRef, u32)> = vec![
                (
                    channel::START,
                    std::sync::Arc::new(LifecycleHook {
                        task: self.task.clone(),
                        hook: Hook::Start,
                    }) as HandlerRef,
                    self.task.start_priority(),
                ),
                (
                    channel::STOP,
                    std::sync::Arc::new(LifecycleHook {
                        task: self.task.clone(),
                        hook: Hook::Stop,
                    }) as HandlerRef,
                    self.task.stop_priority(),
                ),
                (
                    channel::RESET,
                    std::sync::Arc::new(LifecycleHook {
                        task: self.task.clone(),
                        hook: Hook::Reset,
                    }) as HandlerRef,
                    self.task.reset_priority(),
                ),
            ];

            let mut kept = Vec::with_capacity(hooks.len());
            for (name, handler, priority) in hooks {
                bus.subscribe(name, &handler, priority);
                kept.push((name, handler));
            }
            *bound = Some(Bound {
                bus: bus.clone(),
                hooks: kept,
            });
        }
        bus.log(
            LogLevel::Debug,
            format!("subscribed task: {}", self.task.name()),
        )
        .await;
    }

    /// Removes the task's hooks from its bus; idempotent.
    pub async fn unsubscribe(&self) {
        let released = {
            let mut bound = self.lock();
            bound.take()
        };
        let Some(released) = released else {
            return;
        };
        for (name, handler) in &released.hooks {
            released.bus.unsubscribe(name, handler);
        }
        released
            .bus
            .log(
                LogLevel::Debug,
                format!("unsubscribed task: {}", self.task.name()),
            )
            .await;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Bound>> {
        self.bound.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::events::Payload;
    use crate::tasks::task::Task;

    #[derive(Default)]
    struct Probe {
        started: AtomicUsize,
        stopped: AtomicUsize,
    }

    #[async_trait]
    impl Task for Probe {
        fn name(&self) -> &str {
            "probe"
        }

        async fn on_start(&self, _bus: &Bus) -> Result<(), TaskError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_stop(&self, _bus: &Bus) -> Result<(), TaskError> {
            self.stopped.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn hooks_fire_on_lifecycle_events() {
        let bus = Bus::new();
        let probe = Arc::new(Probe::default());
        let binding = TaskBinding::new(probe.clone());

        binding.subscribe(&bus).await;
        bus.start().await.unwrap();
        bus.stop().await;

        assert_eq!(probe.started.load(Ordering::SeqCst), 1);
        assert_eq!(probe.stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscribe_twice_registers_hooks_once() {
        let bus = Bus::new();
        let probe = Arc::new(Probe::default());
        let binding = TaskBinding::new(probe.clone());

        binding.subscribe(&bus).await;
        binding.subscribe(&bus).await;
        bus.start().await.unwrap();

        assert_eq!(probe.started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_tolerated_without_start() {
        let bus = Bus::new();
        let probe = Arc::new(Probe::default());
        let binding = TaskBinding::new(probe.clone());
        binding.subscribe(&bus).await;

        // Drive `stop` dispatch without ever starting the bus.
        bus.publish(channel::STOP, Payload::Empty).await;
        assert_eq!(probe.started.load(Ordering::SeqCst), 0);
        assert_eq!(probe.stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsubscribed_task_no_longer_fires_and_can_rebind() {
        let first = Bus::new();
        let second = Bus::new();
        let probe = Arc::new(Probe::default());
        let binding = TaskBinding::new(probe.clone());

        binding.subscribe(&first).await;
        binding.unsubscribe().await;
        binding.unsubscribe().await; // idempotent
        first.start().await.unwrap();
        assert_eq!(probe.started.load(Ordering::SeqCst), 0);

        // Re-subscription to a different bus is supported.
        binding.subscribe(&second).await;
        second.start().await.unwrap();
        assert_eq!(probe.started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_priorities_order_teardown_in_reverse() {
        struct Ordered {
            name: &'static str,
            start_p: u32,
            stop_p: u32,
            trace: Arc<std::sync::Mutex<Vec<&'static str>>>,
        }

        #[async_trait]
        impl Task for Ordered {
            fn name(&self) -> &str {
                self.name
            }
            fn start_priority(&self) -> u32 {
                self.start_p
            }
            fn stop_priority(&self) -> u32 {
                self.stop_p
            }
            async fn on_start(&self, _bus: &Bus) -> Result<(), TaskError> {
                self.trace.lock().unwrap().push(self.name);
                Ok(())
            }
            async fn on_stop(&self, _bus: &Bus) -> Result<(), TaskError> {
                self.trace.lock().unwrap().push(self.name);
                Ok(())
            }
        }

        let bus = Bus::new();
        let trace = Arc::new(std::sync::Mutex::new(Vec::new()));
        // Infra starts first (low start), stops last (high stop).
        let infra = TaskBinding::new(Arc::new(Ordered {
            name: "infra",
            start_p: 10,
            stop_p: 90,
            trace: trace.clone(),
        }));
        let app = TaskBinding::new(Arc::new(Ordered {
            name: "app",
            start_p: 60,
            stop_p: 40,
            trace: trace.clone(),
        }));
        infra.subscribe(&bus).await;
        app.subscribe(&bus).await;

        bus.start().await.unwrap();
        bus.stop().await;
        assert_eq!(*trace.lock().unwrap(), vec!["infra", "app", "app", "infra"]);
    }
}
