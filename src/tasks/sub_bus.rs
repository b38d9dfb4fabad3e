//! # Sub-bus pattern: a task owning a nested, independently stoppable bus.
//!
//! A [`SubBusTask`] lets a coarse-grained subsystem manage its own member
//! tasks on a private nested [`Bus`] while the outer bus only sees one task:
//!
//! ```text
//! outer bus ── start/stop ──► SubBusTask ── start/stop/exit ──► nested bus
//!                                                │
//!                                     member TaskBindings
//! ```
//!
//! The outer `stop` is translated by nested state: a starting/started nested
//! bus gets `stop` published and `stop()` called; an already stopped one gets
//! `exit` published and `exit()` called, so repeated outer shutdown passes
//! walk the nested bus all the way down. Nested log records are forwarded to
//! the outer bus.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::TaskError;
use crate::events::{channel, Bus, BusState, Event, Handler, HandlerRef, LogLevel, Payload};
use crate::tasks::binding::TaskBinding;
use crate::tasks::task::{Task, TaskRef};

/// Forwards nested-bus log records onto the owning (outer) bus.
struct LogForward {
    outer: Bus,
}

#[async_trait]
impl Handler for LogForward {
    async fn on_event(&self, _bus: &Bus, event: &Event) -> Result<(), TaskError> {
        if let Payload::Log(rec) = &event.payload {
            self.outer.log(rec.level, rec.message.clone()).await;
        }
        Ok(())
    }
}

/// A task that owns a nested bus and manages member tasks on it.
pub struct SubBusTask {
    name: String,
    nested: Bus,
    members: Mutex<Vec<std::sync::Arc<TaskBinding>>>,
    forward: Mutex<Option<HandlerRef>>,
}

impl SubBusTask {
    /// Creates a sub-bus task with a fresh nested bus.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nested: Bus::new(),
            members: Mutex::new(Vec::new()),
            forward: Mutex::new(None),
        }
    }

    /// The nested bus member tasks live on.
    pub fn nested(&self) -> &Bus {
        &self.nested
    }

    /// Binds `task` onto the nested bus and returns its binding.
    pub async fn register_sub_task(&self, task: TaskRef) -> std::sync::Arc<TaskBinding> {
        self.nested
            .log(
                LogLevel::Debug,
                format!("{}: registering sub-task {}", self.name, task.name()),
            )
            .await;
        let binding = std::sync::Arc::new(TaskBinding::new(task));
        binding.subscribe(&self.nested).await;
        self.lock_members().push(binding.clone());
        binding
    }

    /// Unbinds a member task from the nested bus.
    pub async fn unregister_sub_task(&self, binding: &std::sync::Arc<TaskBinding>) {
        self.nested
            .log(
                LogLevel::Debug,
                format!(
                    "{}: unregistering sub-task {}",
                    self.name,
                    binding.task().name()
                ),
            )
            .await;
        binding.unsubscribe().await;
        self.lock_members()
            .retain(|member| !std::sync::Arc::ptr_eq(member, binding));
    }

    fn lock_members(
        &self,
    ) -> std::sync::MutexGuard<'_, Vec<std::sync::Arc<TaskBinding>>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn install_forward(&self, outer: &Bus) {
        let mut forward = self.forward.lock().unwrap_or_else(PoisonError::into_inner);
        if forward.is_none() {
            let handler: HandlerRef = std::sync::Arc::new(LogForward {
                outer: outer.clone(),
            });
            self.nested.subscribe(channel::LOG, &handler, 10);
            *forward = Some(handler);
        }
    }
}

#[async_trait]
impl Task for SubBusTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_start(&self, bus: &Bus) -> Result<(), TaskError> {
        self.install_forward(bus);
        self.nested
            .start()
            .await
            .map_err(|err| TaskError::fail(err.to_string()))
    }

    async fn on_stop(&self, _bus: &Bus) -> Result<(), TaskError> {
        match self.nested.state() {
            BusState::Starting | BusState::Started => {
                self.nested.publish(channel::STOP, Payload::Empty).await;
                self.nested.stop().await;
            }
            BusState::Stopped => {
                self.nested.publish(channel::EXIT, Payload::Empty).await;
                self.nested.exit().await;
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[derive(Default)]
    struct Member {
        started: AtomicUsize,
        stopped: AtomicUsize,
    }

    #[async_trait]
    impl Task for Member {
        fn name(&self) -> &str {
            "member"
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
    async fn members_follow_the_outer_lifecycle() {
        let outer = Bus::new();
        let group = Arc::new(SubBusTask::new("group"));
        let member = Arc::new(Member::default());
        group.register_sub_task(member.clone()).await;

        let binding = TaskBinding::new(group.clone());
        binding.subscribe(&outer).await;

        outer.start().await.unwrap();
        assert_eq!(member.started.load(Ordering::SeqCst), 1);
        assert_eq!(group.nested().state(), BusState::Started);

        outer.stop().await;
        assert!(member.stopped.load(Ordering::SeqCst) >= 1);
        assert_eq!(group.nested().state(), BusState::Stopped);
    }

    #[tokio::test]
    async fn second_outer_stop_exits_a_stopped_nested_bus() {
        let outer = Bus::new();
        let group = Arc::new(SubBusTask::new("group"));
        let binding = TaskBinding::new(group.clone());
        binding.subscribe(&outer).await;

        outer.start().await.unwrap();
        outer.stop().await;
        assert_eq!(group.nested().state(), BusState::Stopped);

        // Restart and stop the outer bus again: the nested bus, found
        // stopped, is walked down to exit.
        outer.start().await.unwrap();
        // Nested restarted with the outer bus.
        assert_eq!(group.nested().state(), BusState::Started);
        outer.stop().await;
        assert_eq!(group.nested().state(), BusState::Stopped);

        outer.publish(channel::STOP, Payload::Empty).await;
        assert_eq!(group.nested().state(), BusState::Exiting);
    }

    #[tokio::test]
    async fn nested_logs_are_forwarded_to_the_outer_bus() {
        use crate::events::HandlerFn;

        let outer = Bus::new();
        let group = Arc::new(SubBusTask::new("group"));
        let binding = TaskBinding::new(group.clone());
        binding.subscribe(&outer).await;

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink: HandlerRef = {
            let seen = seen.clone();
            HandlerFn::arc(move |_bus, ev| {
                let seen = seen.clone();
                async move {
                    if let Payload::Log(rec) = &ev.payload {
                        seen.lock().unwrap().push(rec.message.clone());
                    }
                    Ok(())
                }
            })
        };
        outer.subscribe(channel::LOG, &sink, 10);

        outer.start().await.unwrap();
        group.nested().log(LogLevel::Info, "from the nest").await;
        assert!(seen
            .lock()
            .unwrap()
            .iter()
            .any(|m| m == "from the nest"));
    }
}
