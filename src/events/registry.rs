//! # Subscriber registry: priority-ordered handler lists per channel.
//!
//! The registry maps channel names to ordered handler registrations. Dispatch
//! (in [`Bus::publish`](crate::Bus::publish)) snapshots a channel's list and
//! re-checks membership before each invocation, so a handler may unsubscribe
//! itself or a sibling mid-dispatch without corrupting the in-flight
//! iteration — removed handlers are skipped for the remainder of that publish.
//!
//! ## Rules
//! - Ascending priority order; ties broken by subscription order (a monotonic
//!   counter stamped at subscribe time).
//! - No uniqueness constraint: the same handler may be registered under
//!   multiple channels, or multiple times under one.
//! - Removal is identity-based (`Arc::ptr_eq`) and idempotent.
//! - The interior lock is never held across an `.await`; subscribe and
//!   unsubscribe are therefore plain synchronous calls, safe from inside a
//!   running handler.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::TaskError;
use crate::events::bus::Bus;
use crate::events::event::Event;

/// # A bus subscriber callback.
///
/// Handlers are invoked sequentially on the publishing task, in ascending
/// priority order. An `Err` (or a panic) is caught and logged by the bus and
/// does not abort dispatch to the remaining subscribers.
///
/// The current [`Bus`] is passed in so a handler can publish, log, subscribe,
/// or unsubscribe (including itself) from within dispatch.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Processes one event.
    async fn on_event(&self, bus: &Bus, event: &Event) -> Result<(), TaskError>;
}

/// Shared handle to a handler; identity under this `Arc` is what
/// [`Bus::unsubscribe`](crate::Bus::unsubscribe) matches on.
pub type HandlerRef = std::sync::Arc<dyn Handler>;

/// Function-backed handler.
///
/// Wraps a closure that creates a fresh future per event. The closure receives
/// owned clones of the bus and event, which keeps the borrows simple.
///
/// ## Example
/// ```rust
/// use cohort::{HandlerFn, HandlerRef, TaskError};
///
/// let h: HandlerRef = HandlerFn::arc(|_bus, ev| async move {
///     println!("saw {} (seq {})", ev.channel, ev.seq);
///     Ok::<_, TaskError>(())
/// });
/// ```
pub struct HandlerFn<F> {
    f: F,
}

impl<F> HandlerFn<F> {
    /// Creates a new function-backed handler.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> HandlerFn<F>
where
    F: Fn(Bus, Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    /// Creates the handler and returns it as a shared [`HandlerRef`].
    ///
    /// Erasing the type here lets the closure's parameter types be inferred
    /// from the handler signature at the call site.
    pub fn arc(f: F) -> HandlerRef {
        std::sync::Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Bus, Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    async fn on_event(&self, bus: &Bus, event: &Event) -> Result<(), TaskError> {
        (self.f)(bus.clone(), event.clone()).await
    }
}

/// One registration under a channel.
struct Registration {
    priority: u32,
    order: u64,
    handler: HandlerRef,
}

/// Priority-ordered handler lists, keyed by channel name.
pub(crate) struct Registry {
    channels: Mutex<HashMap<String, Vec<Registration>>>,
    next_order: AtomicU64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            next_order: AtomicU64::new(0),
        }
    }

    /// Registers `handler` under `channel`; list stays sorted by
    /// (priority, subscription order).
    pub(crate) fn subscribe(&self, channel: &str, handler: &HandlerRef, priority: u32) {
        let order = self.next_order.fetch_add(1, AtomicOrdering::Relaxed);
        let mut channels = self.lock();
        let list = channels.entry(channel.to_owned()).or_default();
        list.push(Registration {
            priority,
            order,
            handler: handler.clone(),
        });
        list.sort_by_key(|r| (r.priority, r.order));
    }

    /// Removes every registration of `handler` under `channel`; no-op when absent.
    pub(crate) fn unsubscribe(&self, channel: &str, handler: &HandlerRef) {
        let mut channels = self.lock();
        if let Some(list) = channels.get_mut(channel) {
            list.retain(|r| !std::sync::Arc::ptr_eq(&r.handler, handler));
            if list.is_empty() {
                channels.remove(channel);
            }
        }
    }

    /// Returns the channel's handlers in dispatch order.
    pub(crate) fn snapshot(&self, channel: &str) -> Vec<HandlerRef> {
        self.lock()
            .get(channel)
            .map(|list| list.iter().map(|r| r.handler.clone()).collect())
            .unwrap_or_default()
    }

    /// True if `handler` is still registered under `channel`.
    pub(crate) fn contains(&self, channel: &str, handler: &HandlerRef) -> bool {
        self.lock()
            .get(channel)
            .map(|list| {
                list.iter()
                    .any(|r| std::sync::Arc::ptr_eq(&r.handler, handler))
            })
            .unwrap_or(false)
    }

    /// Locks the channel map, recovering from poisoning.
    ///
    /// Handler panics are caught outside this lock, so a poisoned state can
    /// only mean a panic in the registry itself; the map is still coherent.
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Registration>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
