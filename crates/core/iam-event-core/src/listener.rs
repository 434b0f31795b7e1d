//! Listener registration and ordered dispatch.

use crate::error::{EventError, EventResult, HandlerError};
use crate::event::Event;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// A handler bound to one event name.
///
/// Listeners may be invoked concurrently by different publishers and must
/// be safe for that. Within a single publish call they run one after another
/// in ascending priority order.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Lower values run first. Ties run in registration order.
    fn priority(&self) -> i32 {
        0
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError>;
}

/// Handle returned at registration, used to remove a listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

struct Registration {
    id: ListenerId,
    priority: i32,
    listener: Arc<dyn Listener>,
}

/// Listener table shared by the bus and its workers.
///
/// The mutex is held only while the table is read or changed, never while
/// a handler runs.
#[derive(Default)]
pub(crate) struct ListenerTable {
    listeners: Mutex<HashMap<String, Vec<Registration>>>,
    next_id: AtomicU64,
}

impl ListenerTable {
    pub(crate) fn insert(&self, name: &str, listener: Arc<dyn Listener>) -> EventResult<ListenerId> {
        if name.is_empty() {
            warn!("Rejected listener registration without an event name");
            return Err(EventError::EmptyEventName);
        }

        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let priority = listener.priority();

        let mut table = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let bound = table.entry(name.to_string()).or_default();
        // Ids grow monotonically, so inserting after every entry with an
        // equal or lower priority keeps ties in registration order.
        let position = bound.partition_point(|r| r.priority <= priority);
        bound.insert(
            position,
            Registration {
                id,
                priority,
                listener,
            },
        );

        debug!("Registered {} for event '{}' (priority {})", id, name, priority);
        Ok(id)
    }

    pub(crate) fn remove(&self, name: &str, id: ListenerId) -> bool {
        let mut table = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(bound) = table.get_mut(name) else {
            return false;
        };

        let before = bound.len();
        bound.retain(|r| r.id != id);
        let removed = bound.len() != before;
        if bound.is_empty() {
            table.remove(name);
        }
        removed
    }

    pub(crate) fn count(&self, name: &str) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map_or(0, Vec::len)
    }

    fn snapshot(&self, name: &str) -> Vec<Arc<dyn Listener>> {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|bound| bound.iter().map(|r| Arc::clone(&r.listener)).collect())
            .unwrap_or_default()
    }

    /// Invoke every listener bound to the event's name, in order, stopping
    /// at the first failure.
    pub(crate) async fn dispatch(&self, event: &Event) -> EventResult<()> {
        let listeners = self.snapshot(event.name());
        for listener in listeners {
            listener
                .handle(event)
                .await
                .map_err(|source| EventError::Listener {
                    event: event.name().to_string(),
                    source,
                })?;
        }
        Ok(())
    }
}
