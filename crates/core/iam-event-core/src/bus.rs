//! The event bus: ordered synchronous delivery plus a lazily started,
//! bounded asynchronous worker pool.

use crate::error::{EventError, EventResult};
use crate::event::{DomainEvent, Event};
use crate::listener::{Listener, ListenerId, ListenerTable};
use bon::Builder;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const DEFAULT_WORKER_POOL_SIZE: usize = 10;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Builder)]
pub struct EventBusConfig {
    /// Number of consumer workers started on the first async publish.
    #[builder(default = DEFAULT_WORKER_POOL_SIZE)]
    pub worker_pool_size: usize,
    /// Capacity of the bounded queue between publishers and workers.
    #[builder(default = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Lifecycle of a bus instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusState {
    /// Accepting events, no workers yet.
    Active,
    /// Worker pool running.
    Consuming,
    /// No new async events accepted; workers drain what is queued.
    Closing,
    /// Every worker has exited.
    Drained,
}

impl BusState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => BusState::Active,
            1 => BusState::Consuming,
            2 => BusState::Closing,
            _ => BusState::Drained,
        }
    }
}

/// Counters for the asynchronous path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    pub published: u64,
    pub delivered: u64,
    pub failed: u64,
    pub panicked: u64,
}

#[derive(Default)]
struct PoolShared {
    state: AtomicU8,
    published: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    first_error: Mutex<Option<EventError>>,
}

impl PoolShared {
    fn transition(&self, from: BusState, to: BusState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn record(&self, err: EventError) {
        let mut first = self.first_error.lock().unwrap_or_else(PoisonError::into_inner);
        if first.is_none() {
            *first = Some(err);
        }
    }
}

struct Inner {
    config: EventBusConfig,
    table: Arc<ListenerTable>,
    shared: Arc<PoolShared>,
    sender: Mutex<Option<mpsc::Sender<Event>>>,
    receiver: Mutex<Option<mpsc::Receiver<Event>>>,
    started: OnceLock<()>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// In-process publish/subscribe mediator.
///
/// Cloning a bus yields another handle to the same instance. Workers only
/// hold the listener table, so dropping every handle also closes the queue.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                config,
                table: Arc::new(ListenerTable::default()),
                shared: Arc::new(PoolShared::default()),
                sender: Mutex::new(Some(sender)),
                receiver: Mutex::new(Some(receiver)),
                started: OnceLock::new(),
                workers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.inner.config
    }

    pub fn state(&self) -> BusState {
        BusState::from_u8(self.inner.shared.state.load(Ordering::Acquire))
    }

    pub fn stats(&self) -> BusStats {
        let shared = &self.inner.shared;
        BusStats {
            published: shared.published.load(Ordering::Relaxed),
            delivered: shared.delivered.load(Ordering::Relaxed),
            failed: shared.failed.load(Ordering::Relaxed),
            panicked: shared.panicked.load(Ordering::Relaxed),
        }
    }

    /// Bind a listener to an event name.
    ///
    /// The returned id identifies this registration for
    /// [`EventBus::remove_event_listener`]. An empty name is rejected.
    pub fn add_event_listener(
        &self,
        name: &str,
        listener: Arc<dyn Listener>,
    ) -> EventResult<ListenerId> {
        self.inner.table.insert(name, listener)
    }

    pub fn remove_event_listener(&self, name: &str, id: ListenerId) -> bool {
        self.inner.table.remove(name, id)
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.inner.table.count(name)
    }

    /// Deliver an event synchronously.
    ///
    /// Listeners run one after another in priority order. The first failure
    /// stops delivery and is returned; listeners that already ran are not
    /// compensated. No listeners means no work and no error.
    pub async fn publish(&self, event: &Event) -> EventResult<()> {
        self.inner.table.dispatch(event).await
    }

    pub async fn publish_domain<E: DomainEvent>(&self, event: &E) -> EventResult<()> {
        self.publish(&Event::from_domain(event)?).await
    }

    /// Queue an event for the worker pool.
    ///
    /// Starts the pool on first use. Waits only for queue space, so a full
    /// queue throttles the publisher. Listener failures are not reported
    /// here; they are logged and counted by the workers.
    pub async fn async_publish(&self, event: Event) -> EventResult<()> {
        let sender = self
            .inner
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(EventError::BusClosed)?;

        self.ensure_workers();

        sender
            .send(event)
            .await
            .map_err(|_| EventError::BusClosed)?;
        self.inner.shared.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub async fn async_publish_domain<E: DomainEvent>(&self, event: &E) -> EventResult<()> {
        self.async_publish(Event::from_domain(event)?).await
    }

    fn ensure_workers(&self) {
        self.inner.started.get_or_init(|| {
            let receiver = self
                .inner
                .receiver
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            let Some(receiver) = receiver else {
                return;
            };

            let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
            let pool_size = self.inner.config.worker_pool_size.max(1);
            let mut workers = self
                .inner
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for worker in 0..pool_size {
                workers.push(tokio::spawn(consume(
                    worker,
                    Arc::clone(&receiver),
                    Arc::clone(&self.inner.table),
                    Arc::clone(&self.inner.shared),
                )));
            }

            self.inner
                .shared
                .transition(BusState::Active, BusState::Consuming);
            info!(
                workers = pool_size,
                queue_capacity = self.inner.config.queue_capacity,
                "Event worker pool started"
            );
        });
    }

    /// Stop accepting async events. Workers drain the queue and exit.
    ///
    /// Calling it again has no effect.
    pub fn close(&self) {
        let sender = self
            .inner
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if sender.is_none() {
            debug!("Event bus already closed");
            return;
        }

        let shared = &self.inner.shared;
        if !shared.transition(BusState::Consuming, BusState::Closing) {
            shared.transition(BusState::Active, BusState::Closing);
        }
        info!("Event bus closing");
    }

    /// Block until every worker has exited and return the first pool error.
    ///
    /// Workers only exit once the bus is closed, so call [`EventBus::close`]
    /// first or use [`EventBus::close_wait`].
    pub async fn wait(&self) -> EventResult<()> {
        let workers = std::mem::take(
            &mut *self
                .inner
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        for worker in workers {
            if let Err(e) = worker.await {
                error!("Event worker terminated abnormally: {}", e);
                self.inner.shared.record(EventError::Worker(e.to_string()));
            }
        }

        self.inner
            .shared
            .transition(BusState::Closing, BusState::Drained);

        let first = self
            .inner
            .shared
            .first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Graceful shutdown: [`EventBus::close`] then [`EventBus::wait`].
    pub async fn close_wait(&self) -> EventResult<()> {
        self.close();
        self.wait().await
    }
}

async fn consume(
    worker: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Event>>>,
    table: Arc<ListenerTable>,
    shared: Arc<PoolShared>,
) {
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(event) = next else {
            break;
        };

        match AssertUnwindSafe(table.dispatch(&event)).catch_unwind().await {
            Ok(Ok(())) => {
                shared.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                shared.failed.fetch_add(1, Ordering::Relaxed);
                warn!(worker, event = event.name(), "Async event delivery failed: {}", e);
            }
            Err(panic) => {
                shared.panicked.fetch_add(1, Ordering::Relaxed);
                let message = panic_message(panic.as_ref());
                error!(worker, event = event.name(), "Event listener panicked: {}", message);
                shared.record(EventError::ListenerPanicked {
                    event: event.name().to_string(),
                    message,
                });
            }
        }
    }
    debug!(worker, "Event worker exiting");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
