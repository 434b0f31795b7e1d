//! In-process event bus.
//!
//! Side effects of authentication (recording the last login time, audit
//! trails) are published as [`Event`]s and handled by [`Listener`]s bound to
//! the event name. [`EventBus::publish`] delivers synchronously and in
//! priority order; [`EventBus::async_publish`] hands the event to a bounded
//! worker pool that is started on first use and drained by
//! [`EventBus::close_wait`].

mod bus;
mod error;
mod event;
mod listener;

pub use bus::{
    BusState, BusStats, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKER_POOL_SIZE, EventBus, EventBusConfig,
};
pub use error::{EventError, EventResult, HandlerError};
pub use event::{DomainEvent, Event};
pub use listener::{Listener, ListenerId};
