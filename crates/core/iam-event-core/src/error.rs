//! Event bus error types.

use thiserror::Error;

/// Error type returned by listener handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Event name must not be empty")]
    EmptyEventName,

    #[error("Listener for '{event}' failed: {source}")]
    Listener {
        event: String,
        #[source]
        source: HandlerError,
    },

    #[error("Listener for '{event}' panicked: {message}")]
    ListenerPanicked { event: String, message: String },

    #[error("Event bus is closed")]
    BusClosed,

    #[error("Event worker failed: {0}")]
    Worker(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type EventResult<T> = Result<T, EventError>;
