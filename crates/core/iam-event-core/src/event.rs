//! Immutable event values.

use crate::error::{EventError, EventResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

/// A typed event that can be published on the bus.
pub trait DomainEvent: Serialize {
    /// Dispatch key listeners bind to.
    const NAME: &'static str;
}

/// A fact describing something that happened.
///
/// The name is the dispatch key and is never empty. The payload is an
/// attribute bag; cloning an event shares it.
#[derive(Debug, Clone)]
pub struct Event {
    id: Uuid,
    name: String,
    payload: Arc<Map<String, Value>>,
    created_at: DateTime<Utc>,
}

impl Event {
    pub fn new(name: impl Into<String>, payload: Map<String, Value>) -> EventResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(EventError::EmptyEventName);
        }

        Ok(Self {
            id: Uuid::new_v4(),
            name,
            payload: Arc::new(payload),
            created_at: Utc::now(),
        })
    }

    /// Build an event from a typed domain event.
    ///
    /// The domain event must serialize to a JSON object.
    pub fn from_domain<E: DomainEvent>(event: &E) -> EventResult<Self> {
        let payload = match serde_json::to_value(event)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self::new(E::NAME, payload)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Decode the payload back into a typed event.
    pub fn decode<E: DeserializeOwned>(&self) -> EventResult<E> {
        Ok(serde_json::from_value(Value::Object(
            self.payload.as_ref().clone(),
        ))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct UserDeleted {
        username: String,
    }

    impl DomainEvent for UserDeleted {
        const NAME: &'static str = "user.deleted";
    }

    #[test]
    fn empty_name_rejected() {
        assert!(matches!(
            Event::new("", Map::new()),
            Err(EventError::EmptyEventName)
        ));
    }

    #[test]
    fn domain_event_round_trip() {
        let event = Event::from_domain(&UserDeleted {
            username: "bob".to_string(),
        })
        .unwrap();

        assert_eq!(event.name(), "user.deleted");
        assert_eq!(event.get("username"), Some(&Value::from("bob")));
        assert_eq!(
            event.decode::<UserDeleted>().unwrap(),
            UserDeleted {
                username: "bob".to_string()
            }
        );
    }

    #[test]
    fn clones_share_identity() {
        let event = Event::new("ping", Map::new()).unwrap();
        let copy = event.clone();
        assert_eq!(event.id(), copy.id());
        assert_eq!(event.created_at(), copy.created_at());
    }
}
