//! User persistence seam and the last-login listener.

use crate::events::AuthenticationEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use iam_event_core::{Event, HandlerError, Listener};
use iam_identity_core::BoxError;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn update_last_login(&self, username: &str, at: DateTime<Utc>) -> Result<(), BoxError>;
}

/// Keeps last-login times in memory.
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    last_logins: DashMap<String, DateTime<Utc>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_login(&self, username: &str) -> Option<DateTime<Utc>> {
        self.last_logins.get(username).map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.last_logins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_logins.is_empty()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn update_last_login(&self, username: &str, at: DateTime<Utc>) -> Result<(), BoxError> {
        // Events may arrive out of order from the worker pool.
        self.last_logins
            .entry(username.to_string())
            .and_modify(|current| {
                if at > *current {
                    *current = at;
                }
            })
            .or_insert(at);
        Ok(())
    }
}

/// Records the login time of every [`AuthenticationEvent`].
pub struct LastLoginListener {
    repository: Arc<dyn UserRepository>,
}

impl LastLoginListener {
    pub fn new(repository: Arc<dyn UserRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl Listener for LastLoginListener {
    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        let login: AuthenticationEvent = event.decode()?;
        let username = if login.username.is_empty() {
            &login.user_id
        } else {
            &login.username
        };

        self.repository
            .update_last_login(username, login.login_at)
            .await?;
        debug!(username = %username, provider = %login.provider, "Recorded last login");
        Ok(())
    }
}
