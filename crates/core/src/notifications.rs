//! Transient, dismissible messages for the user.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub type NotificationId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: NotificationId,
    pub level: NotificationLevel,
    pub message: String,
}

#[derive(Default)]
struct Inner {
    next_id: NotificationId,
    items: Vec<Notification>,
}

/// Shared notification list; clones see the same messages.
#[derive(Clone, Default)]
pub struct NotificationCenter {
    inner: Arc<Mutex<Inner>>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, level: NotificationLevel, message: impl Into<String>) -> NotificationId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.items.push(Notification { id, level, message: message.into() });
        id
    }

    pub fn info(&self, message: impl Into<String>) -> NotificationId {
        self.push(NotificationLevel::Info, message)
    }

    pub fn error(&self, message: impl Into<String>) -> NotificationId {
        self.push(NotificationLevel::Error, message)
    }

    /// Returns `false` if `id` was already dismissed.
    pub fn dismiss(&self, id: NotificationId) -> bool {
        let mut inner = self.lock();
        let before = inner.items.len();
        inner.items.retain(|item| item.id != id);
        inner.items.len() != before
    }

    /// Pending notifications, oldest first.
    pub fn list(&self) -> Vec<Notification> {
        self.lock().items.clone()
    }

    /// Remove and return everything pending.
    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut self.lock().items)
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }
}
