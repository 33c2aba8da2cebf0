//! Notification payloads and the delivery seam.
//!
//! Delivery is at-least-once: the same alert may be handed to a sink more
//! than once. The log sink is the in-tree implementation; email/push sinks
//! slot in behind the same trait.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use storefront_core::UserId;

/// Alert content shared by both targeting modes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl NotificationData {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Notification queue payload (wire shape).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum NotifyJob {
    /// Alert one user.
    PushUser {
        recipient_id: UserId,
        data: NotificationData,
    },
    /// Alert everyone holding one of the given roles.
    NotifyRoles {
        roles: Vec<String>,
        data: NotificationData,
    },
}

#[derive(Debug, Error)]
pub enum SinkError {
    /// Transient delivery failure; the job is retried by the queue.
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Delivery backend. Implementations must tolerate duplicate deliveries.
pub trait NotificationSink: Send + Sync {
    fn deliver_to_user(&self, recipient: &UserId, data: &NotificationData)
        -> Result<(), SinkError>;

    fn deliver_to_roles(&self, roles: &[String], data: &NotificationData)
        -> Result<(), SinkError>;
}

impl<K: NotificationSink + ?Sized> NotificationSink for std::sync::Arc<K> {
    fn deliver_to_user(
        &self,
        recipient: &UserId,
        data: &NotificationData,
    ) -> Result<(), SinkError> {
        (**self).deliver_to_user(recipient, data)
    }

    fn deliver_to_roles(&self, roles: &[String], data: &NotificationData) -> Result<(), SinkError> {
        (**self).deliver_to_roles(roles, data)
    }
}

/// Console/log sink.
#[derive(Debug, Default)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

impl NotificationSink for LogSink {
    fn deliver_to_user(
        &self,
        recipient: &UserId,
        data: &NotificationData,
    ) -> Result<(), SinkError> {
        info!(
            recipient = %recipient,
            title = %data.title,
            message = %data.message,
            url = data.url.as_deref().unwrap_or(""),
            "user notification"
        );
        Ok(())
    }

    fn deliver_to_roles(&self, roles: &[String], data: &NotificationData) -> Result<(), SinkError> {
        info!(
            roles = ?roles,
            title = %data.title,
            message = %data.message,
            url = data.url.as_deref().unwrap_or(""),
            "role notification"
        );
        Ok(())
    }
}
