//! `storefront-notify` — notification payloads and delivery sinks.

pub mod notification;

pub use notification::{LogSink, NotificationData, NotifyJob, SinkError, NotificationSink};
