//! Notification queue consumer.

use tracing::debug;

use storefront_notify::{NotificationSink, NotifyJob};

use crate::jobs::{Job, JobOutcome};

/// Decodes notification jobs and hands them to the injected sink.
pub struct NotifyWorker<K> {
    sink: K,
}

impl<K: NotificationSink> NotifyWorker<K> {
    pub fn new(sink: K) -> Self {
        Self { sink }
    }

    pub fn handle(&self, job: &Job) -> JobOutcome {
        let notify: NotifyJob = match serde_json::from_value(job.payload.clone()) {
            Ok(n) => n,
            Err(e) => return JobOutcome::Fatal(format!("malformed notify job: {e}")),
        };

        let result = match &notify {
            NotifyJob::PushUser { recipient_id, data } => {
                debug!(recipient = %recipient_id, title = %data.title, "delivering user alert");
                self.sink.deliver_to_user(recipient_id, data)
            }
            NotifyJob::NotifyRoles { roles, data } => {
                debug!(roles = ?roles, title = %data.title, "delivering role alert");
                self.sink.deliver_to_roles(roles, data)
            }
        };

        match result {
            Ok(()) => JobOutcome::Success,
            Err(e) => JobOutcome::Retry(e.to_string()),
        }
    }
}
