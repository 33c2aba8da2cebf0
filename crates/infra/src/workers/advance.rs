//! Delayed order-advancement consumer.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use storefront_core::{OrderId, UserId};
use storefront_notify::{NotificationData, NotifyJob};
use storefront_orders::{Actor, OrderStatus, Step};

use crate::docstore::{Collection, DocStoreError, DocumentStore, Filter, PatchOp};
use crate::jobs::{Job, JobOutcome, JobStore, QueueName};

/// Advancement queue payload (wire shape).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceJob {
    pub order_id: OrderId,
    pub user_id: UserId,
}

/// Promotes orders from Pending to Processing after the fixed delay.
///
/// The status update is a single conditional patch filtered on the current
/// status, so redelivery (or a racing cancel) makes the job a harmless
/// no-op.
pub struct AdvanceWorker<S, Q> {
    docs: S,
    jobs: Q,
}

impl<S: DocumentStore, Q: JobStore> AdvanceWorker<S, Q> {
    pub fn new(docs: S, jobs: Q) -> Self {
        Self { docs, jobs }
    }

    pub fn handle(&self, job: &Job) -> JobOutcome {
        let advance: AdvanceJob = match serde_json::from_value(job.payload.clone()) {
            Ok(a) => a,
            Err(e) => return JobOutcome::Fatal(format!("malformed advance job: {e}")),
        };

        let step = Step::new(OrderStatus::Processing, Actor::System, "Order confirmed");
        let step_value = match serde_json::to_value(&step) {
            Ok(v) => v,
            Err(e) => return JobOutcome::Retry(format!("encode step: {e}")),
        };

        let matched = self.docs.update_where(
            Collection::Orders,
            &advance.order_id.to_string(),
            &Filter::field_equals("status", OrderStatus::Pending.as_str()),
            &[
                PatchOp::set("status", json!(OrderStatus::Processing.as_str())),
                PatchOp::push("steps", step_value),
            ],
        );

        match matched {
            Ok(true) => {
                info!(order_id = %advance.order_id, "order advanced to processing");
                let notify = NotifyJob::PushUser {
                    recipient_id: advance.user_id,
                    data: NotificationData::new(
                        "Order update",
                        "Your order is now being processed",
                    )
                    .with_url(format!("/orders/{}", advance.order_id)),
                };
                let payload = match serde_json::to_value(&notify) {
                    Ok(v) => v,
                    Err(e) => return JobOutcome::Retry(format!("encode notification: {e}")),
                };
                if let Err(e) = self.jobs.enqueue(Job::new(QueueName::Notify, payload)) {
                    return JobOutcome::Retry(format!("enqueue notification: {e}"));
                }
                JobOutcome::Success
            }
            // Already advanced or cancelled by another actor.
            Ok(false) => {
                debug!(order_id = %advance.order_id, "order no longer pending, nothing to do");
                JobOutcome::Success
            }
            Err(DocStoreError::NotFound { .. }) => {
                JobOutcome::Fatal(format!("order {} not found", advance.order_id))
            }
            Err(e) => JobOutcome::Retry(e.to_string()),
        }
    }
}
