//! Order status transitions (request path).
//!
//! Every mutation runs inside a document-store transaction: the transition
//! is validated against the status read in the same transaction, the step
//! log entry is appended, and customer-facing notifications go through the
//! outbox so they survive a crash after commit.

use serde_json::to_value;
use tracing::info;

use storefront_core::{DomainError, DomainResult, OrderId, UserId};
use storefront_notify::{NotificationData, NotifyJob};
use storefront_orders::{Actor, Order, OrderStatus, Step};

use crate::docstore::{Collection, DocumentStore, Txn};
use crate::outbox::{OutboxKind, OutboxRecord};

pub struct AdminTransitionHandler<S> {
    store: S,
}

impl<S: DocumentStore> AdminTransitionHandler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Staff direct status override.
    ///
    /// Legal transitions only; terminal states are never re-opened. Moving
    /// to Shipped or Delivered writes a customer notification.
    pub fn set_status(
        &self,
        order_id: OrderId,
        new_status: OrderStatus,
        tracking_number: Option<String>,
    ) -> DomainResult<Order> {
        self.mutate(order_id, |order, txn| {
            if !order.status.can_transition_to(new_status) {
                return Err(DomainError::invariant(format!(
                    "illegal transition {} -> {}",
                    order.status, new_status
                )));
            }
            order.advance(Step::new(
                new_status,
                Actor::Staff,
                format!("Status changed to {new_status}"),
            ));
            if let Some(tracking) = tracking_number.clone() {
                order.tracking_number = Some(tracking);
            }

            if let Some(data) = customer_copy(new_status, order) {
                write_notification(txn, order.user_id, data)?;
            }
            info!(order_id = %order.id, status = %new_status, "staff status override");
            Ok(())
        })
    }

    /// Customer-initiated cancellation. Accepted only while still Pending;
    /// the order goes straight to Cancelled with no intermediate state.
    pub fn customer_cancel(&self, order_id: OrderId, user_id: UserId) -> DomainResult<Order> {
        self.mutate(order_id, |order, _txn| {
            if order.user_id != user_id {
                return Err(DomainError::not_found(format!("order {order_id}")));
            }
            if !order.status.can_customer_cancel() {
                return Err(DomainError::invariant(format!(
                    "cannot cancel an order in status {}",
                    order.status
                )));
            }
            order.advance(Step::new(
                OrderStatus::Cancelled,
                Actor::Customer,
                "Cancelled by customer",
            ));
            info!(order_id = %order.id, "customer cancelled order");
            Ok(())
        })
    }

    /// Customer asks to cancel an order already in Processing; staff decides.
    pub fn request_cancellation(&self, order_id: OrderId, user_id: UserId) -> DomainResult<Order> {
        self.mutate(order_id, |order, _txn| {
            if order.user_id != user_id {
                return Err(DomainError::not_found(format!("order {order_id}")));
            }
            if !order.status.can_transition_to(OrderStatus::CancellationRequested) {
                return Err(DomainError::invariant(format!(
                    "cancellation can only be requested while processing, not {}",
                    order.status
                )));
            }
            order.advance(Step::new(
                OrderStatus::CancellationRequested,
                Actor::Customer,
                "Cancellation requested",
            ));
            Ok(())
        })
    }

    /// Staff approves (Cancelled) or rejects (back to Processing) a pending
    /// cancellation request. The customer is notified either way.
    pub fn resolve_cancellation(&self, order_id: OrderId, approve: bool) -> DomainResult<Order> {
        self.mutate(order_id, |order, txn| {
            if order.status != OrderStatus::CancellationRequested {
                return Err(DomainError::invariant(format!(
                    "no cancellation request pending on status {}",
                    order.status
                )));
            }
            let (next, description, data) = if approve {
                (
                    OrderStatus::Cancelled,
                    "Cancellation approved",
                    NotificationData::new(
                        "Order cancelled",
                        format!("Your order {} has been cancelled", order.order_number),
                    ),
                )
            } else {
                (
                    OrderStatus::Processing,
                    "Cancellation rejected",
                    NotificationData::new(
                        "Order update",
                        format!(
                            "Your cancellation request for order {} was declined",
                            order.order_number
                        ),
                    ),
                )
            };
            order.advance(Step::new(next, Actor::Staff, description));
            write_notification(txn, order.user_id, data.with_url(format!("/orders/{}", order.id)))?;
            info!(order_id = %order.id, approve, "cancellation request resolved");
            Ok(())
        })
    }

    fn mutate(
        &self,
        order_id: OrderId,
        f: impl Fn(&mut Order, &mut Txn<'_>) -> DomainResult<()>,
    ) -> DomainResult<Order> {
        let key = order_id.to_string();
        let mut updated = None;
        self.store.transaction(&mut |txn| {
            let mut order: Order = txn
                .get_as(Collection::Orders, &key)?
                .ok_or_else(|| DomainError::not_found(format!("order {order_id}")))?;
            f(&mut order, txn)?;
            txn.put_as(Collection::Orders, &key, &order)?;
            updated = Some(order);
            Ok(())
        })?;
        updated.ok_or_else(|| DomainError::invariant("transition committed without an order"))
    }
}

/// Status-specific customer copy for staff transitions. Only Shipped and
/// Delivered alert the customer.
fn customer_copy(status: OrderStatus, order: &Order) -> Option<NotificationData> {
    let data = match status {
        OrderStatus::Shipped => NotificationData::new(
            "Order shipped",
            format!("Your order {} is on its way", order.order_number),
        ),
        OrderStatus::Delivered => NotificationData::new(
            "Order delivered",
            format!("Your order {} has been delivered", order.order_number),
        ),
        _ => return None,
    };
    Some(data.with_url(format!("/orders/{}", order.id)))
}

fn write_notification(
    txn: &mut Txn<'_>,
    recipient_id: UserId,
    data: NotificationData,
) -> DomainResult<()> {
    let job = NotifyJob::PushUser { recipient_id, data };
    let payload = to_value(&job)
        .map_err(|e| DomainError::invalid_input(format!("encode notification: {e}")))?;
    let record = OutboxRecord::new(OutboxKind::Notify, payload);
    txn.insert_as(Collection::Outbox, &record.id.to_string(), &record)
}
