use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use storefront_core::{OrderId, ProductId, UserId};

use crate::status::OrderStatus;

/// Who caused a step-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Customer,
    Staff,
    System,
}

/// One entry in an order's append-only step log.
///
/// Insertion order is authoritative; entries are never reordered or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub actor: Actor,
}

impl Step {
    pub fn new(status: OrderStatus, actor: Actor, description: impl Into<String>) -> Self {
        Self {
            status,
            timestamp: Utc::now(),
            description: description.into(),
            actor,
        }
    }
}

/// How the customer settles the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Settled manually after delivery (cash on delivery and the like).
    ManualSettlement,
    Card,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

impl PaymentMethod {
    /// Manual settlement starts unpaid; anything else was charged up front.
    pub fn initial_payment_status(&self) -> PaymentStatus {
        match self {
            PaymentMethod::ManualSettlement => PaymentStatus::Pending,
            PaymentMethod::Card => PaymentStatus::Paid,
        }
    }
}

/// Shipping fields snapshotted at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub recipient: String,
    pub line1: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub phone: String,
}

/// One order line with pricing/title/image copied from the product at order
/// time. Later product edits must not retroactively alter historical orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub title: String,
    pub unit_price_cents: u64,
    pub image: Option<String>,
    pub color: String,
    pub size: String,
    pub quantity: u32,
}

/// Order document.
///
/// Mutated only by appending steps and updating `status` / `payment_status` /
/// `tracking_number`; never physically deleted. `total_cents` is stored at
/// creation and never recomputed from the lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Human-readable identifier, `ORD-{unix_ms}-{6 hex}`. Globally unique.
    pub order_number: String,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub total_cents: u64,
    pub shipping: ShippingAddress,
    pub lines: Vec<OrderLine>,
    pub steps: Vec<Step>,
    pub tracking_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Build a freshly placed order: status Pending, payment status derived
    /// from the method, one `(Pending, Customer)` step already appended.
    pub fn place(
        user_id: UserId,
        shipping: ShippingAddress,
        lines: Vec<OrderLine>,
        payment_method: PaymentMethod,
        total_cents: u64,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            id: OrderId::new(),
            order_number: generate_order_number(created_at),
            user_id,
            status: OrderStatus::Pending,
            payment_method,
            payment_status: payment_method.initial_payment_status(),
            total_cents,
            shipping,
            lines,
            steps: vec![Step::new(
                OrderStatus::Pending,
                Actor::Customer,
                "Order placed",
            )],
            tracking_number: None,
            created_at,
        }
    }

    /// Append a step and move to its status.
    pub fn advance(&mut self, step: Step) {
        self.status = step.status;
        self.steps.push(step);
    }
}

/// `ORD-{unix_ms}-{6 hex}` — sortable by placement time, random suffix for
/// uniqueness within a millisecond.
pub fn generate_order_number(at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("ORD-{}-{}", at.timestamp_millis(), &suffix[..6])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_shipping() -> ShippingAddress {
        ShippingAddress {
            recipient: "A. Customer".to_string(),
            line1: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            postal_code: "12345".to_string(),
            country: "US".to_string(),
            phone: "+1 555 0100".to_string(),
        }
    }

    #[test]
    fn placed_order_starts_pending_with_one_step() {
        let order = Order::place(
            UserId::new(),
            test_shipping(),
            vec![],
            PaymentMethod::ManualSettlement,
            1999,
        );
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.steps.len(), 1);
        assert_eq!(order.steps[0].actor, Actor::Customer);
        assert!(order.order_number.starts_with("ORD-"));
    }

    #[test]
    fn card_orders_start_paid() {
        let order = Order::place(
            UserId::new(),
            test_shipping(),
            vec![],
            PaymentMethod::Card,
            500,
        );
        assert_eq!(order.payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn advance_appends_in_order() {
        let mut order = Order::place(
            UserId::new(),
            test_shipping(),
            vec![],
            PaymentMethod::Card,
            500,
        );
        order.advance(Step::new(
            OrderStatus::Processing,
            Actor::System,
            "Order confirmed",
        ));
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.steps.len(), 2);
        assert_eq!(order.steps[1].status, OrderStatus::Processing);
    }

    #[test]
    fn order_numbers_are_unique() {
        let at = Utc::now();
        let a = generate_order_number(at);
        let b = generate_order_number(at);
        assert_ne!(a, b);
    }
}
