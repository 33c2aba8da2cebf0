//! Order fulfillment engine. One document-store transaction validates the
//! order, decrements stock, persists the order, deletes the cart, and
//! writes the outbox records.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use storefront_catalog::Product;
use storefront_core::{AddressId, DomainError, DomainResult, ProductId, UserId};
use storefront_notify::{NotificationData, NotifyJob};
use storefront_orders::{Order, OrderLine, PaymentMethod, ShippingAddress};

use crate::docstore::{Collection, DocumentStore, Txn};
use crate::outbox::{OutboxKind, OutboxRecord};
use crate::workers::advance::AdvanceJob;

/// User profile document, as seen by the checkout path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDoc {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Address-book entry document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressDoc {
    pub line1: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

/// One requested order line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: ProductId,
    pub color: String,
    pub size: String,
    pub quantity: u32,
}

/// Checkout input, as validated upstream of the HTTP layer.
#[derive(Debug, Clone)]
pub struct PlaceOrderRequest {
    pub user_id: UserId,
    pub items: Vec<OrderItemRequest>,
    pub address_id: AddressId,
    pub payment_method: PaymentMethod,
    /// Stored as-is on the order; never recomputed from the lines.
    pub total_cents: u64,
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Delay before the advancement job becomes visible.
    pub advancement_delay_ms: u64,
    /// Transaction retries on optimistic-concurrency conflicts.
    pub max_conflict_retries: u32,
    /// Roles alerted about new orders.
    pub staff_roles: Vec<String>,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            advancement_delay_ms: 5000,
            max_conflict_retries: 3,
            staff_roles: vec!["admin".to_string()],
        }
    }
}

pub struct CheckoutEngine<S> {
    store: S,
    config: CheckoutConfig,
}

impl<S: DocumentStore> CheckoutEngine<S> {
    pub fn new(store: S, config: CheckoutConfig) -> Self {
        Self { store, config }
    }

    /// Place an order.
    ///
    /// A conflict means another checkout touched one of our documents
    /// between read and commit; re-running re-reads current stock, so the
    /// loser of a last-unit race ends up with `VariantUnavailable` or
    /// `InsufficientStock` instead of overselling.
    pub fn place_order(&self, request: &PlaceOrderRequest) -> DomainResult<Order> {
        if request.items.is_empty() {
            return Err(DomainError::invalid_input("order has no items"));
        }
        if request.items.iter().any(|i| i.quantity == 0) {
            return Err(DomainError::invalid_input("line quantity must be positive"));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut placed = None;
            let result = self.store.transaction(&mut |txn| {
                placed = Some(self.run_checkout(txn, request)?);
                Ok(())
            });

            match result {
                Ok(()) => {
                    let order = placed.ok_or_else(|| {
                        DomainError::invariant("checkout committed without an order")
                    })?;
                    info!(
                        order_number = %order.order_number,
                        user_id = %order.user_id,
                        total_cents = order.total_cents,
                        "order placed"
                    );
                    return Ok(order);
                }
                Err(DomainError::Conflict(reason))
                    if attempt < self.config.max_conflict_retries =>
                {
                    warn!(attempt, reason = %reason, "checkout conflict, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn run_checkout(&self, txn: &mut Txn<'_>, request: &PlaceOrderRequest) -> DomainResult<Order> {
        let user_key = request.user_id.to_string();
        let mut user: UserDoc = txn
            .get_as(Collection::Users, &user_key)?
            .ok_or_else(|| DomainError::invalid_input("unknown user"))?;
        let address: AddressDoc = txn
            .get_as(Collection::Addresses, &request.address_id.to_string())?
            .ok_or_else(|| DomainError::invalid_input("unknown address"))?;

        // First order sets the phone: prefer the request, fall back to the
        // profile, persist a newly supplied one.
        let requested_phone = request
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());
        let phone = match (requested_phone, &user.phone) {
            (Some(p), _) => p.to_string(),
            (None, Some(p)) => p.clone(),
            (None, None) => {
                return Err(DomainError::invalid_input("contact phone is required"));
            }
        };
        if user.phone.is_none() {
            user.phone = Some(phone.clone());
            txn.put_as(Collection::Users, &user_key, &user)?;
        }

        let mut lines = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let product_key = item.product_id.to_string();
            let mut product: Product = txn
                .get_as(Collection::Products, &product_key)?
                .ok_or_else(|| DomainError::not_found(format!("product {product_key}")))?;

            product.decrement_stock(&item.color, &item.size, item.quantity)?;

            lines.push(OrderLine {
                product_id: item.product_id,
                title: product.title.clone(),
                unit_price_cents: product.price_cents,
                image: product.image.clone(),
                color: item.color.trim().to_string(),
                size: item.size.trim().to_string(),
                quantity: item.quantity,
            });
            txn.put_as(Collection::Products, &product_key, &product)?;
        }

        let shipping = ShippingAddress {
            recipient: user.name.clone(),
            line1: address.line1,
            city: address.city,
            postal_code: address.postal_code,
            country: address.country,
            phone,
        };

        let order = Order::place(
            request.user_id,
            shipping,
            lines,
            request.payment_method,
            request.total_cents,
        );

        txn.insert_as(Collection::Orders, &order.id.to_string(), &order)?;
        // Deleted, not emptied: no stale cart survives a completed purchase.
        txn.delete(Collection::Carts, &user_key);

        for record in self.outbox_records(&order)? {
            txn.insert_as(Collection::Outbox, &record.id.to_string(), &record)?;
        }

        Ok(order)
    }

    fn outbox_records(&self, order: &Order) -> DomainResult<Vec<OutboxRecord>> {
        let encode = |job: &NotifyJob| {
            serde_json::to_value(job)
                .map_err(|e| DomainError::invalid_input(format!("encode notification: {e}")))
        };

        let staff_alert = NotifyJob::NotifyRoles {
            roles: self.config.staff_roles.clone(),
            data: NotificationData::new(
                "New order",
                format!("Order {} was placed", order.order_number),
            )
            .with_url(format!("/admin/orders/{}", order.id)),
        };
        let customer_alert = NotifyJob::PushUser {
            recipient_id: order.user_id,
            data: NotificationData::new(
                "Order placed",
                format!("Your order {} has been received", order.order_number),
            )
            .with_url(format!("/orders/{}", order.id)),
        };
        let advance = AdvanceJob {
            order_id: order.id,
            user_id: order.user_id,
        };

        Ok(vec![
            OutboxRecord::new(OutboxKind::Notify, encode(&staff_alert)?),
            OutboxRecord::new(OutboxKind::Notify, encode(&customer_alert)?),
            OutboxRecord::new(
                OutboxKind::Advance,
                serde_json::to_value(&advance)
                    .map_err(|e| DomainError::invalid_input(format!("encode advance job: {e}")))?,
            )
            .delayed(self.config.advancement_delay_ms),
        ])
    }
}
