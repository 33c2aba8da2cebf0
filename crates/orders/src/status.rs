//! Order status lifecycle.
//!
//! ```text
//! Pending ──► Processing ──► Shipped ──► Delivered (terminal)
//!    │             │
//!    │             └──► CancellationRequested ──► Cancelled (terminal)
//!    │                          │
//!    │                          └──► Processing (request rejected)
//!    └──► Cancelled (customer-initiated, Pending only)
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    CancellationRequested,
}

impl OrderStatus {
    /// Terminal states are never re-opened by ordinary transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Customer-initiated cancellation is only accepted while still Pending.
    pub fn can_customer_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Whether a staff transition from `self` to `next` is legal.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Shipped)
                | (Processing, CancellationRequested)
                | (CancellationRequested, Cancelled)
                | (CancellationRequested, Processing)
                | (Shipped, Delivered)
        )
    }

    /// Stable string form used in document filters and step descriptions.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::CancellationRequested => "cancellation_requested",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
