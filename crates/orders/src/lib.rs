//! `storefront-orders` — order documents, the append-only step log, and the
//! order status state machine.

pub mod order;
pub mod status;

pub use order::{Actor, Order, OrderLine, PaymentMethod, PaymentStatus, ShippingAddress, Step};
pub use status::OrderStatus;
