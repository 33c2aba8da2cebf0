//! `storefront-catalog` — product documents and stock accounting.

pub mod product;

pub use product::{Product, StockEntry};
