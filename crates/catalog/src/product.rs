use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{DomainError, DomainResult, ProductId};

/// One sellable variant inside a product's stock array.
///
/// Quantity must never go negative; it is decremented exactly once per
/// confirmed order line, inside the same transaction as order creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntry {
    pub color: String,
    pub size: String,
    pub quantity: u32,
}

impl StockEntry {
    /// Variant matching is case-insensitive and whitespace-trimmed on both
    /// color and size.
    pub fn matches(&self, color: &str, size: &str) -> bool {
        fn norm_eq(a: &str, b: &str) -> bool {
            a.trim().eq_ignore_ascii_case(b.trim())
        }
        norm_eq(&self.color, color) && norm_eq(&self.size, size)
    }
}

/// Catalog product document.
///
/// Orders snapshot `title`/`price_cents`/`image` at placement time; later
/// edits to the product never alter historical orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    /// Price in smallest currency unit (e.g., cents).
    pub price_cents: u64,
    /// Object-store key of the primary product image, when transcoded.
    pub image: Option<String>,
    pub stock: Vec<StockEntry>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn new(title: impl Into<String>, price_cents: u64, stock: Vec<StockEntry>) -> Self {
        Self {
            id: ProductId::new(),
            title: title.into(),
            price_cents,
            image: None,
            stock,
            created_at: Utc::now(),
        }
    }

    pub fn find_variant(&self, color: &str, size: &str) -> Option<&StockEntry> {
        self.stock.iter().find(|e| e.matches(color, size))
    }

    /// Decrement the matching variant's quantity in place.
    ///
    /// Fails with `VariantUnavailable` when no entry matches and with
    /// `InsufficientStock` when the entry cannot cover `quantity`. On
    /// failure the product is left unchanged.
    pub fn decrement_stock(&mut self, color: &str, size: &str, quantity: u32) -> DomainResult<()> {
        let title = self.title.clone();
        let entry = self
            .stock
            .iter_mut()
            .find(|e| e.matches(color, size))
            .ok_or_else(|| {
                DomainError::variant_unavailable(format!("{title}: {color}/{size}"))
            })?;

        if entry.quantity < quantity {
            return Err(DomainError::insufficient_stock(format!(
                "{title}: {color}/{size} has {} left, {} requested",
                entry.quantity, quantity
            )));
        }

        entry.quantity -= quantity;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn red_m(quantity: u32) -> Product {
        Product::new(
            "Test Shirt",
            1999,
            vec![StockEntry {
                color: "Red".to_string(),
                size: "M".to_string(),
                quantity,
            }],
        )
    }

    #[test]
    fn variant_match_ignores_case_and_whitespace() {
        let product = red_m(3);
        assert!(product.find_variant("  red ", "m ").is_some());
        assert!(product.find_variant("RED", "M").is_some());
        assert!(product.find_variant("Blue", "M").is_none());
    }

    #[test]
    fn decrement_consumes_stock() {
        let mut product = red_m(2);
        product.decrement_stock("Red", "M", 2).unwrap();
        assert_eq!(product.find_variant("Red", "M").unwrap().quantity, 0);
    }

    #[test]
    fn decrement_rejects_unknown_variant() {
        let mut product = red_m(2);
        let err = product.decrement_stock("Green", "XL", 1).unwrap_err();
        assert!(matches!(err, DomainError::VariantUnavailable(_)));
        assert_eq!(product.find_variant("Red", "M").unwrap().quantity, 2);
    }

    #[test]
    fn decrement_rejects_oversell() {
        let mut product = red_m(1);
        let err = product.decrement_stock("Red", "M", 2).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock(_)));
        assert_eq!(product.find_variant("Red", "M").unwrap().quantity, 1);
    }

    proptest! {
        /// No sequence of accepted decrements ever drives quantity negative
        /// (u32 would underflow/panic if the guard were wrong).
        #[test]
        fn accepted_decrements_never_oversell(
            start in 0u32..100,
            requests in proptest::collection::vec(1u32..10, 0..32),
        ) {
            let mut product = red_m(start);
            let mut remaining = start;

            for qty in requests {
                match product.decrement_stock("Red", "M", qty) {
                    Ok(()) => {
                        prop_assert!(remaining >= qty);
                        remaining -= qty;
                    }
                    Err(DomainError::InsufficientStock(_)) => {
                        prop_assert!(remaining < qty);
                    }
                    Err(other) => return Err(TestCaseError::fail(format!("{other:?}"))),
                }
                prop_assert_eq!(product.find_variant("Red", "M").unwrap().quantity, remaining);
            }
        }
    }
}
