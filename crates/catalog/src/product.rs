use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, Entity, ProductId};

/// Stock level at or below which a product needs reordering, unless overridden.
pub const DEFAULT_REORDER_POINT: i64 = 20;

/// Quantity suggested for a replenishment order, unless overridden.
pub const DEFAULT_REORDER_QUANTITY: i64 = 50;

/// Catalog view of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    /// Unit cost, recorded on SALE transactions.
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    pub reorder_point: i64,
    pub reorder_quantity: i64,
    pub active: bool,
}

impl Product {
    pub fn new(id: ProductId, sku: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            sku: sku.into(),
            name: name.into(),
            cost_price: Decimal::ZERO,
            selling_price: Decimal::ZERO,
            reorder_point: DEFAULT_REORDER_POINT,
            reorder_quantity: DEFAULT_REORDER_QUANTITY,
            active: true,
        }
    }

    pub fn with_prices(mut self, cost_price: Decimal, selling_price: Decimal) -> Self {
        self.cost_price = cost_price;
        self.selling_price = selling_price;
        self
    }

    pub fn with_reorder_point(mut self, reorder_point: i64) -> Self {
        self.reorder_point = reorder_point;
        self
    }

    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }

    /// Check if the product can appear on new orders.
    pub fn can_be_ordered(&self) -> bool {
        self.active
    }

    pub fn needs_reorder(&self, quantity_on_hand: i64) -> bool {
        quantity_on_hand <= self.reorder_point
    }

    pub(crate) fn validate(&self) -> DomainResult<()> {
        if self.sku.trim().is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("product name cannot be empty"));
        }
        if self.reorder_point < 0 {
            return Err(DomainError::validation("reorder_point cannot be negative"));
        }
        if self.cost_price.is_sign_negative() || self.selling_price.is_sign_negative() {
            return Err(DomainError::validation("prices cannot be negative"));
        }
        Ok(())
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn new_product_uses_default_reorder_settings() {
        let p = Product::new(ProductId::new(1), "SKU-1", "Widget");
        assert_eq!(p.reorder_point, DEFAULT_REORDER_POINT);
        assert_eq!(p.reorder_quantity, DEFAULT_REORDER_QUANTITY);
        assert!(p.can_be_ordered());
    }

    #[test]
    fn needs_reorder_is_inclusive_of_reorder_point() {
        let p = Product::new(ProductId::new(1), "SKU-1", "Widget").with_reorder_point(20);
        assert!(p.needs_reorder(20));
        assert!(p.needs_reorder(0));
        assert!(!p.needs_reorder(21));
    }

    #[test]
    fn negative_prices_fail_validation() {
        let p = Product::new(ProductId::new(1), "SKU-1", "Widget").with_prices(dec!(-1), dec!(5));
        assert!(matches!(p.validate(), Err(DomainError::Validation(_))));
    }
}
