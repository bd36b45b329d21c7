use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, ProductId, WarehouseId};

/// Unique key of a stock record.
///
/// Ordering is by product, then warehouse. Multi-record writes are staged in
/// this order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
}

impl RecordKey {
    pub fn new(product_id: ProductId, warehouse_id: WarehouseId) -> Self {
        Self {
            product_id,
            warehouse_id,
        }
    }
}

impl core::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "product {} @ warehouse {}", self.product_id, self.warehouse_id)
    }
}

/// On-hand quantity before and after a single mutation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub before: i64,
    pub after: i64,
}

impl StockMovement {
    pub fn change(&self) -> i64 {
        self.after - self.before
    }
}

/// Stock state of one product in one warehouse.
///
/// Invariant: `0 <= quantity_reserved <= quantity_on_hand`. Every mutator
/// validates before touching state, so a failed call leaves the record
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    key: RecordKey,
    quantity_on_hand: i64,
    quantity_reserved: i64,
    pub bin_location: Option<String>,
    pub last_restock_date: Option<NaiveDate>,
    pub last_count_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryRecord {
    /// A zero-stock record for a pair that has never moved.
    pub fn empty(key: RecordKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            quantity_on_hand: 0,
            quantity_reserved: 0,
            bin_location: None,
            last_restock_date: None,
            last_count_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> RecordKey {
        self.key
    }

    pub fn product_id(&self) -> ProductId {
        self.key.product_id
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.key.warehouse_id
    }

    pub fn quantity_on_hand(&self) -> i64 {
        self.quantity_on_hand
    }

    pub fn quantity_reserved(&self) -> i64 {
        self.quantity_reserved
    }

    /// On-hand minus reserved. Computed, never stored.
    pub fn quantity_available(&self) -> i64 {
        self.quantity_on_hand - self.quantity_reserved
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.quantity_on_hand == 0
    }

    /// Add `delta` (positive or negative) to on-hand.
    pub fn adjust(&mut self, delta: i64) -> DomainResult<StockMovement> {
        if delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }
        let before = self.quantity_on_hand;
        let after = before
            .checked_add(delta)
            .ok_or_else(|| DomainError::validation("quantity overflow"))?;
        if after < 0 {
            return Err(DomainError::insufficient_stock(format!(
                "adjustment of {delta} would result in negative stock for {} (on hand {before})",
                self.key
            )));
        }
        if after < self.quantity_reserved {
            return Err(DomainError::insufficient_stock(format!(
                "adjustment of {delta} would leave {} below its reserved quantity {}",
                self.key, self.quantity_reserved
            )));
        }
        self.quantity_on_hand = after;
        Ok(StockMovement { before, after })
    }

    /// Replace on-hand with a counted quantity.
    pub fn set_on_hand(&mut self, quantity: i64) -> DomainResult<StockMovement> {
        if quantity < 0 {
            return Err(DomainError::validation("counted quantity cannot be negative"));
        }
        if quantity < self.quantity_reserved {
            return Err(DomainError::insufficient_stock(format!(
                "counted quantity {quantity} is below reserved quantity {} for {}",
                self.quantity_reserved, self.key
            )));
        }
        let before = self.quantity_on_hand;
        self.quantity_on_hand = quantity;
        Ok(StockMovement {
            before,
            after: quantity,
        })
    }

    /// Commit `quantity` of available stock to an open order.
    pub fn reserve(&mut self, quantity: i64) -> DomainResult<()> {
        ensure_positive(quantity)?;
        let available = self.quantity_available();
        if available < quantity {
            return Err(DomainError::insufficient_stock(format!(
                "cannot reserve {quantity} of {}: only {available} available",
                self.key
            )));
        }
        self.quantity_reserved += quantity;
        Ok(())
    }

    /// Give back up to `quantity` of reserved stock. Over-release clamps at zero.
    ///
    /// Returns the quantity actually released.
    pub fn release(&mut self, quantity: i64) -> DomainResult<i64> {
        if quantity < 0 {
            return Err(DomainError::validation("release quantity cannot be negative"));
        }
        let released = quantity.min(self.quantity_reserved);
        self.quantity_reserved -= released;
        Ok(released)
    }

    /// Add received stock to on-hand.
    pub fn receive(&mut self, quantity: i64) -> DomainResult<StockMovement> {
        ensure_positive(quantity)?;
        let before = self.quantity_on_hand;
        let after = before
            .checked_add(quantity)
            .ok_or_else(|| DomainError::validation("quantity overflow"))?;
        self.quantity_on_hand = after;
        Ok(StockMovement { before, after })
    }

    /// Remove previously reserved stock from on-hand, consuming the reservation.
    pub fn ship(&mut self, quantity: i64) -> DomainResult<StockMovement> {
        ensure_positive(quantity)?;
        if self.quantity_reserved < quantity {
            return Err(DomainError::insufficient_stock(format!(
                "cannot ship {quantity} of {}: only {} reserved",
                self.key, self.quantity_reserved
            )));
        }
        let before = self.quantity_on_hand;
        let after = before - quantity;
        if after < 0 {
            return Err(DomainError::insufficient_stock(format!(
                "cannot ship {quantity} of {}: only {before} on hand",
                self.key
            )));
        }
        self.quantity_on_hand = after;
        self.quantity_reserved -= quantity;
        Ok(StockMovement { before, after })
    }

    /// Remove unreserved stock from on-hand (transfer out, damage write-off).
    pub fn withdraw(&mut self, quantity: i64) -> DomainResult<StockMovement> {
        ensure_positive(quantity)?;
        let available = self.quantity_available();
        if available < quantity {
            return Err(DomainError::insufficient_stock(format!(
                "cannot remove {quantity} of {}: only {available} available",
                self.key
            )));
        }
        let before = self.quantity_on_hand;
        self.quantity_on_hand = before - quantity;
        Ok(StockMovement {
            before,
            after: self.quantity_on_hand,
        })
    }
}

fn ensure_positive(quantity: i64) -> DomainResult<()> {
    if quantity <= 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_key() -> RecordKey {
        RecordKey::new(ProductId::new(1), WarehouseId::new(1))
    }

    fn stocked(on_hand: i64) -> InventoryRecord {
        let mut record = InventoryRecord::empty(test_key(), Utc::now());
        if on_hand > 0 {
            record.adjust(on_hand).unwrap();
        }
        record
    }

    #[test]
    fn adjust_from_empty_sets_on_hand_and_available() {
        let mut record = InventoryRecord::empty(test_key(), Utc::now());
        let movement = record.adjust(100).unwrap();
        assert_eq!(movement, StockMovement { before: 0, after: 100 });
        assert_eq!(record.quantity_on_hand(), 100);
        assert_eq!(record.quantity_available(), 100);
    }

    #[test]
    fn adjust_below_zero_is_rejected_without_change() {
        let mut record = stocked(5);
        let err = record.adjust(-6).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock(_)));
        assert_eq!(record.quantity_on_hand(), 5);
    }

    #[test]
    fn adjust_below_reserved_is_rejected() {
        let mut record = stocked(10);
        record.reserve(8).unwrap();
        let err = record.adjust(-3).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock(_)));
        assert_eq!(record.quantity_on_hand(), 10);
    }

    #[test]
    fn reserve_beyond_available_leaves_state_unchanged() {
        let mut record = stocked(100);
        record.reserve(30).unwrap();
        assert_eq!(record.quantity_reserved(), 30);
        assert_eq!(record.quantity_available(), 70);

        let before = record.clone();
        let err = record.reserve(80).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock(_)));
        assert_eq!(record, before);
    }

    #[test]
    fn reserve_requires_positive_quantity() {
        let mut record = stocked(10);
        assert!(matches!(record.reserve(0), Err(DomainError::Validation(_))));
    }

    #[test]
    fn release_twice_clamps_at_zero() {
        let mut record = stocked(50);
        record.reserve(20).unwrap();
        assert_eq!(record.release(20).unwrap(), 20);
        assert_eq!(record.release(20).unwrap(), 0);
        assert_eq!(record.quantity_reserved(), 0);
    }

    #[test]
    fn ship_consumes_reservation_and_on_hand() {
        let mut record = stocked(100);
        record.reserve(30).unwrap();
        let movement = record.ship(30).unwrap();
        assert_eq!(movement.change(), -30);
        assert_eq!(record.quantity_on_hand(), 70);
        assert_eq!(record.quantity_reserved(), 0);
    }

    #[test]
    fn ship_without_reservation_is_rejected() {
        let mut record = stocked(100);
        let err = record.ship(10).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock(_)));
        assert_eq!(record.quantity_on_hand(), 100);
    }

    #[test]
    fn withdraw_respects_reservations() {
        let mut record = stocked(10);
        record.reserve(7).unwrap();
        assert!(matches!(record.withdraw(4), Err(DomainError::InsufficientStock(_))));
        let movement = record.withdraw(3).unwrap();
        assert_eq!(movement, StockMovement { before: 10, after: 7 });
    }

    #[test]
    fn set_on_hand_cannot_drop_below_reserved() {
        let mut record = stocked(10);
        record.reserve(6).unwrap();
        assert!(matches!(record.set_on_hand(5), Err(DomainError::InsufficientStock(_))));
        let movement = record.set_on_hand(6).unwrap();
        assert_eq!(movement.change(), -4);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Adjust(i64),
        Reserve(i64),
        Release(i64),
        Receive(i64),
        Ship(i64),
        Withdraw(i64),
        Count(i64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (-200i64..200).prop_map(Op::Adjust),
            (-5i64..150).prop_map(Op::Reserve),
            (-5i64..150).prop_map(Op::Release),
            (-5i64..150).prop_map(Op::Receive),
            (-5i64..150).prop_map(Op::Ship),
            (-5i64..150).prop_map(Op::Withdraw),
            (-5i64..300).prop_map(Op::Count),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 512,
            ..ProptestConfig::default()
        })]

        /// Property: no sequence of operations can break `0 <= reserved <= on_hand`,
        /// and a rejected operation never changes the record.
        #[test]
        fn reserved_never_exceeds_on_hand(ops in prop::collection::vec(op_strategy(), 1..60)) {
            let mut record = InventoryRecord::empty(test_key(), Utc::now());

            for op in ops {
                let before = record.clone();
                let result = match op {
                    Op::Adjust(q) => record.adjust(q).map(|_| ()),
                    Op::Reserve(q) => record.reserve(q),
                    Op::Release(q) => record.release(q).map(|_| ()),
                    Op::Receive(q) => record.receive(q).map(|_| ()),
                    Op::Ship(q) => record.ship(q).map(|_| ()),
                    Op::Withdraw(q) => record.withdraw(q).map(|_| ()),
                    Op::Count(q) => record.set_on_hand(q).map(|_| ()),
                };
                if result.is_err() {
                    prop_assert_eq!(&record, &before);
                }

                prop_assert!(record.quantity_reserved() >= 0);
                prop_assert!(record.quantity_reserved() <= record.quantity_on_hand());
                prop_assert!(record.quantity_available() >= 0);
            }
        }
    }
}
