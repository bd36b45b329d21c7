use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{
    ProductId, PurchaseOrderId, SalesOrderId, TransactionId, UserId, WarehouseId,
};

use crate::record::{RecordKey, StockMovement};

/// Kind of on-hand mutation recorded in the transaction log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Purchase,
    Sale,
    Adjustment,
    Transfer,
    Return,
    Damage,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Purchase => "PURCHASE",
            TransactionType::Sale => "SALE",
            TransactionType::Adjustment => "ADJUSTMENT",
            TransactionType::Transfer => "TRANSFER",
            TransactionType::Return => "RETURN",
            TransactionType::Damage => "DAMAGE",
        }
    }
}

impl core::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order that caused a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionReference {
    PurchaseOrder(PurchaseOrderId),
    SalesOrder(SalesOrderId),
}

impl TransactionReference {
    pub fn reference_type(&self) -> &'static str {
        match self {
            TransactionReference::PurchaseOrder(_) => "PURCHASE_ORDER",
            TransactionReference::SalesOrder(_) => "SALES_ORDER",
        }
    }

    pub fn reference_id(&self) -> u64 {
        match self {
            TransactionReference::PurchaseOrder(id) => id.get(),
            TransactionReference::SalesOrder(id) => id.get(),
        }
    }
}

/// A transaction ready to be appended (not yet assigned an id).
///
/// Built from the `StockMovement` returned by a record mutation so that
/// `quantity_change == quantity_after - quantity_before` holds by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub transaction_type: TransactionType,
    pub quantity_change: i64,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub reference: Option<TransactionReference>,
    pub unit_cost: Option<Decimal>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub actor: Option<UserId>,
}

impl PendingTransaction {
    pub fn from_movement(
        key: RecordKey,
        transaction_type: TransactionType,
        movement: StockMovement,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            product_id: key.product_id,
            warehouse_id: key.warehouse_id,
            transaction_type,
            quantity_change: movement.change(),
            quantity_before: movement.before,
            quantity_after: movement.after,
            reference: None,
            unit_cost: None,
            notes: None,
            occurred_at,
            actor: None,
        }
    }

    pub fn with_reference(mut self, reference: TransactionReference) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_unit_cost(mut self, unit_cost: Decimal) -> Self {
        self.unit_cost = Some(unit_cost);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn by(mut self, actor: UserId) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Assign the store-generated id, producing the immutable log row.
    pub fn commit(self, id: TransactionId) -> InventoryTransaction {
        InventoryTransaction {
            id,
            product_id: self.product_id,
            warehouse_id: self.warehouse_id,
            transaction_type: self.transaction_type,
            quantity_change: self.quantity_change,
            quantity_before: self.quantity_before,
            quantity_after: self.quantity_after,
            reference: self.reference,
            unit_cost: self.unit_cost,
            notes: self.notes,
            occurred_at: self.occurred_at,
            actor: self.actor,
        }
    }
}

/// Immutable row in the append-only transaction log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryTransaction {
    pub id: TransactionId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub transaction_type: TransactionType,
    pub quantity_change: i64,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub reference: Option<TransactionReference>,
    pub unit_cost: Option<Decimal>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub actor: Option<UserId>,
}

impl InventoryTransaction {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.product_id, self.warehouse_id)
    }
}
