use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockledger_core::{PurchaseOrderId, SalesOrderId};
use stockledger_inventory::{InventoryRecord, InventoryTransaction, RecordKey};
use stockledger_purchasing::PurchaseOrder;
use stockledger_sales::SalesOrder;

use super::change_set::{ChangeSet, CommitReceipt};

/// A stored row together with the version the store assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

/// Store operation error.
///
/// These are **infrastructure errors** as opposed to domain errors
/// (validation, insufficient stock, illegal transitions).
#[derive(Debug, Error)]
pub enum StoreError {
    /// A staged row no longer has the version it was read at.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// A uniqueness constraint (order number) would be violated.
    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence boundary for the ledger and both order workflows.
///
/// Reads return snapshots. `commit` is the only write path and must be
/// atomic: either every staged write is applied or none is.
pub trait LedgerStore: Send + Sync {
    fn record(&self, key: RecordKey) -> Result<Option<Versioned<InventoryRecord>>, StoreError>;

    /// All records, ordered by `(product_id, warehouse_id)`.
    fn records(&self) -> Result<Vec<Versioned<InventoryRecord>>, StoreError>;

    /// The whole transaction log in commit order.
    fn transactions(&self) -> Result<Vec<InventoryTransaction>, StoreError>;

    /// Transactions for one record in commit order.
    fn transactions_for(&self, key: RecordKey) -> Result<Vec<InventoryTransaction>, StoreError>;

    fn purchase_order(&self, id: PurchaseOrderId) -> Result<Option<PurchaseOrder>, StoreError>;

    fn purchase_orders(&self) -> Result<Vec<PurchaseOrder>, StoreError>;

    fn sales_order(&self, id: SalesOrderId) -> Result<Option<SalesOrder>, StoreError>;

    fn sales_orders(&self) -> Result<Vec<SalesOrder>, StoreError>;

    fn next_purchase_order_id(&self) -> Result<PurchaseOrderId, StoreError>;

    fn next_sales_order_id(&self) -> Result<SalesOrderId, StoreError>;

    /// Next value of the order-number sequence for `(prefix, year)`, starting at 1.
    fn next_order_sequence(&self, prefix: &str, year: i32) -> Result<u64, StoreError>;

    /// Apply a change set atomically.
    fn commit(&self, changes: ChangeSet) -> Result<CommitReceipt, StoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn record(&self, key: RecordKey) -> Result<Option<Versioned<InventoryRecord>>, StoreError> {
        (**self).record(key)
    }

    fn records(&self) -> Result<Vec<Versioned<InventoryRecord>>, StoreError> {
        (**self).records()
    }

    fn transactions(&self) -> Result<Vec<InventoryTransaction>, StoreError> {
        (**self).transactions()
    }

    fn transactions_for(&self, key: RecordKey) -> Result<Vec<InventoryTransaction>, StoreError> {
        (**self).transactions_for(key)
    }

    fn purchase_order(&self, id: PurchaseOrderId) -> Result<Option<PurchaseOrder>, StoreError> {
        (**self).purchase_order(id)
    }

    fn purchase_orders(&self) -> Result<Vec<PurchaseOrder>, StoreError> {
        (**self).purchase_orders()
    }

    fn sales_order(&self, id: SalesOrderId) -> Result<Option<SalesOrder>, StoreError> {
        (**self).sales_order(id)
    }

    fn sales_orders(&self) -> Result<Vec<SalesOrder>, StoreError> {
        (**self).sales_orders()
    }

    fn next_purchase_order_id(&self) -> Result<PurchaseOrderId, StoreError> {
        (**self).next_purchase_order_id()
    }

    fn next_sales_order_id(&self) -> Result<SalesOrderId, StoreError> {
        (**self).next_sales_order_id()
    }

    fn next_order_sequence(&self, prefix: &str, year: i32) -> Result<u64, StoreError> {
        (**self).next_order_sequence(prefix, year)
    }

    fn commit(&self, changes: ChangeSet) -> Result<CommitReceipt, StoreError> {
        (**self).commit(changes)
    }
}
