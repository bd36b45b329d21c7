use std::collections::BTreeMap;

use stockledger_core::{AggregateRoot, ExpectedVersion, PurchaseOrderId, SalesOrderId};
use stockledger_inventory::{InventoryRecord, InventoryTransaction, PendingTransaction, RecordKey};
use stockledger_purchasing::PurchaseOrder;
use stockledger_sales::SalesOrder;

#[derive(Debug, Clone)]
pub(crate) struct RecordWrite {
    pub(crate) record: InventoryRecord,
    pub(crate) expected: ExpectedVersion,
}

#[derive(Debug, Clone)]
pub(crate) enum OrderWrite<T, Id> {
    Save(T),
    Delete { id: Id, expected: ExpectedVersion },
}

/// Every write of one business operation, applied by the store as a unit.
///
/// Records are keyed (and therefore applied) in ascending
/// `(product_id, warehouse_id)` order. A record staged twice keeps the
/// expected version of its first read.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub(crate) records: BTreeMap<RecordKey, RecordWrite>,
    pub(crate) transactions: Vec<PendingTransaction>,
    pub(crate) purchase_orders: Vec<OrderWrite<PurchaseOrder, PurchaseOrderId>>,
    pub(crate) sales_orders: Vec<OrderWrite<SalesOrder, SalesOrderId>>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
            && self.transactions.is_empty()
            && self.purchase_orders.is_empty()
            && self.sales_orders.is_empty()
    }

    /// The staged state of a record, if this change set already touches it.
    pub fn staged_record(&self, key: RecordKey) -> Option<&InventoryRecord> {
        self.records.get(&key).map(|w| &w.record)
    }

    pub fn stage_record(&mut self, record: InventoryRecord, expected: ExpectedVersion) {
        let key = record.key();
        match self.records.get_mut(&key) {
            Some(existing) => existing.record = record,
            None => {
                self.records.insert(key, RecordWrite { record, expected });
            }
        }
    }

    /// Append a transaction; the returned index locates it in the receipt.
    pub fn append_transaction(&mut self, tx: PendingTransaction) -> usize {
        self.transactions.push(tx);
        self.transactions.len() - 1
    }

    /// Stage an insert (version 0) or an update of a loaded order.
    pub fn save_purchase_order(&mut self, order: PurchaseOrder) {
        self.purchase_orders.push(OrderWrite::Save(order));
    }

    pub fn delete_purchase_order(&mut self, order: &PurchaseOrder) {
        self.purchase_orders.push(OrderWrite::Delete {
            id: order.order_id(),
            expected: ExpectedVersion::from_loaded(order.version()),
        });
    }

    pub fn save_sales_order(&mut self, order: SalesOrder) {
        self.sales_orders.push(OrderWrite::Save(order));
    }

    pub fn delete_sales_order(&mut self, order: &SalesOrder) {
        self.sales_orders.push(OrderWrite::Delete {
            id: order.order_id(),
            expected: ExpectedVersion::from_loaded(order.version()),
        });
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }
}

/// What a successful commit produced.
#[derive(Debug, Clone, Default)]
pub struct CommitReceipt {
    /// Appended transactions, in staging order, with their assigned ids.
    pub transactions: Vec<InventoryTransaction>,
    /// Committed state of every staged record.
    pub records: BTreeMap<RecordKey, InventoryRecord>,
    pub purchase_order_versions: BTreeMap<PurchaseOrderId, u64>,
    pub sales_order_versions: BTreeMap<SalesOrderId, u64>,
}

impl CommitReceipt {
    pub fn transaction(&self, index: usize) -> Option<&InventoryTransaction> {
        self.transactions.get(index)
    }

    pub fn record(&self, key: RecordKey) -> Option<&InventoryRecord> {
        self.records.get(&key)
    }
}
