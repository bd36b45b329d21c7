use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use stockledger_core::{
    AggregateRoot, ExpectedVersion, PurchaseOrderId, SalesOrderId, TransactionId,
};
use stockledger_inventory::{InventoryRecord, InventoryTransaction, RecordKey};
use stockledger_purchasing::PurchaseOrder;
use stockledger_sales::SalesOrder;

use super::change_set::{ChangeSet, CommitReceipt, OrderWrite};
use super::r#trait::{LedgerStore, StoreError, Versioned};

#[derive(Debug, Default)]
struct StoreState {
    records: BTreeMap<RecordKey, Versioned<InventoryRecord>>,
    transactions: Vec<InventoryTransaction>,
    purchase_orders: BTreeMap<PurchaseOrderId, PurchaseOrder>,
    sales_orders: BTreeMap<SalesOrderId, SalesOrder>,
    last_transaction_id: u64,
    last_purchase_order_id: u64,
    last_sales_order_id: u64,
    order_sequences: HashMap<(String, i32), u64>,
}

/// In-memory ledger store.
///
/// Intended for tests/dev. A single `RwLock` guards all state, so a commit
/// is one write critical section: versions are checked for every staged
/// row first, and only then is anything written.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<StoreState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, StoreState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, StoreState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }
}

fn check_version(
    what: impl core::fmt::Display,
    expected: ExpectedVersion,
    actual: Option<u64>,
) -> Result<(), StoreError> {
    if expected.matches(actual) {
        Ok(())
    } else {
        Err(StoreError::Concurrency(format!(
            "{what}: expected {expected:?}, found {actual:?}"
        )))
    }
}

impl StoreState {
    fn validate(&self, changes: &ChangeSet) -> Result<(), StoreError> {
        for (key, write) in &changes.records {
            let actual = self.records.get(key).map(|v| v.version);
            check_version(format_args!("record {key}"), write.expected, actual)?;
        }

        for write in &changes.purchase_orders {
            match write {
                OrderWrite::Save(order) => {
                    let id = order.order_id();
                    let actual = self.purchase_orders.get(&id).map(|o| o.version());
                    check_version(
                        format_args!("purchase order {id}"),
                        ExpectedVersion::from_loaded(order.version()),
                        actual,
                    )?;
                    let taken = self
                        .purchase_orders
                        .values()
                        .any(|o| o.order_id() != id && o.po_number() == order.po_number());
                    if taken {
                        return Err(StoreError::Duplicate(format!(
                            "purchase order number {} already exists",
                            order.po_number()
                        )));
                    }
                }
                OrderWrite::Delete { id, expected } => {
                    let actual = self.purchase_orders.get(id).map(|o| o.version());
                    check_version(format_args!("purchase order {id}"), *expected, actual)?;
                }
            }
        }

        for write in &changes.sales_orders {
            match write {
                OrderWrite::Save(order) => {
                    let id = order.order_id();
                    let actual = self.sales_orders.get(&id).map(|o| o.version());
                    check_version(
                        format_args!("sales order {id}"),
                        ExpectedVersion::from_loaded(order.version()),
                        actual,
                    )?;
                    let taken = self
                        .sales_orders
                        .values()
                        .any(|o| o.order_id() != id && o.so_number() == order.so_number());
                    if taken {
                        return Err(StoreError::Duplicate(format!(
                            "sales order number {} already exists",
                            order.so_number()
                        )));
                    }
                }
                OrderWrite::Delete { id, expected } => {
                    let actual = self.sales_orders.get(id).map(|o| o.version());
                    check_version(format_args!("sales order {id}"), *expected, actual)?;
                }
            }
        }

        Ok(())
    }

    fn apply(&mut self, changes: ChangeSet) -> CommitReceipt {
        let mut receipt = CommitReceipt::default();

        for (key, write) in changes.records {
            let version = self.records.get(&key).map(|v| v.version).unwrap_or(0) + 1;
            receipt.records.insert(key, write.record.clone());
            self.records.insert(
                key,
                Versioned {
                    value: write.record,
                    version,
                },
            );
        }

        for pending in changes.transactions {
            self.last_transaction_id += 1;
            let tx = pending.commit(TransactionId::new(self.last_transaction_id));
            self.transactions.push(tx.clone());
            receipt.transactions.push(tx);
        }

        for write in changes.purchase_orders {
            match write {
                OrderWrite::Save(mut order) => {
                    let version = order.version() + 1;
                    order.mark_persisted(version);
                    receipt
                        .purchase_order_versions
                        .insert(order.order_id(), version);
                    self.purchase_orders.insert(order.order_id(), order);
                }
                OrderWrite::Delete { id, .. } => {
                    self.purchase_orders.remove(&id);
                }
            }
        }

        for write in changes.sales_orders {
            match write {
                OrderWrite::Save(mut order) => {
                    let version = order.version() + 1;
                    order.mark_persisted(version);
                    receipt.sales_order_versions.insert(order.order_id(), version);
                    self.sales_orders.insert(order.order_id(), order);
                }
                OrderWrite::Delete { id, .. } => {
                    self.sales_orders.remove(&id);
                }
            }
        }

        receipt
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn record(&self, key: RecordKey) -> Result<Option<Versioned<InventoryRecord>>, StoreError> {
        Ok(self.read()?.records.get(&key).cloned())
    }

    fn records(&self) -> Result<Vec<Versioned<InventoryRecord>>, StoreError> {
        Ok(self.read()?.records.values().cloned().collect())
    }

    fn transactions(&self) -> Result<Vec<InventoryTransaction>, StoreError> {
        Ok(self.read()?.transactions.clone())
    }

    fn transactions_for(&self, key: RecordKey) -> Result<Vec<InventoryTransaction>, StoreError> {
        Ok(self
            .read()?
            .transactions
            .iter()
            .filter(|tx| tx.key() == key)
            .cloned()
            .collect())
    }

    fn purchase_order(&self, id: PurchaseOrderId) -> Result<Option<PurchaseOrder>, StoreError> {
        Ok(self.read()?.purchase_orders.get(&id).cloned())
    }

    fn purchase_orders(&self) -> Result<Vec<PurchaseOrder>, StoreError> {
        Ok(self.read()?.purchase_orders.values().cloned().collect())
    }

    fn sales_order(&self, id: SalesOrderId) -> Result<Option<SalesOrder>, StoreError> {
        Ok(self.read()?.sales_orders.get(&id).cloned())
    }

    fn sales_orders(&self) -> Result<Vec<SalesOrder>, StoreError> {
        Ok(self.read()?.sales_orders.values().cloned().collect())
    }

    fn next_purchase_order_id(&self) -> Result<PurchaseOrderId, StoreError> {
        let mut state = self.write()?;
        state.last_purchase_order_id += 1;
        Ok(PurchaseOrderId::new(state.last_purchase_order_id))
    }

    fn next_sales_order_id(&self) -> Result<SalesOrderId, StoreError> {
        let mut state = self.write()?;
        state.last_sales_order_id += 1;
        Ok(SalesOrderId::new(state.last_sales_order_id))
    }

    fn next_order_sequence(&self, prefix: &str, year: i32) -> Result<u64, StoreError> {
        let mut state = self.write()?;
        let seq = state
            .order_sequences
            .entry((prefix.to_string(), year))
            .or_insert(0);
        *seq += 1;
        Ok(*seq)
    }

    fn commit(&self, changes: ChangeSet) -> Result<CommitReceipt, StoreError> {
        if changes.is_empty() {
            return Ok(CommitReceipt::default());
        }

        let mut state = self.write()?;
        state.validate(&changes)?;
        Ok(state.apply(changes))
    }
}
