//! Inventory ledger service.
//!
//! Every mutating operation follows the same shape:
//!
//! ```text
//! snapshot read -> validate on a copy -> stage record + transaction
//!   -> commit the change set (version-checked) -> retry on conflict
//! ```
//!
//! The staging half lives in [`StockPlan`] so the order workflows can stage
//! ledger effects into the same change set as their own status change.

use std::time::Instant;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use stockledger_catalog::Catalog;
use stockledger_core::{
    DomainError, ExpectedVersion, ProductId, PurchaseOrderId, SalesOrderId, UserId, WarehouseId,
};
use stockledger_inventory::{
    InventoryRecord, InventoryTransaction, PendingTransaction, RecordKey, StockMovement,
    TransactionReference, TransactionType,
};

use crate::config::EngineConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::retry::RetryPolicy;
use crate::store::{ChangeSet, CommitReceipt, LedgerStore};

/// Record plus the catalog facts needed to judge it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockView {
    pub record: InventoryRecord,
    pub product_name: String,
    pub sku: String,
    pub warehouse_name: String,
    pub quantity_available: i64,
    pub reorder_point: i64,
    pub needs_reorder: bool,
}

/// Both legs of a committed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReceipt {
    pub outbound: InventoryTransaction,
    pub inbound: InventoryTransaction,
}

/// Staged ledger effects of one business operation.
///
/// Reads fall through to the store only for records not yet touched by this
/// plan, so several movements against the same record compose.
pub(crate) struct StockPlan<'a, S: ?Sized> {
    store: &'a S,
    changes: ChangeSet,
    now: DateTime<Utc>,
}

impl<'a, S> StockPlan<'a, S>
where
    S: LedgerStore + ?Sized,
{
    pub(crate) fn new(store: &'a S, now: DateTime<Utc>) -> Self {
        Self {
            store,
            changes: ChangeSet::new(),
            now,
        }
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub(crate) fn changes_mut(&mut self) -> &mut ChangeSet {
        &mut self.changes
    }

    pub(crate) fn into_changes(self) -> ChangeSet {
        self.changes
    }

    fn existing(&self, key: RecordKey) -> LedgerResult<Option<(InventoryRecord, ExpectedVersion)>> {
        if let Some(record) = self.changes.staged_record(key) {
            return Ok(Some((record.clone(), ExpectedVersion::Any)));
        }
        Ok(self
            .store
            .record(key)?
            .map(|v| (v.value, ExpectedVersion::Exact(v.version))))
    }

    /// Load a record, creating an empty one when absent.
    fn load(&self, key: RecordKey) -> LedgerResult<(InventoryRecord, ExpectedVersion)> {
        Ok(self
            .existing(key)?
            .unwrap_or_else(|| (InventoryRecord::empty(key, self.now), ExpectedVersion::NoRow)))
    }

    fn stage(&mut self, mut record: InventoryRecord, expected: ExpectedVersion) {
        record.updated_at = self.now;
        self.changes.stage_record(record, expected);
    }

    fn log(
        &mut self,
        key: RecordKey,
        transaction_type: TransactionType,
        movement: StockMovement,
        actor: UserId,
    ) -> TransactionDraft<'_> {
        TransactionDraft {
            changes: &mut self.changes,
            tx: PendingTransaction::from_movement(key, transaction_type, movement, self.now)
                .by(actor),
        }
    }

    pub(crate) fn adjust(
        &mut self,
        key: RecordKey,
        delta: i64,
        reason: &str,
        actor: UserId,
    ) -> LedgerResult<usize> {
        let (mut record, expected) = self.load(key)?;
        let movement = record.adjust(delta)?;
        self.stage(record, expected);
        Ok(self
            .log(key, TransactionType::Adjustment, movement, actor)
            .notes(reason)
            .append())
    }

    /// Returns `None` when the count matched and no transaction was logged.
    pub(crate) fn set_on_hand(
        &mut self,
        key: RecordKey,
        quantity: i64,
        bin_location: Option<String>,
        actor: UserId,
    ) -> LedgerResult<Option<usize>> {
        let (mut record, expected) = self.load(key)?;
        let movement = record.set_on_hand(quantity)?;
        record.last_count_date = Some(self.now.date_naive());
        if bin_location.is_some() {
            record.bin_location = bin_location;
        }
        self.stage(record, expected);
        if movement.change() == 0 {
            return Ok(None);
        }
        Ok(Some(
            self.log(key, TransactionType::Adjustment, movement, actor)
                .notes("stock count")
                .append(),
        ))
    }

    pub(crate) fn reserve(&mut self, key: RecordKey, quantity: i64) -> LedgerResult<()> {
        let (mut record, expected) = self.load(key)?;
        record.reserve(quantity)?;
        self.stage(record, expected);
        Ok(())
    }

    /// Returns the quantity actually released; absent records release nothing.
    pub(crate) fn release(&mut self, key: RecordKey, quantity: i64) -> LedgerResult<i64> {
        let Some((mut record, expected)) = self.existing(key)? else {
            if quantity < 0 {
                return Err(DomainError::validation("release quantity cannot be negative").into());
            }
            return Ok(0);
        };
        let released = record.release(quantity)?;
        if released > 0 {
            self.stage(record, expected);
        }
        Ok(released)
    }

    pub(crate) fn receive(
        &mut self,
        key: RecordKey,
        quantity: i64,
        unit_cost: Option<Decimal>,
        reference: Option<TransactionReference>,
        notes: &str,
        actor: UserId,
    ) -> LedgerResult<usize> {
        let (mut record, expected) = self.load(key)?;
        let movement = record.receive(quantity)?;
        record.last_restock_date = Some(self.now.date_naive());
        self.stage(record, expected);
        Ok(self
            .log(key, TransactionType::Purchase, movement, actor)
            .unit_cost(unit_cost)
            .reference(reference)
            .notes(notes)
            .append())
    }

    pub(crate) fn ship(
        &mut self,
        key: RecordKey,
        quantity: i64,
        unit_cost: Option<Decimal>,
        reference: Option<TransactionReference>,
        notes: &str,
        actor: UserId,
    ) -> LedgerResult<usize> {
        let Some((mut record, expected)) = self.existing(key)? else {
            return Err(DomainError::insufficient_stock(format!(
                "cannot ship {quantity} of {key}: nothing reserved"
            ))
            .into());
        };
        let movement = record.ship(quantity)?;
        self.stage(record, expected);
        Ok(self
            .log(key, TransactionType::Sale, movement, actor)
            .unit_cost(unit_cost)
            .reference(reference)
            .notes(notes)
            .append())
    }

    /// Stage both legs; returns `(outbound, inbound)` transaction indexes.
    pub(crate) fn transfer(
        &mut self,
        from: RecordKey,
        to: RecordKey,
        quantity: i64,
        notes: (String, String),
        actor: UserId,
    ) -> LedgerResult<(usize, usize)> {
        let (mut source, source_expected) = self.load(from)?;
        let (mut destination, destination_expected) = self.load(to)?;

        let out = source.withdraw(quantity)?;
        let inbound = destination.receive(quantity)?;

        self.stage(source, source_expected);
        self.stage(destination, destination_expected);

        let (out_notes, in_notes) = notes;
        let out_idx = self
            .log(from, TransactionType::Transfer, out, actor)
            .notes(out_notes)
            .append();
        let in_idx = self
            .log(to, TransactionType::Transfer, inbound, actor)
            .notes(in_notes)
            .append();
        Ok((out_idx, in_idx))
    }

    pub(crate) fn record_return(
        &mut self,
        key: RecordKey,
        quantity: i64,
        reason: &str,
        actor: UserId,
    ) -> LedgerResult<usize> {
        let (mut record, expected) = self.load(key)?;
        let movement = record.receive(quantity)?;
        self.stage(record, expected);
        Ok(self
            .log(key, TransactionType::Return, movement, actor)
            .notes(reason)
            .append())
    }

    pub(crate) fn record_damage(
        &mut self,
        key: RecordKey,
        quantity: i64,
        reason: &str,
        actor: UserId,
    ) -> LedgerResult<usize> {
        let (mut record, expected) = self.load(key)?;
        let movement = record.withdraw(quantity)?;
        self.stage(record, expected);
        Ok(self
            .log(key, TransactionType::Damage, movement, actor)
            .notes(reason)
            .append())
    }
}

struct TransactionDraft<'c> {
    changes: &'c mut ChangeSet,
    tx: PendingTransaction,
}

impl TransactionDraft<'_> {
    fn notes(mut self, notes: impl Into<String>) -> Self {
        let notes = notes.into();
        if !notes.trim().is_empty() {
            self.tx = self.tx.with_notes(notes);
        }
        self
    }

    fn unit_cost(mut self, unit_cost: Option<Decimal>) -> Self {
        if let Some(cost) = unit_cost {
            self.tx = self.tx.with_unit_cost(cost);
        }
        self
    }

    fn reference(mut self, reference: Option<TransactionReference>) -> Self {
        if let Some(reference) = reference {
            self.tx = self.tx.with_reference(reference);
        }
        self
    }

    fn append(self) -> usize {
        self.changes.append_transaction(self.tx)
    }
}

pub(crate) fn committed_transaction(
    receipt: &CommitReceipt,
    index: usize,
) -> LedgerResult<InventoryTransaction> {
    receipt
        .transaction(index)
        .cloned()
        .ok_or_else(|| LedgerError::Storage("commit receipt is missing a staged transaction".into()))
}

/// Per-product, per-warehouse stock bookkeeping with an immutable history.
#[derive(Debug, Clone)]
pub struct InventoryLedger<S, C> {
    store: S,
    catalog: C,
    retry: RetryPolicy,
    default_reorder_point: i64,
}

impl<S, C> InventoryLedger<S, C>
where
    S: LedgerStore,
    C: Catalog,
{
    pub fn new(store: S, catalog: C) -> Self {
        Self::with_config(store, catalog, &EngineConfig::default())
    }

    pub fn with_config(store: S, catalog: C, config: &EngineConfig) -> Self {
        Self {
            store,
            catalog,
            retry: config.retry_policy(),
            default_reorder_point: config.default_reorder_point,
        }
    }

    /// Replace the retry policy for every later call on this handle.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Handle for a single request: shares the store and catalog, and gives
    /// up with `Timeout` once `deadline` passes. `self` keeps its own policy.
    pub fn with_deadline(&self, deadline: Instant) -> Self
    where
        S: Clone,
        C: Clone,
    {
        let mut scoped = self.clone();
        scoped.retry = scoped.retry.with_deadline(deadline);
        scoped
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub(crate) fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub(crate) fn plan(&self) -> StockPlan<'_, S> {
        StockPlan::new(&self.store, Utc::now())
    }

    /// Commit a plan unless the deadline already passed.
    pub(crate) fn commit(
        &self,
        plan: StockPlan<'_, S>,
        operation: &str,
    ) -> LedgerResult<CommitReceipt> {
        self.retry.ensure_within_deadline(operation)?;
        Ok(self.store.commit(plan.into_changes())?)
    }

    fn ensure_location(&self, product_id: ProductId, warehouse_id: WarehouseId) -> LedgerResult<()> {
        self.catalog.resolve_product(product_id)?;
        self.catalog.resolve_warehouse(warehouse_id)?;
        Ok(())
    }

    pub fn get_record(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> LedgerResult<InventoryRecord> {
        let key = RecordKey::new(product_id, warehouse_id);
        debug!(record = %key, "loading inventory record");
        self.store
            .record(key)?
            .map(|v| v.value)
            .ok_or_else(|| LedgerError::NotFound(format!("inventory record {key}")))
    }

    /// Add a signed delta to on-hand, creating the record if needed.
    pub fn adjust(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        delta: i64,
        reason: &str,
        actor: UserId,
    ) -> LedgerResult<InventoryTransaction> {
        self.ensure_location(product_id, warehouse_id)?;
        let key = RecordKey::new(product_id, warehouse_id);

        let (receipt, idx) = self.retry.run("adjust", || {
            let mut plan = self.plan();
            let idx = plan.adjust(key, delta, reason, actor)?;
            Ok((self.commit(plan, "adjust")?, idx))
        })?;

        let tx = committed_transaction(&receipt, idx)?;
        info!(record = %key, delta, on_hand = tx.quantity_after, "inventory adjusted");
        Ok(tx)
    }

    /// Replace on-hand with a physical count.
    pub fn set_on_hand(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: i64,
        bin_location: Option<String>,
        actor: UserId,
    ) -> LedgerResult<InventoryRecord> {
        self.ensure_location(product_id, warehouse_id)?;
        let key = RecordKey::new(product_id, warehouse_id);

        let receipt = self.retry.run("set_on_hand", || {
            let mut plan = self.plan();
            plan.set_on_hand(key, quantity, bin_location.clone(), actor)?;
            self.commit(plan, "set_on_hand")
        })?;

        info!(record = %key, on_hand = quantity, "inventory counted");
        receipt
            .record(key)
            .cloned()
            .ok_or_else(|| LedgerError::Storage(format!("record {key} missing after commit")))
    }

    /// Move unreserved stock between warehouses; both legs commit together.
    pub fn transfer(
        &self,
        product_id: ProductId,
        from_warehouse: WarehouseId,
        to_warehouse: WarehouseId,
        quantity: i64,
        actor: UserId,
    ) -> LedgerResult<TransferReceipt> {
        if from_warehouse == to_warehouse {
            return Err(LedgerError::Validation(
                "cannot transfer to the same warehouse".into(),
            ));
        }
        if quantity <= 0 {
            return Err(LedgerError::Validation(
                "transfer quantity must be positive".into(),
            ));
        }
        self.catalog.resolve_product(product_id)?;
        let source = self.catalog.resolve_warehouse(from_warehouse)?;
        let destination = self.catalog.resolve_warehouse(to_warehouse)?;

        let from = RecordKey::new(product_id, from_warehouse);
        let to = RecordKey::new(product_id, to_warehouse);

        let (receipt, (out_idx, in_idx)) = self.retry.run("transfer", || {
            let mut plan = self.plan();
            let notes = (
                format!("Transfer to {}", destination.name),
                format!("Transfer from {}", source.name),
            );
            let idx = plan.transfer(from, to, quantity, notes, actor)?;
            Ok((self.commit(plan, "transfer")?, idx))
        })?;

        info!(product = %product_id, from = %from_warehouse, to = %to_warehouse, quantity, "stock transferred");
        Ok(TransferReceipt {
            outbound: committed_transaction(&receipt, out_idx)?,
            inbound: committed_transaction(&receipt, in_idx)?,
        })
    }

    /// Commit available stock. An absent record counts as zero stock.
    pub fn reserve(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: i64,
    ) -> LedgerResult<InventoryRecord> {
        let key = RecordKey::new(product_id, warehouse_id);

        let receipt = self.retry.run("reserve", || {
            let mut plan = self.plan();
            plan.reserve(key, quantity)?;
            self.commit(plan, "reserve")
        })?;

        debug!(record = %key, quantity, "stock reserved");
        receipt
            .record(key)
            .cloned()
            .ok_or_else(|| LedgerError::Storage(format!("record {key} missing after commit")))
    }

    /// Give back reserved stock, clamping at zero. Returns the amount released.
    pub fn release(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: i64,
    ) -> LedgerResult<i64> {
        let key = RecordKey::new(product_id, warehouse_id);

        let released = self.retry.run("release", || {
            let mut plan = self.plan();
            let released = plan.release(key, quantity)?;
            self.commit(plan, "release")?;
            Ok(released)
        })?;

        debug!(record = %key, requested = quantity, released, "stock released");
        Ok(released)
    }

    pub fn receive(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: i64,
        unit_cost: Option<Decimal>,
        reference: Option<PurchaseOrderId>,
        actor: UserId,
    ) -> LedgerResult<InventoryTransaction> {
        self.ensure_location(product_id, warehouse_id)?;
        let key = RecordKey::new(product_id, warehouse_id);
        let reference = reference.map(TransactionReference::PurchaseOrder);

        let (receipt, idx) = self.retry.run("receive", || {
            let mut plan = self.plan();
            let idx = plan.receive(key, quantity, unit_cost, reference, "", actor)?;
            Ok((self.commit(plan, "receive")?, idx))
        })?;

        info!(record = %key, quantity, "stock received");
        committed_transaction(&receipt, idx)
    }

    /// Remove reserved stock from on-hand.
    pub fn ship(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: i64,
        reference: Option<SalesOrderId>,
        unit_cost: Option<Decimal>,
        actor: UserId,
    ) -> LedgerResult<InventoryTransaction> {
        let key = RecordKey::new(product_id, warehouse_id);
        let reference = reference.map(TransactionReference::SalesOrder);

        let (receipt, idx) = self.retry.run("ship", || {
            let mut plan = self.plan();
            let idx = plan.ship(key, quantity, unit_cost, reference, "", actor)?;
            Ok((self.commit(plan, "ship")?, idx))
        })?;

        info!(record = %key, quantity, "stock shipped");
        committed_transaction(&receipt, idx)
    }

    pub fn record_return(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: i64,
        reason: &str,
        actor: UserId,
    ) -> LedgerResult<InventoryTransaction> {
        self.ensure_location(product_id, warehouse_id)?;
        let key = RecordKey::new(product_id, warehouse_id);

        let (receipt, idx) = self.retry.run("record_return", || {
            let mut plan = self.plan();
            let idx = plan.record_return(key, quantity, reason, actor)?;
            Ok((self.commit(plan, "record_return")?, idx))
        })?;

        info!(record = %key, quantity, "return recorded");
        committed_transaction(&receipt, idx)
    }

    pub fn record_damage(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: i64,
        reason: &str,
        actor: UserId,
    ) -> LedgerResult<InventoryTransaction> {
        let key = RecordKey::new(product_id, warehouse_id);

        let (receipt, idx) = self.retry.run("record_damage", || {
            let mut plan = self.plan();
            let idx = plan.record_damage(key, quantity, reason, actor)?;
            Ok((self.commit(plan, "record_damage")?, idx))
        })?;

        info!(record = %key, quantity, "damage recorded");
        committed_transaction(&receipt, idx)
    }

    /// Sum of on-hand across warehouses; zero when the product has no records.
    pub fn total_stock(&self, product_id: ProductId) -> LedgerResult<i64> {
        Ok(self
            .records_for_product(product_id)?
            .iter()
            .map(InventoryRecord::quantity_on_hand)
            .sum())
    }

    fn reorder_point(&self, product_id: ProductId) -> LedgerResult<i64> {
        match self.catalog.resolve_product(product_id) {
            Ok(product) => Ok(product.reorder_point),
            Err(DomainError::NotFound(_)) => Ok(self.default_reorder_point),
            Err(err) => Err(err.into()),
        }
    }

    /// Records at or below their product's reorder point.
    pub fn low_stock(&self) -> LedgerResult<Vec<InventoryRecord>> {
        let mut low = Vec::new();
        for record in self.all_records()? {
            if record.quantity_on_hand() <= self.reorder_point(record.product_id())? {
                low.push(record);
            }
        }
        Ok(low)
    }

    pub fn out_of_stock(&self) -> LedgerResult<Vec<InventoryRecord>> {
        Ok(self
            .all_records()?
            .into_iter()
            .filter(InventoryRecord::is_out_of_stock)
            .collect())
    }

    pub fn records_for_product(&self, product_id: ProductId) -> LedgerResult<Vec<InventoryRecord>> {
        Ok(self
            .all_records()?
            .into_iter()
            .filter(|r| r.product_id() == product_id)
            .collect())
    }

    pub fn records_for_warehouse(
        &self,
        warehouse_id: WarehouseId,
    ) -> LedgerResult<Vec<InventoryRecord>> {
        Ok(self
            .all_records()?
            .into_iter()
            .filter(|r| r.warehouse_id() == warehouse_id)
            .collect())
    }

    pub fn all_records(&self) -> LedgerResult<Vec<InventoryRecord>> {
        Ok(self.store.records()?.into_iter().map(|v| v.value).collect())
    }

    pub fn check_availability(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: i64,
    ) -> LedgerResult<bool> {
        let available = self
            .store
            .record(RecordKey::new(product_id, warehouse_id))?
            .map(|v| v.value.quantity_available())
            .unwrap_or(0);
        Ok(available >= quantity)
    }

    /// Transactions for one record, newest first.
    pub fn transaction_history(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> LedgerResult<Vec<InventoryTransaction>> {
        let mut history = self
            .store
            .transactions_for(RecordKey::new(product_id, warehouse_id))?;
        history.reverse();
        Ok(history)
    }

    /// Transactions of one type across all records, newest first.
    pub fn transactions_by_type(
        &self,
        transaction_type: TransactionType,
    ) -> LedgerResult<Vec<InventoryTransaction>> {
        let mut matching: Vec<_> = self
            .store
            .transactions()?
            .into_iter()
            .filter(|tx| tx.transaction_type == transaction_type)
            .collect();
        matching.reverse();
        Ok(matching)
    }

    pub fn stock_view(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> LedgerResult<StockView> {
        let record = self.get_record(product_id, warehouse_id)?;
        let product = self.catalog.resolve_product(product_id)?;
        let warehouse = self.catalog.resolve_warehouse(warehouse_id)?;
        Ok(StockView {
            quantity_available: record.quantity_available(),
            reorder_point: product.reorder_point,
            needs_reorder: product.needs_reorder(record.quantity_on_hand()),
            product_name: product.name,
            sku: product.sku,
            warehouse_name: warehouse.name,
            record,
        })
    }
}
