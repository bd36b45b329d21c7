//! Purchase order workflow: DRAFT -> (SUBMITTED) -> APPROVED -> RECEIVED.
//!
//! Receiving is the only transition with ledger effects. The order's status
//! change and every PURCHASE movement are staged into one change set, so a
//! receipt either lands completely or not at all.

use std::time::Instant;

use chrono::{DateTime, Datelike, Utc};
use tracing::info;

use stockledger_catalog::Catalog;
use stockledger_core::{AggregateRoot, PurchaseOrderId, SupplierId, UserId, WarehouseId};
use stockledger_inventory::{RecordKey, TransactionReference};
use stockledger_purchasing::{
    PurchaseOrder, PurchaseOrderDraft, PurchaseOrderLine, PurchaseOrderStatus,
};

use crate::config::EngineConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{InventoryLedger, StockPlan};
use crate::store::{CommitReceipt, LedgerStore};

#[derive(Debug, Clone)]
pub struct PurchaseOrderWorkflow<S, C> {
    ledger: InventoryLedger<S, C>,
    number_prefix: String,
}

impl<S, C> PurchaseOrderWorkflow<S, C>
where
    S: LedgerStore,
    C: Catalog,
{
    pub fn new(store: S, catalog: C) -> Self {
        Self::with_config(store, catalog, &EngineConfig::default())
    }

    pub fn with_config(store: S, catalog: C, config: &EngineConfig) -> Self {
        Self {
            ledger: InventoryLedger::with_config(store, catalog, config),
            number_prefix: config.purchase_order_prefix.clone(),
        }
    }

    pub fn ledger(&self) -> &InventoryLedger<S, C> {
        &self.ledger
    }

    /// Handle for a single request that times out once `deadline` passes.
    pub fn with_deadline(&self, deadline: Instant) -> Self
    where
        S: Clone,
        C: Clone,
    {
        Self {
            ledger: self.ledger.with_deadline(deadline),
            number_prefix: self.number_prefix.clone(),
        }
    }

    fn next_number(&self, now: DateTime<Utc>) -> LedgerResult<String> {
        let year = now.year();
        let seq = self
            .ledger
            .store()
            .next_order_sequence(&self.number_prefix, year)?;
        Ok(format!("{}-{year}-{seq:06}", self.number_prefix))
    }

    fn resolve_lines(&self, lines: &[PurchaseOrderLine]) -> LedgerResult<()> {
        for line in lines {
            let product = self.ledger.catalog().resolve_product(line.product_id)?;
            if !product.can_be_ordered() {
                return Err(LedgerError::Validation(format!(
                    "product {} is inactive",
                    product.sku
                )));
            }
        }
        Ok(())
    }

    fn load(&self, id: PurchaseOrderId) -> LedgerResult<PurchaseOrder> {
        self.ledger
            .store()
            .purchase_order(id)?
            .ok_or_else(|| LedgerError::NotFound(format!("purchase order {id}")))
    }

    /// Load, mutate and save one order in a single commit, retrying on conflict.
    fn transition<F>(
        &self,
        operation: &'static str,
        id: PurchaseOrderId,
        mut apply: F,
    ) -> LedgerResult<PurchaseOrder>
    where
        F: FnMut(&mut PurchaseOrder, &mut StockPlan<'_, S>) -> LedgerResult<()>,
    {
        let order = self.ledger.retry().run(operation, || {
            let mut order = self.load(id)?;
            let mut plan = self.ledger.plan();
            apply(&mut order, &mut plan)?;
            plan.changes_mut().save_purchase_order(order.clone());
            let receipt = self.ledger.commit(plan, operation)?;
            Ok(persisted(order, &receipt))
        })?;

        info!(
            operation,
            order = %order.po_number(),
            status = %order.status(),
            version = order.version(),
            "purchase order updated"
        );
        Ok(order)
    }

    /// Create a DRAFT order after resolving supplier, warehouse and products.
    pub fn create(
        &self,
        supplier_id: SupplierId,
        warehouse_id: WarehouseId,
        lines: &[PurchaseOrderLine],
        header: PurchaseOrderDraft,
        actor: UserId,
    ) -> LedgerResult<PurchaseOrder> {
        let supplier = self.ledger.catalog().resolve_supplier(supplier_id)?;
        if !supplier.can_transact() {
            return Err(LedgerError::Validation(format!(
                "supplier {} is not active",
                supplier.name
            )));
        }
        self.ledger.catalog().resolve_warehouse(warehouse_id)?;
        self.resolve_lines(lines)?;

        let order = self.ledger.retry().run("create_purchase_order", || {
            let mut plan = self.ledger.plan();
            let now = plan.now();
            let id = self.ledger.store().next_purchase_order_id()?;
            let number = self.next_number(now)?;
            let order = PurchaseOrder::draft(
                id,
                number,
                supplier_id,
                warehouse_id,
                header.clone(),
                lines,
                actor,
                now,
            )?;
            plan.changes_mut().save_purchase_order(order.clone());
            let receipt = self.ledger.commit(plan, "create_purchase_order")?;
            Ok(persisted(order, &receipt))
        })?;

        info!(
            order = %order.po_number(),
            supplier = %supplier_id,
            total = %order.total_amount(),
            "purchase order created"
        );
        Ok(order)
    }

    /// Replace all items (DRAFT only).
    pub fn update(
        &self,
        id: PurchaseOrderId,
        lines: &[PurchaseOrderLine],
        header: PurchaseOrderDraft,
    ) -> LedgerResult<PurchaseOrder> {
        self.resolve_lines(lines)?;
        self.transition("update_purchase_order", id, |order, plan| {
            Ok(order.replace_items(header.clone(), lines, plan.now())?)
        })
    }

    pub fn submit(&self, id: PurchaseOrderId) -> LedgerResult<PurchaseOrder> {
        self.transition("submit_purchase_order", id, |order, plan| {
            Ok(order.submit(plan.now())?)
        })
    }

    pub fn approve(&self, id: PurchaseOrderId, actor: UserId) -> LedgerResult<PurchaseOrder> {
        self.transition("approve_purchase_order", id, |order, plan| {
            Ok(order.approve(actor, plan.now())?)
        })
    }

    /// Book every item into stock and mark the order RECEIVED.
    pub fn receive(&self, id: PurchaseOrderId, actor: UserId) -> LedgerResult<PurchaseOrder> {
        self.transition("receive_purchase_order", id, |order, plan| {
            order.ensure_receivable()?;
            let reference = Some(TransactionReference::PurchaseOrder(order.order_id()));
            let notes = format!("Received from PO: {}", order.po_number());
            for item in order.items() {
                plan.receive(
                    RecordKey::new(item.product_id, order.warehouse_id()),
                    item.quantity_ordered,
                    Some(item.unit_price),
                    reference,
                    &notes,
                    actor,
                )?;
            }
            Ok(order.mark_received(plan.now())?)
        })
    }

    pub fn cancel(&self, id: PurchaseOrderId) -> LedgerResult<PurchaseOrder> {
        self.transition("cancel_purchase_order", id, |order, plan| {
            Ok(order.cancel(plan.now())?)
        })
    }

    pub fn delete(&self, id: PurchaseOrderId) -> LedgerResult<()> {
        let number = self.ledger.retry().run("delete_purchase_order", || {
            let order = self.load(id)?;
            order.ensure_deletable()?;
            let mut plan = self.ledger.plan();
            plan.changes_mut().delete_purchase_order(&order);
            self.ledger.commit(plan, "delete_purchase_order")?;
            Ok(order.po_number().to_string())
        })?;

        info!(order = %number, "purchase order deleted");
        Ok(())
    }

    pub fn get(&self, id: PurchaseOrderId) -> LedgerResult<PurchaseOrder> {
        self.load(id)
    }

    pub fn get_by_number(&self, po_number: &str) -> LedgerResult<PurchaseOrder> {
        self.list()?
            .into_iter()
            .find(|o| o.po_number() == po_number)
            .ok_or_else(|| LedgerError::NotFound(format!("purchase order {po_number}")))
    }

    /// All orders, by id.
    pub fn list(&self) -> LedgerResult<Vec<PurchaseOrder>> {
        Ok(self.ledger.store().purchase_orders()?)
    }

    pub fn list_by_status(&self, status: PurchaseOrderStatus) -> LedgerResult<Vec<PurchaseOrder>> {
        self.filtered(|o| o.status() == status)
    }

    pub fn list_by_supplier(&self, supplier_id: SupplierId) -> LedgerResult<Vec<PurchaseOrder>> {
        self.filtered(|o| o.supplier_id() == supplier_id)
    }

    /// Orders awaiting goods (SUBMITTED or APPROVED).
    pub fn pending(&self) -> LedgerResult<Vec<PurchaseOrder>> {
        self.filtered(PurchaseOrder::is_pending)
    }

    fn filtered<P>(&self, predicate: P) -> LedgerResult<Vec<PurchaseOrder>>
    where
        P: Fn(&PurchaseOrder) -> bool,
    {
        Ok(self.list()?.into_iter().filter(|o| predicate(o)).collect())
    }
}

fn persisted(mut order: PurchaseOrder, receipt: &CommitReceipt) -> PurchaseOrder {
    if let Some(version) = receipt.purchase_order_versions.get(&order.order_id()) {
        order.mark_persisted(*version);
    }
    order
}
