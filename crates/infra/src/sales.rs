//! Sales order workflow: PENDING -> CONFIRMED -> SHIPPED -> DELIVERED.
//!
//! A PENDING or CONFIRMED order holds reservations for all of its items.
//! Creating, updating, shipping, cancelling and deleting stage their ledger
//! effects into the same change set as the order write.

use std::time::Instant;

use chrono::{DateTime, Datelike, Utc};
use tracing::info;

use stockledger_catalog::Catalog;
use stockledger_core::{AggregateRoot, CustomerId, SalesOrderId, UserId, WarehouseId};
use stockledger_inventory::{RecordKey, TransactionReference};
use stockledger_sales::{
    PaymentStatus, SalesOrder, SalesOrderDraft, SalesOrderLine, SalesOrderStatus,
};

use crate::config::EngineConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{InventoryLedger, StockPlan};
use crate::store::{CommitReceipt, LedgerStore};

#[derive(Debug, Clone)]
pub struct SalesOrderWorkflow<S, C> {
    ledger: InventoryLedger<S, C>,
    number_prefix: String,
}

impl<S, C> SalesOrderWorkflow<S, C>
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
            number_prefix: config.sales_order_prefix.clone(),
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

    fn resolve_lines(&self, lines: &[SalesOrderLine]) -> LedgerResult<()> {
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

    fn load(&self, id: SalesOrderId) -> LedgerResult<SalesOrder> {
        self.ledger
            .store()
            .sales_order(id)?
            .ok_or_else(|| LedgerError::NotFound(format!("sales order {id}")))
    }

    fn reserve_all(order: &SalesOrder, plan: &mut StockPlan<'_, S>) -> LedgerResult<()> {
        for (product_id, quantity) in order.quantities_by_product()? {
            plan.reserve(RecordKey::new(product_id, order.warehouse_id()), quantity)?;
        }
        Ok(())
    }

    fn release_all(order: &SalesOrder, plan: &mut StockPlan<'_, S>) -> LedgerResult<()> {
        for (product_id, quantity) in order.quantities_by_product()? {
            plan.release(RecordKey::new(product_id, order.warehouse_id()), quantity)?;
        }
        Ok(())
    }

    /// Load, mutate and save one order in a single commit, retrying on conflict.
    fn transition<F>(
        &self,
        operation: &'static str,
        id: SalesOrderId,
        mut apply: F,
    ) -> LedgerResult<SalesOrder>
    where
        F: FnMut(&mut SalesOrder, &mut StockPlan<'_, S>) -> LedgerResult<()>,
    {
        let order = self.ledger.retry().run(operation, || {
            let mut order = self.load(id)?;
            let mut plan = self.ledger.plan();
            apply(&mut order, &mut plan)?;
            plan.changes_mut().save_sales_order(order.clone());
            let receipt = self.ledger.commit(plan, operation)?;
            Ok(persisted(order, &receipt))
        })?;

        info!(
            operation,
            order = %order.so_number(),
            status = %order.status(),
            version = order.version(),
            "sales order updated"
        );
        Ok(order)
    }

    /// Create a PENDING order and reserve every item, all or nothing.
    pub fn create(
        &self,
        customer_id: CustomerId,
        warehouse_id: WarehouseId,
        lines: &[SalesOrderLine],
        header: SalesOrderDraft,
        actor: UserId,
    ) -> LedgerResult<SalesOrder> {
        let customer = self.ledger.catalog().resolve_customer(customer_id)?;
        if !customer.can_transact() {
            return Err(LedgerError::Validation(format!(
                "customer {} is not active",
                customer.name
            )));
        }
        self.ledger.catalog().resolve_warehouse(warehouse_id)?;
        self.resolve_lines(lines)?;

        let order = self.ledger.retry().run("create_sales_order", || {
            let mut plan = self.ledger.plan();
            let now = plan.now();
            let id = self.ledger.store().next_sales_order_id()?;
            let number = self.next_number(now)?;
            let order = SalesOrder::pending(
                id,
                number,
                customer_id,
                warehouse_id,
                header.clone(),
                lines,
                actor,
                now,
            )?;
            Self::reserve_all(&order, &mut plan)?;
            plan.changes_mut().save_sales_order(order.clone());
            let receipt = self.ledger.commit(plan, "create_sales_order")?;
            Ok(persisted(order, &receipt))
        })?;

        info!(
            order = %order.so_number(),
            customer = %customer_id,
            total = %order.total_amount(),
            "sales order created"
        );
        Ok(order)
    }

    /// Replace all items (PENDING only), moving reservations to the new lines.
    pub fn update(
        &self,
        id: SalesOrderId,
        lines: &[SalesOrderLine],
        header: SalesOrderDraft,
    ) -> LedgerResult<SalesOrder> {
        self.resolve_lines(lines)?;
        self.transition("update_sales_order", id, |order, plan| {
            let previous = order.clone();
            order.replace_items(header.clone(), lines, plan.now())?;
            Self::release_all(&previous, plan)?;
            Self::reserve_all(order, plan)
        })
    }

    pub fn confirm(&self, id: SalesOrderId) -> LedgerResult<SalesOrder> {
        self.transition("confirm_sales_order", id, |order, plan| {
            Ok(order.confirm(plan.now())?)
        })
    }

    /// Ship every item from stock, consuming its reservation.
    pub fn ship(&self, id: SalesOrderId, actor: UserId) -> LedgerResult<SalesOrder> {
        self.transition("ship_sales_order", id, |order, plan| {
            order.ensure_shippable()?;
            let reference = Some(TransactionReference::SalesOrder(order.order_id()));
            let notes = format!("Sale from SO: {}", order.so_number());
            for item in order.items() {
                let product = self.ledger.catalog().resolve_product(item.product_id)?;
                plan.ship(
                    RecordKey::new(item.product_id, order.warehouse_id()),
                    item.quantity,
                    Some(product.cost_price),
                    reference,
                    &notes,
                    actor,
                )?;
            }
            Ok(order.mark_shipped(plan.now())?)
        })
    }

    pub fn deliver(&self, id: SalesOrderId) -> LedgerResult<SalesOrder> {
        self.transition("deliver_sales_order", id, |order, plan| {
            Ok(order.deliver(plan.now())?)
        })
    }

    /// Cancel; stock is released unless it has already shipped.
    pub fn cancel(&self, id: SalesOrderId) -> LedgerResult<SalesOrder> {
        self.transition("cancel_sales_order", id, |order, plan| {
            let held = order.holds_reservations();
            order.cancel(plan.now())?;
            if held {
                Self::release_all(order, plan)?;
            }
            Ok(())
        })
    }

    /// Delete the order, releasing any reservations it still holds.
    pub fn delete(&self, id: SalesOrderId) -> LedgerResult<()> {
        let number = self.ledger.retry().run("delete_sales_order", || {
            let order = self.load(id)?;
            order.ensure_deletable()?;
            let mut plan = self.ledger.plan();
            if order.holds_reservations() {
                Self::release_all(&order, &mut plan)?;
            }
            plan.changes_mut().delete_sales_order(&order);
            self.ledger.commit(plan, "delete_sales_order")?;
            Ok(order.so_number().to_string())
        })?;

        info!(order = %number, "sales order deleted");
        Ok(())
    }

    pub fn record_payment(
        &self,
        id: SalesOrderId,
        payment_status: PaymentStatus,
    ) -> LedgerResult<SalesOrder> {
        self.transition("record_payment", id, |order, plan| {
            Ok(order.record_payment(payment_status, plan.now())?)
        })
    }

    pub fn get(&self, id: SalesOrderId) -> LedgerResult<SalesOrder> {
        self.load(id)
    }

    pub fn get_by_number(&self, so_number: &str) -> LedgerResult<SalesOrder> {
        self.list()?
            .into_iter()
            .find(|o| o.so_number() == so_number)
            .ok_or_else(|| LedgerError::NotFound(format!("sales order {so_number}")))
    }

    /// All orders, by id.
    pub fn list(&self) -> LedgerResult<Vec<SalesOrder>> {
        Ok(self.ledger.store().sales_orders()?)
    }

    pub fn list_by_status(&self, status: SalesOrderStatus) -> LedgerResult<Vec<SalesOrder>> {
        self.filtered(|o| o.status() == status)
    }

    pub fn list_by_customer(&self, customer_id: CustomerId) -> LedgerResult<Vec<SalesOrder>> {
        self.filtered(|o| o.customer_id() == customer_id)
    }

    /// Orders still holding stock (PENDING or CONFIRMED).
    pub fn pending(&self) -> LedgerResult<Vec<SalesOrder>> {
        self.filtered(SalesOrder::holds_reservations)
    }

    fn filtered<P>(&self, predicate: P) -> LedgerResult<Vec<SalesOrder>>
    where
        P: Fn(&SalesOrder) -> bool,
    {
        Ok(self.list()?.into_iter().filter(|o| predicate(o)).collect())
    }
}

fn persisted(mut order: SalesOrder, receipt: &CommitReceipt) -> SalesOrder {
    if let Some(version) = receipt.sales_order_versions.get(&order.order_id()) {
        order.mark_persisted(*version);
    }
    order
}
