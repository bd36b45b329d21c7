//! Demo driver: runs a purchase-to-sale cycle against the in-memory store
//! and prints the resulting stock picture as JSON.

use std::sync::Arc;

use anyhow::{Context, Result};
use rust_decimal_macros::dec;
use serde_json::json;

use stockledger_catalog::{Customer, InMemoryCatalog, Product, Supplier, Warehouse};
use stockledger_core::{CustomerId, ProductId, SupplierId, UserId, WarehouseId};
use stockledger_infra::{
    EngineConfig, InMemoryLedgerStore, InventoryLedger, PurchaseOrderWorkflow, SalesOrderWorkflow,
};
use stockledger_inventory::TransactionType;
use stockledger_purchasing::{PurchaseOrderDraft, PurchaseOrderLine};
use stockledger_sales::{PaymentStatus, SalesOrderDraft, SalesOrderLine};

const KETTLE: ProductId = ProductId::new(1);
const TOASTER: ProductId = ProductId::new(2);
const CENTRAL: WarehouseId = WarehouseId::new(1);
const OUTLET: WarehouseId = WarehouseId::new(2);
const SUPPLIER: SupplierId = SupplierId::new(1);
const CUSTOMER: CustomerId = CustomerId::new(1);

fn seed_catalog(config: &EngineConfig) -> Result<InMemoryCatalog> {
    let catalog = InMemoryCatalog::new();
    catalog.insert_product(
        Product::new(KETTLE, "KT-100", "Electric Kettle")
            .with_prices(dec!(12.50), dec!(29.99))
            .with_reorder_point(config.default_reorder_point),
    )?;
    catalog.insert_product(
        Product::new(TOASTER, "TS-200", "Two-Slice Toaster")
            .with_prices(dec!(18.00), dec!(39.99))
            .with_reorder_point(5),
    )?;
    catalog.insert_warehouse(Warehouse::new(CENTRAL, "CEN", "Central"))?;
    catalog.insert_warehouse(Warehouse::new(OUTLET, "OUT", "Outlet"))?;
    catalog.insert_supplier(Supplier::new(SUPPLIER, "Homeware Wholesale"))?;
    catalog.insert_customer(Customer::new(CUSTOMER, "Corner Shop"))?;
    Ok(catalog)
}

fn main() -> Result<()> {
    stockledger_observability::init();

    let config = EngineConfig::from_env().context("failed to load engine configuration")?;
    tracing::info!(?config, "starting stockledger demo");

    let store = Arc::new(InMemoryLedgerStore::new());
    let catalog = Arc::new(seed_catalog(&config).context("failed to seed catalog")?);

    let ledger = InventoryLedger::with_config(store.clone(), catalog.clone(), &config);
    let purchasing = PurchaseOrderWorkflow::with_config(store.clone(), catalog.clone(), &config);
    let sales = SalesOrderWorkflow::with_config(store, catalog, &config);

    let buyer = UserId::new();
    let manager = UserId::new();

    ledger.adjust(KETTLE, CENTRAL, 40, "opening balance", buyer)?;

    let po = purchasing.create(
        SUPPLIER,
        CENTRAL,
        &[
            PurchaseOrderLine::new(KETTLE, 60, dec!(12.00)),
            PurchaseOrderLine::new(TOASTER, 25, dec!(17.50)),
        ],
        PurchaseOrderDraft {
            notes: Some("spring restock".to_string()),
            ..PurchaseOrderDraft::default()
        },
        buyer,
    )?;
    purchasing.submit(po.order_id())?;
    purchasing.approve(po.order_id(), manager)?;
    let po = purchasing
        .receive(po.order_id(), buyer)
        .context("failed to receive purchase order")?;

    let so = sales.create(
        CUSTOMER,
        CENTRAL,
        &[
            SalesOrderLine::new(KETTLE, 30, dec!(29.99)),
            SalesOrderLine {
                tax_rate: dec!(8.25),
                discount_percent: dec!(10),
                ..SalesOrderLine::new(TOASTER, 22, dec!(39.99))
            },
        ],
        SalesOrderDraft {
            payment_method: Some("invoice".to_string()),
            ..SalesOrderDraft::default()
        },
        buyer,
    )?;
    sales.confirm(so.order_id())?;
    sales.ship(so.order_id(), buyer)?;
    sales.deliver(so.order_id())?;
    let so = sales.record_payment(so.order_id(), PaymentStatus::Paid)?;

    ledger.transfer(KETTLE, CENTRAL, OUTLET, 15, manager)?;

    let report = json!({
        "purchase_order": po,
        "sales_order": so,
        "stock": [
            ledger.stock_view(KETTLE, CENTRAL)?,
            ledger.stock_view(KETTLE, OUTLET)?,
            ledger.stock_view(TOASTER, CENTRAL)?,
        ],
        "total_kettles": ledger.total_stock(KETTLE)?,
        "low_stock": ledger.low_stock()?,
        "sales": ledger.transactions_by_type(TransactionType::Sale)?,
    });

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to render report")?
    );
    Ok(())
}
