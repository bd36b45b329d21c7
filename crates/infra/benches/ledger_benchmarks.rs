use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use rust_decimal_macros::dec;
use stockledger_catalog::{Customer, InMemoryCatalog, Product, Warehouse};
use stockledger_core::{CustomerId, ProductId, UserId, WarehouseId};
use stockledger_infra::{InMemoryLedgerStore, InventoryLedger, SalesOrderWorkflow};
use stockledger_sales::{SalesOrderDraft, SalesOrderLine};

type Ledger = InventoryLedger<Arc<InMemoryLedgerStore>, Arc<InMemoryCatalog>>;

const WAREHOUSE: WarehouseId = WarehouseId::new(1);
const CUSTOMER: CustomerId = CustomerId::new(1);

fn catalog(products: u64) -> Arc<InMemoryCatalog> {
    let catalog = InMemoryCatalog::new();
    for id in 1..=products {
        catalog
            .insert_product(
                Product::new(ProductId::new(id), format!("SKU-{id}"), format!("Product {id}"))
                    .with_prices(dec!(1.00), dec!(2.00)),
            )
            .unwrap();
    }
    catalog
        .insert_warehouse(Warehouse::new(WAREHOUSE, "MAIN", "Main"))
        .unwrap();
    catalog
        .insert_customer(Customer::new(CUSTOMER, "Bench Customer"))
        .unwrap();
    Arc::new(catalog)
}

fn stocked_ledger(store: Arc<InMemoryLedgerStore>, catalog: Arc<InMemoryCatalog>, products: u64) -> Ledger {
    let ledger = InventoryLedger::new(store, catalog);
    let actor = UserId::new();
    for id in 1..=products {
        ledger
            .adjust(ProductId::new(id), WAREHOUSE, 1_000_000_000, "bench seed", actor)
            .unwrap();
    }
    ledger
}

fn bench_reserve_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("reserve_release");
    group.throughput(Throughput::Elements(2));

    let ledger = stocked_ledger(Arc::new(InMemoryLedgerStore::new()), catalog(1), 1);
    group.bench_function("single_record", |b| {
        b.iter(|| {
            ledger.reserve(ProductId::new(1), WAREHOUSE, black_box(5)).unwrap();
            ledger.release(ProductId::new(1), WAREHOUSE, black_box(5)).unwrap();
        });
    });

    group.finish();
}

fn bench_adjust_with_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("adjust_with_history");

    for history in [0usize, 100, 1_000].iter() {
        group.bench_with_input(
            BenchmarkId::new("adjust", history),
            history,
            |b, &size| {
                let ledger = stocked_ledger(Arc::new(InMemoryLedgerStore::new()), catalog(1), 1);
                let actor = UserId::new();
                for _ in 0..size {
                    ledger.adjust(ProductId::new(1), WAREHOUSE, 1, "history", actor).unwrap();
                }
                b.iter(|| {
                    black_box(
                        ledger
                            .adjust(ProductId::new(1), WAREHOUSE, 1, "bench", actor)
                            .unwrap(),
                    );
                });
            },
        );
    }

    group.finish();
}

fn bench_sales_order_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("sales_order_create");

    for lines in [1u64, 10, 50].iter() {
        group.throughput(Throughput::Elements(*lines));
        group.bench_with_input(BenchmarkId::new("lines", lines), lines, |b, &count| {
            let store = Arc::new(InMemoryLedgerStore::new());
            let catalog = catalog(count);
            stocked_ledger(store.clone(), catalog.clone(), count);
            let workflow = SalesOrderWorkflow::new(store, catalog);
            let order_lines: Vec<SalesOrderLine> = (1..=count)
                .map(|id| SalesOrderLine::new(ProductId::new(id), 1, dec!(2.00)))
                .collect();
            let actor = UserId::new();

            b.iter(|| {
                black_box(
                    workflow
                        .create(
                            CUSTOMER,
                            WAREHOUSE,
                            &order_lines,
                            SalesOrderDraft::default(),
                            actor,
                        )
                        .unwrap(),
                );
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_reserve_release,
    bench_adjust_with_history,
    bench_sales_order_create
);
criterion_main!(benches);
