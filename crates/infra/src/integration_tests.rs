//! Integration tests across the ledger, both workflows and the store.
//!
//! Verifies:
//! - The end-to-end stock scenarios (load, reserve, sell, restock)
//! - Concurrent reservations never oversell a record
//! - Transfers conserve stock and never apply one leg alone
//! - Conflicting commits are retried and never partially applied

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    use stockledger_catalog::{Customer, InMemoryCatalog, Product, Supplier, Warehouse};
    use stockledger_core::{
        CustomerId, ProductId, PurchaseOrderId, SalesOrderId, SupplierId, UserId, WarehouseId,
    };
    use stockledger_inventory::{
        InventoryRecord, InventoryTransaction, RecordKey, TransactionType,
    };
    use stockledger_purchasing::{PurchaseOrder, PurchaseOrderDraft, PurchaseOrderLine};
    use stockledger_sales::{SalesOrder, SalesOrderDraft, SalesOrderLine};

    use crate::error::LedgerError;
    use crate::ledger::InventoryLedger;
    use crate::purchasing::PurchaseOrderWorkflow;
    use crate::retry::RetryPolicy;
    use crate::sales::SalesOrderWorkflow;
    use crate::store::{
        ChangeSet, CommitReceipt, InMemoryLedgerStore, LedgerStore, StoreError, Versioned,
    };

    const P1: ProductId = ProductId::new(1);
    const W1: WarehouseId = WarehouseId::new(1);
    const W2: WarehouseId = WarehouseId::new(2);
    const SUPPLIER: SupplierId = SupplierId::new(1);
    const CUSTOMER: CustomerId = CustomerId::new(1);

    struct Engine {
        ledger: InventoryLedger<Arc<InMemoryLedgerStore>, Arc<InMemoryCatalog>>,
        purchasing: PurchaseOrderWorkflow<Arc<InMemoryLedgerStore>, Arc<InMemoryCatalog>>,
        sales: SalesOrderWorkflow<Arc<InMemoryLedgerStore>, Arc<InMemoryCatalog>>,
        actor: UserId,
    }

    fn test_catalog() -> Arc<InMemoryCatalog> {
        let catalog = InMemoryCatalog::new();
        catalog
            .insert_product(
                Product::new(P1, "P1", "Product One").with_prices(dec!(4.00), dec!(10.00)),
            )
            .unwrap();
        catalog
            .insert_warehouse(Warehouse::new(W1, "W1", "North"))
            .unwrap();
        catalog
            .insert_warehouse(Warehouse::new(W2, "W2", "South"))
            .unwrap();
        catalog
            .insert_supplier(Supplier::new(SUPPLIER, "Supplies Inc"))
            .unwrap();
        catalog
            .insert_customer(Customer::new(CUSTOMER, "Retail Co"))
            .unwrap();
        Arc::new(catalog)
    }

    fn setup() -> Engine {
        let store = Arc::new(InMemoryLedgerStore::new());
        let catalog = test_catalog();
        Engine {
            ledger: InventoryLedger::new(store.clone(), catalog.clone()),
            purchasing: PurchaseOrderWorkflow::new(store.clone(), catalog.clone()),
            sales: SalesOrderWorkflow::new(store, catalog),
            actor: UserId::new(),
        }
    }

    fn record(engine: &Engine) -> InventoryRecord {
        engine.ledger.get_record(P1, W1).unwrap()
    }

    fn sell(engine: &Engine, quantity: i64) -> Result<SalesOrder, LedgerError> {
        engine.sales.create(
            CUSTOMER,
            W1,
            &[SalesOrderLine::new(P1, quantity, dec!(10.00))],
            SalesOrderDraft::default(),
            engine.actor,
        )
    }

    fn purchase(engine: &Engine, quantity: i64) -> PurchaseOrder {
        engine
            .purchasing
            .create(
                SUPPLIER,
                W1,
                &[PurchaseOrderLine::new(P1, quantity, dec!(4.00))],
                PurchaseOrderDraft::default(),
                engine.actor,
            )
            .unwrap()
    }

    #[test]
    fn scenario_a_initial_load() {
        let engine = setup();
        engine
            .ledger
            .adjust(P1, W1, 100, "initial load", engine.actor)
            .unwrap();

        let r = record(&engine);
        assert_eq!(r.quantity_on_hand(), 100);
        assert_eq!(r.quantity_available(), 100);
    }

    #[test]
    fn scenario_b_reserve_and_reject_overcommit() {
        let engine = setup();
        engine
            .ledger
            .adjust(P1, W1, 100, "initial load", engine.actor)
            .unwrap();

        engine.ledger.reserve(P1, W1, 30).unwrap();
        let r = record(&engine);
        assert_eq!(r.quantity_reserved(), 30);
        assert_eq!(r.quantity_available(), 70);

        let err = engine.ledger.reserve(P1, W1, 80).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientStock(_)));
        assert_eq!(record(&engine), r);
    }

    #[test]
    fn scenario_c_and_d_sell_then_restock() {
        let engine = setup();
        engine
            .ledger
            .adjust(P1, W1, 100, "initial load", engine.actor)
            .unwrap();

        // C: sell 30
        let order = sell(&engine, 30).unwrap();
        assert_eq!(record(&engine).quantity_reserved(), 30);

        engine.sales.confirm(order.order_id()).unwrap();
        engine.sales.ship(order.order_id(), engine.actor).unwrap();
        let r = record(&engine);
        assert_eq!((r.quantity_on_hand(), r.quantity_reserved()), (70, 0));

        let sale = &engine
            .ledger
            .transactions_by_type(TransactionType::Sale)
            .unwrap()[0];
        assert_eq!(sale.quantity_change, -30);

        // D: buy 50
        let po = purchase(&engine, 50);
        engine.purchasing.approve(po.order_id(), engine.actor).unwrap();
        engine.purchasing.receive(po.order_id(), engine.actor).unwrap();
        assert_eq!(record(&engine).quantity_on_hand(), 120);

        let purchases = engine
            .ledger
            .transactions_by_type(TransactionType::Purchase)
            .unwrap();
        assert_eq!(purchases.len(), 1);
        assert_eq!(purchases[0].quantity_change, 50);

        let err = engine
            .purchasing
            .receive(po.order_id(), engine.actor)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState(_)));
        assert_eq!(record(&engine).quantity_on_hand(), 120);
    }

    #[test]
    fn scenario_e_concurrent_reservations_do_not_oversell() {
        for _ in 0..20 {
            let engine = Arc::new(setup());
            engine
                .ledger
                .adjust(P1, W1, 70, "initial load", engine.actor)
                .unwrap();

            let barrier = Arc::new(Barrier::new(2));
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let engine = engine.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        engine.ledger.reserve(P1, W1, 60)
                    })
                })
                .collect();
            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

            let ok = results.iter().filter(|r| r.is_ok()).count();
            let short = results
                .iter()
                .filter(|r| matches!(r, Err(LedgerError::InsufficientStock(_))))
                .count();
            assert_eq!((ok, short), (1, 1), "results: {results:?}");

            let r = record(&engine);
            assert_eq!(r.quantity_reserved(), 60);
            assert!(r.quantity_reserved() <= r.quantity_on_hand());
        }
    }

    #[test]
    fn many_concurrent_reservations_never_exceed_stock() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let ledger = InventoryLedger::new(store, test_catalog())
            .with_retry_policy(RetryPolicy::new(200, Duration::ZERO));
        let actor = UserId::new();
        ledger.adjust(P1, W1, 25, "initial load", actor).unwrap();

        let threads = 16;
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let ledger = ledger.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    (0..4)
                        .filter(|_| ledger.reserve(P1, W1, 1).is_ok())
                        .count()
                })
            })
            .collect();
        let reserved: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(reserved, 25);
        let r = ledger.get_record(P1, W1).unwrap();
        assert_eq!(r.quantity_reserved(), 25);
        assert_eq!(r.quantity_available(), 0);
    }

    #[test]
    fn release_twice_never_goes_negative() {
        let engine = setup();
        engine.ledger.adjust(P1, W1, 10, "seed", engine.actor).unwrap();
        engine.ledger.reserve(P1, W1, 4).unwrap();

        engine.ledger.release(P1, W1, 4).unwrap();
        engine.ledger.release(P1, W1, 4).unwrap();
        assert_eq!(record(&engine).quantity_reserved(), 0);
    }

    #[test]
    fn transfer_conserves_total() {
        let engine = setup();
        engine.ledger.adjust(P1, W1, 40, "seed", engine.actor).unwrap();
        engine.ledger.adjust(P1, W2, 5, "seed", engine.actor).unwrap();

        engine.ledger.transfer(P1, W1, W2, 15, engine.actor).unwrap();

        let north = engine.ledger.get_record(P1, W1).unwrap().quantity_on_hand();
        let south = engine.ledger.get_record(P1, W2).unwrap().quantity_on_hand();
        assert_eq!((north, south), (25, 20));
        assert_eq!(north + south, 45);
    }

    #[test]
    fn opposing_concurrent_transfers_both_complete_and_conserve_stock() {
        for _ in 0..20 {
            let store = Arc::new(InMemoryLedgerStore::new());
            let ledger = InventoryLedger::new(store, test_catalog())
                .with_retry_policy(RetryPolicy::new(200, Duration::ZERO));
            let actor = UserId::new();
            ledger.adjust(P1, W1, 30, "seed", actor).unwrap();
            ledger.adjust(P1, W2, 30, "seed", actor).unwrap();

            let barrier = Arc::new(Barrier::new(2));
            let handles: Vec<_> = [(W1, W2), (W2, W1)]
                .into_iter()
                .map(|(from, to)| {
                    let ledger = ledger.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        ledger.transfer(P1, from, to, 10, actor)
                    })
                })
                .collect();
            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            assert!(results.iter().all(Result::is_ok), "results: {results:?}");

            let north = ledger.get_record(P1, W1).unwrap().quantity_on_hand();
            let south = ledger.get_record(P1, W2).unwrap().quantity_on_hand();
            assert_eq!(north + south, 60);
            assert_eq!((north, south), (30, 30));

            let transfers = ledger
                .transactions_by_type(TransactionType::Transfer)
                .unwrap();
            assert_eq!(transfers.len(), 2 * results.len());
            assert_eq!(transfers.iter().map(|tx| tx.quantity_change).sum::<i64>(), 0);
        }
    }

    #[test]
    fn failed_second_leg_leaves_first_leg_unapplied() {
        let engine = setup();
        engine.ledger.adjust(P1, W1, 10, "seed", engine.actor).unwrap();
        engine
            .ledger
            .adjust(P1, W2, i64::MAX - 1, "seed", engine.actor)
            .unwrap();
        let history_before = engine.ledger.transaction_history(P1, W1).unwrap().len();

        // The destination leg overflows after the source leg was staged.
        let err = engine.ledger.transfer(P1, W1, W2, 5, engine.actor).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        assert_eq!(record(&engine).quantity_on_hand(), 10);
        assert_eq!(
            engine.ledger.transaction_history(P1, W1).unwrap().len(),
            history_before
        );
        assert!(engine
            .ledger
            .transactions_by_type(TransactionType::Transfer)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn state_machine_rejects_out_of_order_ledger_transitions() {
        let engine = setup();
        engine.ledger.adjust(P1, W1, 100, "seed", engine.actor).unwrap();

        let order = sell(&engine, 10).unwrap();
        let err = engine.sales.ship(order.order_id(), engine.actor).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState(_)));

        let po = purchase(&engine, 10);
        engine.purchasing.submit(po.order_id()).unwrap();
        let err = engine
            .purchasing
            .receive(po.order_id(), engine.actor)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState(_)));

        let r = record(&engine);
        assert_eq!((r.quantity_on_hand(), r.quantity_reserved()), (100, 10));
    }

    #[test]
    fn cancelled_sales_order_returns_reserved_stock() {
        let engine = setup();
        engine.ledger.adjust(P1, W1, 50, "seed", engine.actor).unwrap();
        let order = sell(&engine, 20).unwrap();
        engine.sales.confirm(order.order_id()).unwrap();

        engine.sales.cancel(order.order_id()).unwrap();
        assert_eq!(record(&engine).quantity_available(), 50);
        assert!(matches!(
            engine.sales.cancel(order.order_id()),
            Err(LedgerError::InvalidState(_))
        ));
    }

    #[test]
    fn unknown_orders_are_not_found() {
        let engine = setup();
        assert!(matches!(
            engine.sales.confirm(SalesOrderId::new(404)),
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(
            engine.purchasing.approve(PurchaseOrderId::new(404), engine.actor),
            Err(LedgerError::NotFound(_))
        ));
    }

    /// Store whose first `failures` commits lose a version race.
    struct ContendedStore {
        inner: InMemoryLedgerStore,
        failures: AtomicU32,
    }

    impl ContendedStore {
        fn new(failures: u32) -> Self {
            Self {
                inner: InMemoryLedgerStore::new(),
                failures: AtomicU32::new(failures),
            }
        }
    }

    impl LedgerStore for ContendedStore {
        fn record(&self, key: RecordKey) -> Result<Option<Versioned<InventoryRecord>>, StoreError> {
            self.inner.record(key)
        }

        fn records(&self) -> Result<Vec<Versioned<InventoryRecord>>, StoreError> {
            self.inner.records()
        }

        fn transactions(&self) -> Result<Vec<InventoryTransaction>, StoreError> {
            self.inner.transactions()
        }

        fn transactions_for(
            &self,
            key: RecordKey,
        ) -> Result<Vec<InventoryTransaction>, StoreError> {
            self.inner.transactions_for(key)
        }

        fn purchase_order(&self, id: PurchaseOrderId) -> Result<Option<PurchaseOrder>, StoreError> {
            self.inner.purchase_order(id)
        }

        fn purchase_orders(&self) -> Result<Vec<PurchaseOrder>, StoreError> {
            self.inner.purchase_orders()
        }

        fn sales_order(&self, id: SalesOrderId) -> Result<Option<SalesOrder>, StoreError> {
            self.inner.sales_order(id)
        }

        fn sales_orders(&self) -> Result<Vec<SalesOrder>, StoreError> {
            self.inner.sales_orders()
        }

        fn next_purchase_order_id(&self) -> Result<PurchaseOrderId, StoreError> {
            self.inner.next_purchase_order_id()
        }

        fn next_sales_order_id(&self) -> Result<SalesOrderId, StoreError> {
            self.inner.next_sales_order_id()
        }

        fn next_order_sequence(&self, prefix: &str, year: i32) -> Result<u64, StoreError> {
            self.inner.next_order_sequence(prefix, year)
        }

        fn commit(&self, changes: ChangeSet) -> Result<CommitReceipt, StoreError> {
            let lost_race = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if lost_race {
                return Err(StoreError::Concurrency("simulated concurrent writer".into()));
            }
            self.inner.commit(changes)
        }
    }

    #[test]
    fn conflicts_are_retried_until_commit_succeeds() {
        let store = Arc::new(ContendedStore::new(2));
        let ledger = InventoryLedger::new(store.clone(), test_catalog())
            .with_retry_policy(RetryPolicy::new(3, Duration::ZERO));

        ledger.adjust(P1, W1, 10, "seed", UserId::new()).unwrap();
        assert_eq!(ledger.get_record(P1, W1).unwrap().quantity_on_hand(), 10);
        assert_eq!(store.transactions().unwrap().len(), 1);
    }

    #[test]
    fn exhausted_retries_surface_conflict_and_write_nothing() {
        let store = Arc::new(ContendedStore::new(5));
        let ledger = InventoryLedger::new(store.clone(), test_catalog())
            .with_retry_policy(RetryPolicy::new(2, Duration::ZERO));

        let err = ledger.adjust(P1, W1, 10, "seed", UserId::new()).unwrap_err();
        assert!(matches!(err, LedgerError::ConcurrencyConflict(_)));
        assert!(store.records().unwrap().is_empty());
        assert!(store.transactions().unwrap().is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Adjust(i64),
        Reserve(i64),
        Release(i64),
        Ship(i64),
        Transfer(i64),
        Damage(i64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (-30i64..60).prop_map(Op::Adjust),
            (1i64..40).prop_map(Op::Reserve),
            (0i64..40).prop_map(Op::Release),
            (1i64..40).prop_map(Op::Ship),
            (1i64..40).prop_map(Op::Transfer),
            (1i64..20).prop_map(Op::Damage),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: no sequence of ledger calls breaks `0 <= reserved <= on_hand`,
        /// and on-hand always equals the sum of logged changes.
        #[test]
        fn ledger_operations_preserve_record_invariants(
            ops in prop::collection::vec(op_strategy(), 1..40)
        ) {
            let engine = setup();
            let actor = engine.actor;
            for op in ops {
                let _ = match op {
                    Op::Adjust(d) => engine.ledger.adjust(P1, W1, d, "prop", actor).map(|_| ()),
                    Op::Reserve(q) => engine.ledger.reserve(P1, W1, q).map(|_| ()),
                    Op::Release(q) => engine.ledger.release(P1, W1, q).map(|_| ()),
                    Op::Ship(q) => engine.ledger.ship(P1, W1, q, None, None, actor).map(|_| ()),
                    Op::Transfer(q) => engine.ledger.transfer(P1, W1, W2, q, actor).map(|_| ()),
                    Op::Damage(q) => engine.ledger.record_damage(P1, W1, q, "prop", actor).map(|_| ()),
                };
            }

            for r in engine.ledger.all_records().unwrap() {
                prop_assert!(r.quantity_reserved() >= 0);
                prop_assert!(r.quantity_reserved() <= r.quantity_on_hand());
                let logged: i64 = engine
                    .ledger
                    .transaction_history(r.product_id(), r.warehouse_id())
                    .unwrap()
                    .iter()
                    .map(|tx| tx.quantity_change)
                    .sum();
                prop_assert_eq!(logged, r.quantity_on_hand());
            }
        }
    }
}
