//! Infrastructure layer: storage boundary, ledger service, order workflows,
//! retry policy and configuration.

pub mod config;
pub mod error;
pub mod ledger;
pub mod purchasing;
pub mod retry;
pub mod sales;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use config::{ConfigError, EngineConfig};
pub use error::{LedgerError, LedgerResult};
pub use ledger::{InventoryLedger, StockView, TransferReceipt};
pub use purchasing::PurchaseOrderWorkflow;
pub use retry::RetryPolicy;
pub use sales::SalesOrderWorkflow;
pub use store::{ChangeSet, CommitReceipt, InMemoryLedgerStore, LedgerStore, StoreError, Versioned};
