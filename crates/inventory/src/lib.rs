//! Inventory ledger domain module.
//!
//! Quantity bookkeeping for (product, warehouse) stock records and the shape
//! of the immutable transaction log, implemented purely as deterministic
//! domain logic (no IO, no storage, no locking).

pub mod record;
pub mod transaction;

pub use record::{InventoryRecord, RecordKey, StockMovement};
pub use transaction::{
    InventoryTransaction, PendingTransaction, TransactionReference, TransactionType,
};
