//! Storage boundary for ledger records, the transaction log and orders.
//!
//! Services never write rows one at a time. They stage every write of a
//! business operation into a [`ChangeSet`] and hand it to
//! [`LedgerStore::commit`], which applies all of it or none of it.

pub mod change_set;
pub mod in_memory;
pub mod r#trait;

pub use change_set::{ChangeSet, CommitReceipt};
pub use in_memory::InMemoryLedgerStore;
pub use r#trait::{LedgerStore, StoreError, Versioned};
