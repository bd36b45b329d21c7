//! Catalog lookup boundary.
//!
//! Products, warehouses, suppliers and customers are owned by collaborators
//! outside the ledger. This crate defines the read-only view the ledger and
//! the order workflows need, plus an in-memory catalog for tests/dev.

pub mod lookup;
pub mod party;
pub mod product;
pub mod warehouse;

pub use lookup::{Catalog, InMemoryCatalog};
pub use party::{ContactInfo, Customer, PartyStatus, Supplier};
pub use product::{Product, DEFAULT_REORDER_POINT, DEFAULT_REORDER_QUANTITY};
pub use warehouse::Warehouse;
