//! Purchasing domain module (purchase orders).
//!
//! This crate contains the purchase-order aggregate and its state machine,
//! implemented purely as deterministic domain logic (no IO, no storage). The
//! ledger side effects of receiving goods are driven by the infrastructure
//! layer.

pub mod order;

pub use order::{
    PurchaseOrder, PurchaseOrderDraft, PurchaseOrderItem, PurchaseOrderLine, PurchaseOrderStatus,
};
