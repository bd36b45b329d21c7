//! Sales Orders domain module.
//!
//! This crate contains business rules for sales orders, implemented purely as
//! deterministic domain logic (no IO, no storage). Reservations and shipments
//! against the inventory ledger are driven by the infrastructure layer.

pub mod order;

pub use order::{
    PaymentStatus, SalesOrder, SalesOrderDraft, SalesOrderItem, SalesOrderLine, SalesOrderStatus,
    SalesTotals,
};
