//! Service-level error type shared by the ledger and the order workflows.

use thiserror::Error;

use stockledger_core::DomainError;

use crate::store::StoreError;

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Error returned by every ledger and workflow operation.
///
/// Domain errors and store errors are both folded into this enum. Only
/// `ConcurrencyConflict` is transient; everything else fails fast.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate resource: {0}")]
    DuplicateResource(String),

    #[error("insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("validation failed: {0}")]
    Validation(String),

    /// Optimistic concurrency failure that survived every retry.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("deadline exceeded: {0}")]
    Timeout(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Whether retrying the whole operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::ConcurrencyConflict(_))
    }
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::NotFound(msg) => LedgerError::NotFound(msg),
            DomainError::DuplicateResource(msg) => LedgerError::DuplicateResource(msg),
            DomainError::InsufficientStock(msg) => LedgerError::InsufficientStock(msg),
            DomainError::InvalidState(msg) => LedgerError::InvalidState(msg),
            DomainError::Validation(msg) => LedgerError::Validation(msg),
            DomainError::InvalidId(msg) => LedgerError::Validation(msg),
            DomainError::Conflict(msg) => LedgerError::ConcurrencyConflict(msg),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => LedgerError::ConcurrencyConflict(msg),
            StoreError::Duplicate(msg) => LedgerError::DuplicateResource(msg),
            StoreError::Unavailable(msg) => LedgerError::Storage(msg),
        }
    }
}
