use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, Entity, WarehouseId};

/// Catalog view of a warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    /// Unique short code (e.g. "WH-EAST").
    pub code: String,
    pub name: String,
    pub active: bool,
}

impl Warehouse {
    pub fn new(id: WarehouseId, code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            code: code.into(),
            name: name.into(),
            active: true,
        }
    }

    pub(crate) fn validate(&self) -> DomainResult<()> {
        if self.code.trim().is_empty() {
            return Err(DomainError::validation("warehouse code cannot be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("warehouse name cannot be empty"));
        }
        Ok(())
    }
}

impl Entity for Warehouse {
    type Id = WarehouseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
