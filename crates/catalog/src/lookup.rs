use std::collections::HashMap;
use std::fmt::Display;
use std::sync::{Arc, PoisonError, RwLock};

use stockledger_core::{
    CustomerId, DomainError, DomainResult, Entity, ProductId, SupplierId, WarehouseId,
};

use crate::party::{validate_name, Customer, Supplier};
use crate::product::Product;
use crate::warehouse::Warehouse;

/// Read-only catalog collaborator.
///
/// Every resolver fails with `DomainError::NotFound` for unknown identifiers.
pub trait Catalog: Send + Sync {
    fn resolve_product(&self, id: ProductId) -> DomainResult<Product>;
    fn resolve_warehouse(&self, id: WarehouseId) -> DomainResult<Warehouse>;
    fn resolve_supplier(&self, id: SupplierId) -> DomainResult<Supplier>;
    fn resolve_customer(&self, id: CustomerId) -> DomainResult<Customer>;
}

impl<C> Catalog for Arc<C>
where
    C: Catalog + ?Sized,
{
    fn resolve_product(&self, id: ProductId) -> DomainResult<Product> {
        (**self).resolve_product(id)
    }

    fn resolve_warehouse(&self, id: WarehouseId) -> DomainResult<Warehouse> {
        (**self).resolve_warehouse(id)
    }

    fn resolve_supplier(&self, id: SupplierId) -> DomainResult<Supplier> {
        (**self).resolve_supplier(id)
    }

    fn resolve_customer(&self, id: CustomerId) -> DomainResult<Customer> {
        (**self).resolve_customer(id)
    }
}

#[derive(Debug, Default)]
struct CatalogState {
    products: HashMap<ProductId, Product>,
    warehouses: HashMap<WarehouseId, Warehouse>,
    suppliers: HashMap<SupplierId, Supplier>,
    customers: HashMap<CustomerId, Customer>,
}

/// In-memory catalog for tests/dev.
///
/// Enforces uniqueness of ids, product SKUs and warehouse codes.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    inner: RwLock<CatalogState>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_product(&self, product: Product) -> DomainResult<()> {
        product.validate()?;
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if state.products.values().any(|p| p.sku == product.sku) {
            return Err(DomainError::duplicate(format!("sku {} already exists", product.sku)));
        }
        let (product_id, sku) = (product.id, product.sku.clone());
        register(&mut state.products, "product", product)?;
        tracing::debug!(%product_id, %sku, "catalog product registered");
        Ok(())
    }

    pub fn insert_warehouse(&self, warehouse: Warehouse) -> DomainResult<()> {
        warehouse.validate()?;
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if state.warehouses.values().any(|w| w.code == warehouse.code) {
            return Err(DomainError::duplicate(format!(
                "warehouse code {} already exists",
                warehouse.code
            )));
        }
        register(&mut state.warehouses, "warehouse", warehouse)
    }

    pub fn insert_supplier(&self, supplier: Supplier) -> DomainResult<()> {
        validate_name(&supplier.name)?;
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        register(&mut state.suppliers, "supplier", supplier)
    }

    pub fn insert_customer(&self, customer: Customer) -> DomainResult<()> {
        validate_name(&customer.name)?;
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        register(&mut state.customers, "customer", customer)
    }

    /// All registered products, ordered by id.
    pub fn products(&self) -> Vec<Product> {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut products: Vec<_> = state.products.values().cloned().collect();
        products.sort_by_key(|p| p.id);
        products
    }
}

impl Catalog for InMemoryCatalog {
    fn resolve_product(&self, id: ProductId) -> DomainResult<Product> {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        resolve(&state.products, "product", &id)
    }

    fn resolve_warehouse(&self, id: WarehouseId) -> DomainResult<Warehouse> {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        resolve(&state.warehouses, "warehouse", &id)
    }

    fn resolve_supplier(&self, id: SupplierId) -> DomainResult<Supplier> {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        resolve(&state.suppliers, "supplier", &id)
    }

    fn resolve_customer(&self, id: CustomerId) -> DomainResult<Customer> {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        resolve(&state.customers, "customer", &id)
    }
}

/// Insert an entity under its own id; ids are unique per table.
fn register<E>(table: &mut HashMap<E::Id, E>, kind: &str, entity: E) -> DomainResult<()>
where
    E: Entity,
    E::Id: Display,
{
    let id = entity.id().clone();
    if table.contains_key(&id) {
        return Err(DomainError::duplicate(format!("{kind} {id} already exists")));
    }
    table.insert(id, entity);
    Ok(())
}

fn resolve<E>(table: &HashMap<E::Id, E>, kind: &str, id: &E::Id) -> DomainResult<E>
where
    E: Entity + Clone,
    E::Id: Display,
{
    table
        .get(id)
        .cloned()
        .ok_or_else(|| DomainError::not_found(format!("{kind} {id}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> InMemoryCatalog {
        let catalog = InMemoryCatalog::new();
        catalog
            .insert_product(Product::new(ProductId::new(1), "SKU-1", "Widget"))
            .unwrap();
        catalog
            .insert_warehouse(Warehouse::new(WarehouseId::new(1), "WH-1", "Main"))
            .unwrap();
        catalog
    }

    #[test]
    fn resolves_registered_entities() {
        let catalog = catalog();
        assert_eq!(catalog.resolve_product(ProductId::new(1)).unwrap().sku, "SKU-1");
        assert_eq!(catalog.resolve_warehouse(WarehouseId::new(1)).unwrap().name, "Main");
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let catalog = catalog();
        assert!(matches!(
            catalog.resolve_product(ProductId::new(99)),
            Err(DomainError::NotFound(_))
        ));
        assert!(matches!(
            catalog.resolve_customer(CustomerId::new(1)),
            Err(DomainError::NotFound(_))
        ));
    }

    #[test]
    fn duplicate_sku_is_rejected() {
        let catalog = catalog();
        let err = catalog
            .insert_product(Product::new(ProductId::new(2), "SKU-1", "Other"))
            .unwrap_err();
        assert!(matches!(err, DomainError::DuplicateResource(_)));
    }

    #[test]
    fn duplicate_warehouse_code_is_rejected() {
        let catalog = catalog();
        let err = catalog
            .insert_warehouse(Warehouse::new(WarehouseId::new(2), "WH-1", "Second"))
            .unwrap_err();
        assert!(matches!(err, DomainError::DuplicateResource(_)));
    }

    #[test]
    fn duplicate_ids_are_rejected_per_table() {
        let catalog = catalog();
        catalog
            .insert_customer(Customer::new(CustomerId::new(1), "Retail Co"))
            .unwrap();
        let err = catalog
            .insert_customer(Customer::new(CustomerId::new(1), "Other Co"))
            .unwrap_err();
        assert_eq!(err, DomainError::duplicate("customer 1 already exists"));
        assert_eq!(catalog.resolve_customer(CustomerId::new(1)).unwrap().name, "Retail Co");

        // Same numeric id in another table is a different entity.
        catalog
            .insert_supplier(Supplier::new(SupplierId::new(1), "Acme"))
            .unwrap();
    }

    #[test]
    fn empty_party_name_is_rejected() {
        let catalog = catalog();
        let err = catalog
            .insert_supplier(Supplier::new(SupplierId::new(1), "  "))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
