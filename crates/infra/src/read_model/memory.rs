use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use storefront_core::{CustomerId, DomainError, DomainResult, ProductId};
use storefront_customers::{Customer, CustomerRepository};
use storefront_inventory::{InventoryItem, InventoryRepository};
use storefront_products::{Product, ProductRepository};

/// Map behind a lock; poisoning surfaces as `Internal` rather than a panic.
#[derive(Debug)]
struct Table<K, V> {
    rows: RwLock<BTreeMap<K, V>>,
}

impl<K, V> Default for Table<K, V> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<K: Ord, V> Table<K, V> {
    fn read(&self) -> DomainResult<RwLockReadGuard<'_, BTreeMap<K, V>>> {
        self.rows
            .read()
            .map_err(|_| DomainError::internal("read model lock poisoned"))
    }

    fn write(&self) -> DomainResult<RwLockWriteGuard<'_, BTreeMap<K, V>>> {
        self.rows
            .write()
            .map_err(|_| DomainError::internal("read model lock poisoned"))
    }
}

/// In-memory product read model for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryProductRepository {
    products: Table<ProductId, Product>,
}

impl InMemoryProductRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn store(&self, product: &Product) -> DomainResult<()> {
        let mut rows = self.products.write()?;
        if rows.contains_key(product.product_id()) {
            return Err(DomainError::conflict(format!(
                "product with id={} already exists",
                product.product_id()
            )));
        }
        rows.insert(product.product_id().clone(), product.clone());
        Ok(())
    }

    async fn find_by_id(&self, product_id: &ProductId) -> DomainResult<Product> {
        self.products
            .read()?
            .get(product_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("product with id={product_id}")))
    }

    async fn find_by_name(&self, name: &str) -> DomainResult<Product> {
        self.products
            .read()?
            .values()
            .find(|p| p.name() == name)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("product with name={name}")))
    }

    async fn list(&self) -> DomainResult<Vec<Product>> {
        Ok(self.products.read()?.values().cloned().collect())
    }

    async fn update(&self, product: &Product) -> DomainResult<()> {
        match self.products.write()?.get_mut(product.product_id()) {
            Some(slot) => {
                *slot = product.clone();
                Ok(())
            }
            None => Err(DomainError::not_found(format!(
                "product with id={}",
                product.product_id()
            ))),
        }
    }

    async fn delete(&self, product_id: &ProductId) -> DomainResult<()> {
        self.products
            .write()?
            .remove(product_id)
            .map(|_| ())
            .ok_or_else(|| DomainError::not_found(format!("product with id={product_id}")))
    }
}

/// In-memory customer read model for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCustomerRepository {
    customers: Table<CustomerId, Customer>,
}

impl InMemoryCustomerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CustomerRepository for InMemoryCustomerRepository {
    async fn store(&self, customer: &Customer) -> DomainResult<()> {
        let mut rows = self.customers.write()?;
        if rows.contains_key(customer.customer_id()) {
            return Err(DomainError::conflict(format!(
                "customer with id={} already exists",
                customer.customer_id()
            )));
        }
        rows.insert(customer.customer_id().clone(), customer.clone());
        Ok(())
    }

    async fn find_by_id(&self, customer_id: &CustomerId) -> DomainResult<Customer> {
        self.customers
            .read()?
            .get(customer_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("customer with id={customer_id}")))
    }

    async fn find_by_email(&self, email: &str) -> DomainResult<Customer> {
        self.customers
            .read()?
            .values()
            .find(|c| c.email().eq_ignore_ascii_case(email))
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("customer with email={email}")))
    }

    async fn update(&self, customer: &Customer) -> DomainResult<()> {
        match self.customers.write()?.get_mut(customer.customer_id()) {
            Some(slot) => {
                *slot = customer.clone();
                Ok(())
            }
            None => Err(DomainError::not_found(format!(
                "customer with id={}",
                customer.customer_id()
            ))),
        }
    }

    async fn delete(&self, customer_id: &CustomerId) -> DomainResult<()> {
        self.customers
            .write()?
            .remove(customer_id)
            .map(|_| ())
            .ok_or_else(|| DomainError::not_found(format!("customer with id={customer_id}")))
    }
}

/// In-memory inventory read model. Upserts never conflict.
#[derive(Debug, Default)]
pub struct InMemoryInventoryRepository {
    items: RwLock<HashMap<ProductId, InventoryItem>>,
}

impl InMemoryInventoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryRepository for InMemoryInventoryRepository {
    async fn upsert(&self, item: &InventoryItem) -> DomainResult<()> {
        self.items
            .write()
            .map_err(|_| DomainError::internal("inventory lock poisoned"))?
            .insert(item.product_id.clone(), item.clone());
        Ok(())
    }

    async fn get(&self, product_id: &ProductId) -> DomainResult<InventoryItem> {
        self.items
            .read()
            .map_err(|_| DomainError::internal("inventory lock poisoned"))?
            .get(product_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("inventory item {product_id}")))
    }

    async fn list(&self) -> DomainResult<Vec<InventoryItem>> {
        let items = self
            .items
            .read()
            .map_err(|_| DomainError::internal("inventory lock poisoned"))?;
        Ok(items.values().cloned().collect())
    }

    async fn remove(&self, product_id: &ProductId) -> DomainResult<bool> {
        let removed = self
            .items
            .write()
            .map_err(|_| DomainError::internal("inventory lock poisoned"))?
            .remove(product_id);
        Ok(removed.is_some())
    }
}
