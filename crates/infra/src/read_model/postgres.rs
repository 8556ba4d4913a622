//! Postgres-backed read models.
//!
//! One table per read model, keyed by the entity id carried in the events.
//! Queries are checked at runtime so the crate builds without a database.
//!
//! Error mapping:
//! - unique violation on insert → `Conflict`
//! - no row for an id/name/email → `NotFound`
//! - anything else from the driver → `Internal`

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use storefront_core::{CustomerId, DomainError, DomainResult, ProductId};
use storefront_customers::{Customer, CustomerRepository, ShippingAddress};
use storefront_inventory::{InventoryItem, InventoryRepository};
use storefront_products::{Product, ProductRepository};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS products (
        product_id  TEXT PRIMARY KEY,
        name        TEXT NOT NULL,
        description TEXT NOT NULL,
        price       DOUBLE PRECISION NOT NULL,
        amount      BIGINT NOT NULL,
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS products_name_idx ON products (name)",
    r#"
    CREATE TABLE IF NOT EXISTS customers (
        customer_id TEXT PRIMARY KEY,
        first_name  TEXT NOT NULL,
        last_name   TEXT NOT NULL,
        email       TEXT NOT NULL,
        country     TEXT,
        city        TEXT,
        zip_code    TEXT,
        street      TEXT,
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS customers_email_idx ON customers (lower(email))",
    r#"
    CREATE TABLE IF NOT EXISTS inventory_items (
        product_id  TEXT PRIMARY KEY,
        name        TEXT NOT NULL,
        description TEXT NOT NULL,
        price       DOUBLE PRECISION NOT NULL,
        amount      BIGINT NOT NULL,
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
];

/// Create the read-model tables if they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> DomainResult<()> {
    for statement in SCHEMA {
        sqlx::query(*statement)
            .execute(pool)
            .await
            .map_err(|e| db_error("ensure_schema", e))?;
    }
    debug!("read model schema ready");
    Ok(())
}

fn db_error(operation: &str, err: sqlx::Error) -> DomainError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            DomainError::conflict(format!("{operation}: {}", db.message()))
        }
        _ => DomainError::internal(format!("{operation}: {err}")),
    }
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> DomainResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get::<T, _>(name)
        .map_err(|e| DomainError::internal(format!("column {name}: {e}")))
}

fn product_from_row(row: &PgRow) -> DomainResult<Product> {
    Ok(Product::new(
        ProductId::from(column::<String>(row, "product_id")?),
        column::<String>(row, "name")?,
        column::<String>(row, "description")?,
        column::<f64>(row, "price")?,
        column::<i64>(row, "amount")?,
    ))
}

fn customer_from_row(row: &PgRow) -> DomainResult<Customer> {
    let customer = Customer::new(
        CustomerId::from(column::<String>(row, "customer_id")?),
        column::<String>(row, "first_name")?,
        column::<String>(row, "last_name")?,
        column::<String>(row, "email")?,
    );
    let address = (
        column::<Option<String>>(row, "country")?,
        column::<Option<String>>(row, "city")?,
        column::<Option<String>>(row, "zip_code")?,
        column::<Option<String>>(row, "street")?,
    );
    Ok(match address {
        (Some(country), Some(city), Some(zip_code), Some(street)) => {
            customer.with_shipping_address(ShippingAddress {
                country,
                city,
                zip_code,
                street,
            })
        }
        _ => customer,
    })
}

fn item_from_row(row: &PgRow) -> DomainResult<InventoryItem> {
    Ok(InventoryItem {
        product_id: ProductId::from(column::<String>(row, "product_id")?),
        name: column(row, "name")?,
        description: column(row, "description")?,
        price: column(row, "price")?,
        amount: column(row, "amount")?,
    })
}

/// `products` table.
#[derive(Clone)]
pub struct PgProductRepository {
    pool: Arc<PgPool>,
}

impl PgProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    #[instrument(skip_all, fields(product_id = %product.product_id()))]
    async fn store(&self, product: &Product) -> DomainResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products (product_id, name, description, price, amount)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(product.product_id().as_str())
        .bind(product.name())
        .bind(product.description())
        .bind(product.price())
        .bind(product.amount())
        .execute(&*self.pool)
        .await
        .map_err(|e| db_error("store product", e))?;
        Ok(())
    }

    async fn find_by_id(&self, product_id: &ProductId) -> DomainResult<Product> {
        let row = sqlx::query(
            r#"
            SELECT product_id, name, description, price, amount
            FROM products
            WHERE product_id = $1
            "#,
        )
        .bind(product_id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| db_error("find product", e))?;

        match row {
            Some(row) => product_from_row(&row),
            None => Err(DomainError::not_found(format!("product with id={product_id}"))),
        }
    }

    async fn find_by_name(&self, name: &str) -> DomainResult<Product> {
        let row = sqlx::query(
            r#"
            SELECT product_id, name, description, price, amount
            FROM products
            WHERE name = $1
            LIMIT 1
            "#,
        )
        .bind(name)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| db_error("find product by name", e))?;

        match row {
            Some(row) => product_from_row(&row),
            None => Err(DomainError::not_found(format!("product with name={name}"))),
        }
    }

    async fn list(&self) -> DomainResult<Vec<Product>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, name, description, price, amount
            FROM products
            ORDER BY product_id
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| db_error("list products", e))?;

        rows.iter().map(product_from_row).collect()
    }

    #[instrument(skip_all, fields(product_id = %product.product_id()))]
    async fn update(&self, product: &Product) -> DomainResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = $2, description = $3, price = $4, amount = $5, updated_at = NOW()
            WHERE product_id = $1
            "#,
        )
        .bind(product.product_id().as_str())
        .bind(product.name())
        .bind(product.description())
        .bind(product.price())
        .bind(product.amount())
        .execute(&*self.pool)
        .await
        .map_err(|e| db_error("update product", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!(
                "product with id={}",
                product.product_id()
            )));
        }
        Ok(())
    }

    async fn delete(&self, product_id: &ProductId) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE product_id = $1")
            .bind(product_id.as_str())
            .execute(&*self.pool)
            .await
            .map_err(|e| db_error("delete product", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!("product with id={product_id}")));
        }
        Ok(())
    }
}

/// `customers` table. The shipping address columns are null until the
/// first `Customer.ShippingAddressUpdated`.
#[derive(Clone)]
pub struct PgCustomerRepository {
    pool: Arc<PgPool>,
}

impl PgCustomerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl CustomerRepository for PgCustomerRepository {
    #[instrument(skip_all, fields(customer_id = %customer.customer_id()))]
    async fn store(&self, customer: &Customer) -> DomainResult<()> {
        let address = customer.shipping_address();
        sqlx::query(
            r#"
            INSERT INTO customers (
                customer_id, first_name, last_name, email,
                country, city, zip_code, street
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(customer.customer_id().as_str())
        .bind(customer.first_name())
        .bind(customer.last_name())
        .bind(customer.email())
        .bind(address.map(|a| a.country.as_str()))
        .bind(address.map(|a| a.city.as_str()))
        .bind(address.map(|a| a.zip_code.as_str()))
        .bind(address.map(|a| a.street.as_str()))
        .execute(&*self.pool)
        .await
        .map_err(|e| db_error("store customer", e))?;
        Ok(())
    }

    async fn find_by_id(&self, customer_id: &CustomerId) -> DomainResult<Customer> {
        let row = sqlx::query(
            r#"
            SELECT customer_id, first_name, last_name, email, country, city, zip_code, street
            FROM customers
            WHERE customer_id = $1
            "#,
        )
        .bind(customer_id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| db_error("find customer", e))?;

        match row {
            Some(row) => customer_from_row(&row),
            None => Err(DomainError::not_found(format!("customer with id={customer_id}"))),
        }
    }

    async fn find_by_email(&self, email: &str) -> DomainResult<Customer> {
        let row = sqlx::query(
            r#"
            SELECT customer_id, first_name, last_name, email, country, city, zip_code, street
            FROM customers
            WHERE lower(email) = lower($1)
            LIMIT 1
            "#,
        )
        .bind(email)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| db_error("find customer by email", e))?;

        match row {
            Some(row) => customer_from_row(&row),
            None => Err(DomainError::not_found(format!("customer with email={email}"))),
        }
    }

    #[instrument(skip_all, fields(customer_id = %customer.customer_id()))]
    async fn update(&self, customer: &Customer) -> DomainResult<()> {
        let address = customer.shipping_address();
        let result = sqlx::query(
            r#"
            UPDATE customers
            SET first_name = $2, last_name = $3, email = $4,
                country = $5, city = $6, zip_code = $7, street = $8,
                updated_at = NOW()
            WHERE customer_id = $1
            "#,
        )
        .bind(customer.customer_id().as_str())
        .bind(customer.first_name())
        .bind(customer.last_name())
        .bind(customer.email())
        .bind(address.map(|a| a.country.as_str()))
        .bind(address.map(|a| a.city.as_str()))
        .bind(address.map(|a| a.zip_code.as_str()))
        .bind(address.map(|a| a.street.as_str()))
        .execute(&*self.pool)
        .await
        .map_err(|e| db_error("update customer", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!(
                "customer with id={}",
                customer.customer_id()
            )));
        }
        Ok(())
    }

    async fn delete(&self, customer_id: &CustomerId) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM customers WHERE customer_id = $1")
            .bind(customer_id.as_str())
            .execute(&*self.pool)
            .await
            .map_err(|e| db_error("delete customer", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!("customer with id={customer_id}")));
        }
        Ok(())
    }
}

/// `inventory_items` table, written with `ON CONFLICT DO UPDATE`.
#[derive(Clone)]
pub struct PgInventoryRepository {
    pool: Arc<PgPool>,
}

impl PgInventoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl InventoryRepository for PgInventoryRepository {
    #[instrument(skip_all, fields(product_id = %item.product_id))]
    async fn upsert(&self, item: &InventoryItem) -> DomainResult<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_items (product_id, name, description, price, amount)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (product_id)
            DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                price = EXCLUDED.price,
                amount = EXCLUDED.amount,
                updated_at = NOW()
            "#,
        )
        .bind(item.product_id.as_str())
        .bind(&item.name)
        .bind(&item.description)
        .bind(item.price)
        .bind(item.amount)
        .execute(&*self.pool)
        .await
        .map_err(|e| db_error("upsert inventory item", e))?;
        Ok(())
    }

    async fn get(&self, product_id: &ProductId) -> DomainResult<InventoryItem> {
        let row = sqlx::query(
            r#"
            SELECT product_id, name, description, price, amount
            FROM inventory_items
            WHERE product_id = $1
            "#,
        )
        .bind(product_id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| db_error("get inventory item", e))?;

        match row {
            Some(row) => item_from_row(&row),
            None => Err(DomainError::not_found(format!("inventory item {product_id}"))),
        }
    }

    async fn list(&self) -> DomainResult<Vec<InventoryItem>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, name, description, price, amount
            FROM inventory_items
            ORDER BY product_id
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| db_error("list inventory items", e))?;

        rows.iter().map(item_from_row).collect()
    }

    async fn remove(&self, product_id: &ProductId) -> DomainResult<bool> {
        let result = sqlx::query("DELETE FROM inventory_items WHERE product_id = $1")
            .bind(product_id.as_str())
            .execute(&*self.pool)
            .await
            .map_err(|e| db_error("remove inventory item", e))?;
        Ok(result.rows_affected() > 0)
    }
}
