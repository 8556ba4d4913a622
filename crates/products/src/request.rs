//! Product command requests and their validation rules.
//!
//! Rules:
//! - `name`: 4–32 characters, ASCII only
//! - `description`: 10–256 characters, ASCII only
//! - `price`: finite and strictly positive
//! - `amount`: zero or more on create, strictly positive on restock
//!
//! Text fields are trimmed before they are checked; the trimmed value is what
//! gets published.

use serde::{Deserialize, Serialize};

use storefront_core::{DomainError, DomainResult, ProductId};

const NAME_LEN: (usize, usize) = (4, 32);
const DESCRIPTION_LEN: (usize, usize) = (10, 256);

fn check_text(field: &str, value: &str, (min, max): (usize, usize)) -> DomainResult<()> {
    if value.is_empty() {
        return Err(DomainError::validation(format!("{field}: cannot be blank")));
    }
    let len = value.chars().count();
    if len < min || len > max {
        return Err(DomainError::validation(format!(
            "{field}: the length must be between {min} and {max}"
        )));
    }
    if !value.is_ascii() {
        return Err(DomainError::validation(format!(
            "{field}: must contain ASCII characters only"
        )));
    }
    Ok(())
}

fn check_price(price: f64) -> DomainResult<()> {
    if !price.is_finite() || price <= 0.0 {
        return Err(DomainError::validation("price: must be greater than 0"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub amount: i64,
}

impl CreateProductRequest {
    /// Trim text fields, then check every rule.
    pub fn validate(&mut self) -> DomainResult<()> {
        self.name = self.name.trim().to_owned();
        self.description = self.description.trim().to_owned();

        check_text("name", &self.name, NAME_LEN)?;
        check_text("description", &self.description, DESCRIPTION_LEN)?;
        check_price(self.price)?;
        if self.amount < 0 {
            return Err(DomainError::validation("amount: must be no less than 0"));
        }
        Ok(())
    }
}

/// Partial update of catalog data. Stock is changed through
/// [`RestockProductRequest`] instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateProductRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
}

impl UpdateProductRequest {
    /// Trim text fields (blank counts as absent), require at least one field,
    /// and check the ones present.
    pub fn validate(&mut self) -> DomainResult<()> {
        fn normalize(field: &mut Option<String>) {
            *field = field
                .take()
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty());
        }
        normalize(&mut self.name);
        normalize(&mut self.description);

        if self.name.is_none() && self.description.is_none() && self.price.is_none() {
            return Err(DomainError::validation(
                "at least one of name, description or price is required",
            ));
        }
        if let Some(name) = &self.name {
            check_text("name", name, NAME_LEN)?;
        }
        if let Some(description) = &self.description {
            check_text("description", description, DESCRIPTION_LEN)?;
        }
        if let Some(price) = self.price {
            check_price(price)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockProductRequest {
    pub product_id: ProductId,
    pub amount: i64,
}

impl RestockProductRequest {
    pub fn validate(&self) -> DomainResult<()> {
        if self.amount <= 0 {
            return Err(DomainError::validation("amount: must be greater than 0"));
        }
        Ok(())
    }
}
