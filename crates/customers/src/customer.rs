use serde::{Deserialize, Serialize};

use storefront_core::{CustomerId, DomainError, DomainResult, Entity, ValueObject};
use storefront_events::{CustomerCreated, CustomerDeleted, CustomerShippingAddressUpdated};

const MAX_NAME_LEN: usize = 64;
const MAX_EMAIL_LEN: usize = 254;

/// Where a customer's orders are shipped. Replaced as a whole, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub country: String,
    pub city: String,
    pub zip_code: String,
    pub street: String,
}

impl ValueObject for ShippingAddress {}

/// A registered customer, as held in the read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    customer_id: CustomerId,
    first_name: String,
    last_name: String,
    email: String,
    shipping_address: Option<ShippingAddress>,
}

impl Customer {
    pub fn new(
        customer_id: CustomerId,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            customer_id,
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            shipping_address: None,
        }
    }

    pub fn with_shipping_address(mut self, address: ShippingAddress) -> Self {
        self.shipping_address = Some(address);
        self
    }

    pub fn customer_id(&self) -> &CustomerId {
        &self.customer_id
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn shipping_address(&self) -> Option<&ShippingAddress> {
        self.shipping_address.as_ref()
    }

    pub fn set_shipping_address(&mut self, address: ShippingAddress) {
        self.shipping_address = Some(address);
    }

    pub fn to_created(&self) -> CustomerCreated {
        CustomerCreated {
            customer_id: self.customer_id.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
        }
    }

    pub fn to_deleted(&self) -> CustomerDeleted {
        CustomerDeleted {
            customer_id: self.customer_id.clone(),
        }
    }
}

impl Entity for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.customer_id
    }
}

impl From<CustomerCreated> for Customer {
    fn from(e: CustomerCreated) -> Self {
        Self::new(e.customer_id, e.first_name, e.last_name, e.email)
    }
}

impl From<&CustomerShippingAddressUpdated> for ShippingAddress {
    fn from(e: &CustomerShippingAddressUpdated) -> Self {
        Self {
            country: e.country.clone(),
            city: e.city.clone(),
            zip_code: e.zip_code.clone(),
            street: e.street.clone(),
        }
    }
}

fn require(field: &str, value: &mut String, max: usize) -> DomainResult<()> {
    *value = value.trim().to_owned();
    if value.is_empty() {
        return Err(DomainError::validation(format!("{field}: cannot be blank")));
    }
    if value.chars().count() > max {
        return Err(DomainError::validation(format!(
            "{field}: the length must be no more than {max}"
        )));
    }
    Ok(())
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCustomerRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl CreateCustomerRequest {
    pub fn validate(&mut self) -> DomainResult<()> {
        require("first_name", &mut self.first_name, MAX_NAME_LEN)?;
        require("last_name", &mut self.last_name, MAX_NAME_LEN)?;
        require("email", &mut self.email, MAX_EMAIL_LEN)?;
        if !looks_like_email(&self.email) {
            return Err(DomainError::validation("email: must be a valid email address"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateShippingAddressRequest {
    pub customer_id: CustomerId,
    pub country: String,
    pub city: String,
    pub zip_code: String,
    pub street: String,
}

impl UpdateShippingAddressRequest {
    /// Every address field is required.
    pub fn validate(&mut self) -> DomainResult<()> {
        require("country", &mut self.country, MAX_NAME_LEN)?;
        require("city", &mut self.city, MAX_NAME_LEN)?;
        require("zip_code", &mut self.zip_code, MAX_NAME_LEN)?;
        require("street", &mut self.street, 2 * MAX_NAME_LEN)?;
        Ok(())
    }

    pub fn address(&self) -> ShippingAddress {
        ShippingAddress {
            country: self.country.clone(),
            city: self.city.clone(),
            zip_code: self.zip_code.clone(),
            street: self.street.clone(),
        }
    }

    pub fn to_event(&self) -> CustomerShippingAddressUpdated {
        CustomerShippingAddressUpdated {
            customer_id: self.customer_id.clone(),
            country: self.country.clone(),
            city: self.city.clone(),
            zip_code: self.zip_code.clone(),
            street: self.street.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str) -> CreateCustomerRequest {
        CreateCustomerRequest {
            first_name: " Ada ".into(),
            last_name: "Lovelace".into(),
            email: email.into(),
        }
    }

    #[test]
    fn valid_request_is_trimmed() {
        let mut req = request(" ada@example.com ");
        req.validate().unwrap();
        assert_eq!(req.first_name, "Ada");
        assert_eq!(req.email, "ada@example.com");
    }

    #[test]
    fn malformed_emails_are_rejected() {
        let emails = [
            "",
            "ada",
            "ada@",
            "@example.com",
            "ada@example",
            "a b@example.com",
            "ada@@example.com",
            "ada@example..com",
        ];
        for email in emails {
            let mut req = request(email);
            assert!(
                matches!(req.validate(), Err(DomainError::Validation(_))),
                "{email:?} should be rejected"
            );
        }
    }

    #[test]
    fn shipping_address_requires_every_field() {
        let mut req = UpdateShippingAddressRequest {
            customer_id: "c1".into(),
            country: "Italy".into(),
            city: "Rome".into(),
            zip_code: "  ".into(),
            street: "Via Roma 1".into(),
        };
        assert!(req.validate().is_err());

        req.zip_code = "00100".into();
        req.validate().unwrap();
        assert_eq!(req.address().zip_code, "00100");
    }
}
