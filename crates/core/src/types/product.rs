//! Product catalog types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors that can occur when validating a [`Product`].
#[derive(thiserror::Error, Debug, Clone)]
pub enum ProductError {
    /// The product name is empty.
    #[error("product name cannot be empty")]
    EmptyName,
    /// The price is negative.
    #[error("product price cannot be negative: {0}")]
    NegativePrice(Decimal),
}

/// A product category.
///
/// Ordering is irrelevant; uniqueness is by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Category {
    /// Category name.
    pub name: String,
}

impl Category {
    /// Create a new category.
    #[must_use]
    pub const fn new(name: String) -> Self {
        Self { name }
    }
}

/// A product in the catalog.
///
/// The wire and snapshot-file field for visibility is `shown`. Products
/// with `visible == false` are filtered out before they reach any
/// consumer; the filter lives in the data layer, this type just carries
/// the flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product name, unique within the catalog.
    pub name: String,
    /// Price in the backend's currency.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// Name of the category this product belongs to.
    pub category: String,
    /// Whether the product should be offered on the terminal.
    #[serde(rename = "shown")]
    pub visible: bool,
}

impl Product {
    /// Create a validated product record.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or the price is negative.
    pub fn new(
        name: String,
        price: Decimal,
        category: String,
        visible: bool,
    ) -> Result<Self, ProductError> {
        if name.is_empty() {
            return Err(ProductError::EmptyName);
        }
        if price.is_sign_negative() && !price.is_zero() {
            return Err(ProductError::NegativePrice(price));
        }
        Ok(Self {
            name,
            price,
            category,
            visible,
        })
    }
}
