use super::ids::{ProductId, RoleId, VariationId};
use super::order::Amount;
use crate::error::{Result, StorefrontError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

fn default_color() -> String {
    "#ffffff".to_string()
}

/// A sellable entitlement.
///
/// A product either has a positive fixed `price` and no variations, or no price
/// (absent or zero) and is bought through one of its variations.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Role granted when no variation overrides it.
    pub role: RoleId,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub thumbnail_url: String,
    #[serde(default)]
    pub banner_url: String,
    /// Where the presentation layer keeps the product's message. Never written here.
    #[serde(default)]
    pub channel_id: Option<u64>,
    #[serde(default)]
    pub message_id: Option<u64>,
}

impl Product {
    pub fn fixed_price(&self) -> Option<Amount> {
        self.price.and_then(|price| Amount::new(price).ok())
    }

    pub fn uses_variations(&self) -> bool {
        self.fixed_price().is_none()
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Variation {
    pub id: VariationId,
    pub product: ProductId,
    pub name: String,
    pub price: Amount,
    /// Overrides the product's role when set.
    #[serde(default)]
    pub role: Option<RoleId>,
}

/// The amount an order for `product` (and `variation`, if any) is opened with.
pub fn price_for(product: &Product, variation: Option<&Variation>) -> Result<Amount> {
    match (product.fixed_price(), variation) {
        (_, Some(variation)) if variation.product != product.id => {
            Err(StorefrontError::invalid_input(format!(
                "variation {} does not belong to product {}",
                variation.id, product.id
            )))
        }
        (Some(_), Some(_)) => Err(StorefrontError::invalid_input(format!(
            "product {} is sold at a fixed price, not by variation",
            product.id
        ))),
        (Some(price), None) => Ok(price),
        (None, Some(variation)) => Ok(variation.price),
        (None, None) => Err(StorefrontError::invalid_input(format!(
            "product {} is sold by variation; choose one",
            product.id
        ))),
    }
}

/// The role an order delivers: the variation's override, else the product default.
pub fn role_for(product: &Product, variation: Option<&Variation>) -> RoleId {
    variation
        .and_then(|variation| variation.role)
        .unwrap_or(product.role)
}
