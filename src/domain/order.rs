use super::ids::{LocusId, OrderId, ProductId, UserId, VariationId};
use crate::error::StorefrontError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A positive monetary amount in the store currency.
///
/// Captured by value on the order, so later catalog edits never change an open order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, StorefrontError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(StorefrontError::invalid_input("Amount must be positive"))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = StorefrontError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    /// `pending` may move to either terminal state; nothing leaves a terminal state.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self == OrderStatus::Pending && next.is_terminal()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
        })
    }
}

/// A purchase of one product (optionally one of its variations) by one user.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Order {
    pub id: OrderId,
    pub purchaser: UserId,
    pub product: ProductId,
    pub variation: Option<VariationId>,
    pub amount: Amount,
    pub status: OrderStatus,
    /// Reference label carried in the payment code.
    pub txid: String,
    pub locus: Option<LocusId>,
    pub entitlement_delivered: bool,
    pub created_at: DateTime<Utc>,
}

/// An order as requested, before the store has assigned its id.
#[derive(Debug, PartialEq, Clone)]
pub struct NewOrder {
    pub purchaser: UserId,
    pub product: ProductId,
    pub variation: Option<VariationId>,
    pub amount: Amount,
    pub txid: String,
    pub locus: Option<LocusId>,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    /// Every order starts `pending` with nothing delivered.
    pub fn into_order(self, id: OrderId) -> Order {
        Order {
            id,
            purchaser: self.purchaser,
            product: self.product,
            variation: self.variation,
            amount: self.amount,
            status: OrderStatus::Pending,
            txid: self.txid,
            locus: self.locus,
            entitlement_delivered: false,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(StorefrontError::InvalidInput(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(StorefrontError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_amount_deserialization_is_validated() {
        let amount: Amount = serde_json::from_str("\"19.90\"").unwrap();
        assert_eq!(amount.value(), dec!(19.90));
        assert!(serde_json::from_str::<Amount>("\"0\"").is_err());
    }

    #[test]
    fn test_amount_display() {
        assert_eq!(Amount::new(dec!(25)).unwrap().to_string(), "25.00");
    }

    #[test]
    fn test_status_transitions() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Paid));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Pending));
        for terminal in [Paid, Cancelled] {
            for next in [Pending, Paid, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
        assert_eq!(OrderStatus::Paid.to_string(), "paid");
    }

    #[test]
    fn test_new_order_starts_pending() {
        let order = NewOrder {
            purchaser: UserId(7),
            product: ProductId(1),
            variation: None,
            amount: Amount::new(dec!(10)).unwrap(),
            txid: "tx".to_string(),
            locus: Some(LocusId(99)),
            created_at: Utc::now(),
        }
        .into_order(OrderId(3));

        assert_eq!(order.id, OrderId(3));
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(!order.entitlement_delivered);
    }
}
