use crate::domain::ids::{OrderId, RoleId};
use crate::domain::order::OrderStatus;
use crate::domain::ports::NotifyOutcome;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Order {order} cannot move from {from} to {to}")]
    InvalidTransition {
        order: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
    #[error("Order {order} is paid but role {role} was not granted: {reason}")]
    EntitlementGrantFailed {
        order: OrderId,
        role: RoleId,
        reason: String,
        /// How the locus was told about the confirmation. `None` on a retry, which notifies no one.
        notify: Option<NotifyOutcome>,
    },
    #[error("Review session expired")]
    SessionExpired,
    #[error("No pending orders")]
    NoPendingOrders,
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl StorefrontError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for StorefrontError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorefrontError>;
