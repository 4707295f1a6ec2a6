use super::catalog::{Product, Variation};
use super::ids::{OrderId, ProductId, RoleId, UserId, VariationId};
use super::order::{NewOrder, Order, OrderStatus};
use crate::error::Result;
use async_trait::async_trait;

/// Durable order state. The only writer of orders.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persists a new `pending` order and assigns its id. Fails with `Conflict` on a reused txid.
    async fn insert_order(&self, order: NewOrder) -> Result<Order>;
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;
    /// Atomically sets `next` iff the stored status equals `expected`.
    ///
    /// Returns `false` (and writes nothing) when the order has moved on.
    async fn cas_update_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<bool>;
    /// Sets the delivered flag on a `paid` order. Returns `false` if it was already set
    /// or the order is not `paid`.
    async fn mark_delivered(&self, id: OrderId) -> Result<bool>;
    /// Orders still `pending`, newest first.
    async fn list_pending(&self) -> Result<Vec<Order>>;
    async fn all_orders(&self) -> Result<Vec<Order>>;
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;
    async fn get_variation(&self, id: VariationId) -> Result<Option<Variation>>;
}

/// Grants platform roles. Fallible; callers do not retry internally.
#[async_trait]
pub trait EntitlementGranter: Send + Sync {
    async fn grant_role(&self, user: UserId, role: RoleId) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FulfillmentEvent {
    Confirmed,
    Cancelled,
}

/// Result of telling the fulfillment locus about a finished order.
///
/// A failed notification is logged and reported, but never undoes the transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent,
    /// The order has no locus to notify.
    Skipped,
    NotifyFailed(String),
}

/// The presentation side of an order's conversation.
#[async_trait]
pub trait FulfillmentNotifier: Send + Sync {
    /// Tells the order's locus how the order ended and closes it to further use.
    async fn close(&self, order: &Order, event: FulfillmentEvent) -> Result<()>;
}

pub type OrderRepositoryBox = Box<dyn OrderRepository>;
pub type CatalogBox = Box<dyn Catalog>;
pub type EntitlementGranterBox = Box<dyn EntitlementGranter>;
pub type FulfillmentNotifierBox = Box<dyn FulfillmentNotifier>;
