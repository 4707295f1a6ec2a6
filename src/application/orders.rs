use crate::domain::catalog::{Product, Variation, price_for, role_for};
use crate::domain::ids::{LocusId, OrderId, ProductId, RoleId, UserId, VariationId};
use crate::domain::order::{NewOrder, Order, OrderStatus};
use crate::domain::ports::{
    CatalogBox, EntitlementGranterBox, FulfillmentEvent, FulfillmentNotifierBox,
    OrderRepositoryBox,
};
use crate::error::{Result, StorefrontError};
use crate::pix::{self, Merchant, Payload};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};

pub use crate::domain::ports::NotifyOutcome;

/// Issues payment reference labels.
///
/// The sequence is seeded from the wall clock once and then only ever increments,
/// so two orders never share a txid within a process even if they land on the same
/// millisecond. Labels are exactly 25 characters, the reference-label limit.
#[derive(Debug)]
pub struct TxidGenerator {
    sequence: AtomicU64,
}

impl TxidGenerator {
    pub fn new() -> Self {
        let seed = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
        Self::starting_at(seed)
    }

    pub fn starting_at(sequence: u64) -> Self {
        Self {
            sequence: AtomicU64::new(sequence),
        }
    }

    pub fn generate(&self, purchaser: UserId) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("U{:010}S{:013}", purchaser.0 % 10_000_000_000, sequence)
    }
}

impl Default for TxidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// A purchase request coming from the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub purchaser: UserId,
    pub product: ProductId,
    pub variation: Option<VariationId>,
    pub locus: Option<LocusId>,
}

/// A stored order together with the payment code to show its purchaser.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: Order,
    pub payload: Payload,
}

/// Per-order locks that serialize role delivery.
///
/// `confirm` and `retry_entitlement` both deliver through here, so a grant for
/// one order is never in flight twice within a process.
#[derive(Default)]
struct DeliveryLocks {
    locks: Mutex<HashMap<OrderId, Arc<AsyncMutex<()>>>>,
}

impl DeliveryLocks {
    fn acquire(&self, id: OrderId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(id).or_default())
    }

    fn release(&self, id: OrderId, handle: Arc<AsyncMutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(handle);
        // Handles are only cloned under this lock, so a count of one means no waiters.
        if locks.get(&id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&id);
        }
    }
}

/// An order after a successful `confirm` or `cancel`.
#[derive(Debug, Clone)]
pub struct Transition {
    pub order: Order,
    pub notify: NotifyOutcome,
}

/// The order state machine.
///
/// `pending` is the only non-terminal state. Legality is enforced twice: against
/// the loaded snapshot, and again by the repository's conditional update, which is
/// what settles a race between two administrators acting on the same order.
/// Callers are expected to have checked authorization already.
pub struct OrderService {
    orders: OrderRepositoryBox,
    catalog: CatalogBox,
    entitlements: EntitlementGranterBox,
    notifier: FulfillmentNotifierBox,
    merchant: Merchant,
    txids: TxidGenerator,
    deliveries: DeliveryLocks,
}

impl OrderService {
    /// Creates a new `OrderService`.
    ///
    /// # Arguments
    ///
    /// * `orders` - Durable order storage.
    /// * `catalog` - Product and variation lookup.
    /// * `entitlements` - Grants roles once an order is paid.
    /// * `notifier` - Closes the order's conversation when it ends.
    /// * `merchant` - Payee fields rendered into every payment code.
    pub fn new(
        orders: OrderRepositoryBox,
        catalog: CatalogBox,
        entitlements: EntitlementGranterBox,
        notifier: FulfillmentNotifierBox,
        merchant: Merchant,
    ) -> Self {
        Self {
            orders,
            catalog,
            entitlements,
            notifier,
            merchant,
            txids: TxidGenerator::new(),
            deliveries: DeliveryLocks::default(),
        }
    }

    pub fn with_txids(mut self, txids: TxidGenerator) -> Self {
        self.txids = txids;
        self
    }

    /// Opens a `pending` order and renders its payment code.
    ///
    /// The order is persisted before the payload is returned, so whatever the
    /// purchaser is shown can always be matched to a stored order. Nothing is
    /// persisted if encoding fails.
    pub async fn create(&self, request: OrderRequest) -> Result<PlacedOrder> {
        let product = self.product(request.product).await?;
        let variation = self.maybe_variation(request.variation).await?;
        let amount = price_for(&product, variation.as_ref())?;

        let txid = self.txids.generate(request.purchaser);
        let payload = pix::encode(&self.merchant, amount.value(), &txid)?;

        let order = self
            .orders
            .insert_order(NewOrder {
                purchaser: request.purchaser,
                product: product.id,
                variation: variation.map(|v| v.id),
                amount,
                txid,
                locus: request.locus,
                created_at: Utc::now(),
            })
            .await?;

        info!(
            order = %order.id,
            purchaser = %order.purchaser,
            product = %order.product,
            amount = %order.amount,
            "order created"
        );
        Ok(PlacedOrder { order, payload })
    }

    /// Marks a `pending` order `paid`, grants its role and closes its locus.
    ///
    /// If the grant fails the order stays `paid` with `entitlement_delivered`
    /// false, the locus is still notified, and `EntitlementGrantFailed` is returned
    /// carrying the notification outcome, so the condition can be followed up with
    /// [`OrderService::retry_entitlement`].
    pub async fn confirm(&self, id: OrderId, confirmed_by: UserId) -> Result<Transition> {
        let current = self.load(id).await?;
        let role = self.resolve_role(&current).await?;
        let mut order = self.apply(current, OrderStatus::Paid).await?;
        info!(order = %order.id, by = %confirmed_by, "order confirmed");

        let delivered = self.deliver(&mut order, role).await;
        let notify = self.close(&order, FulfillmentEvent::Confirmed).await;
        match delivered {
            Ok(_) => Ok(Transition { order, notify }),
            Err(StorefrontError::EntitlementGrantFailed {
                order, role, reason, ..
            }) => Err(StorefrontError::EntitlementGrantFailed {
                order,
                role,
                reason,
                notify: Some(notify),
            }),
            Err(err) => Err(err),
        }
    }

    /// Marks a `pending` order `cancelled` and closes its locus.
    pub async fn cancel(&self, id: OrderId, cancelled_by: UserId) -> Result<Transition> {
        let current = self.load(id).await?;
        let order = self.apply(current, OrderStatus::Cancelled).await?;
        info!(order = %order.id, by = %cancelled_by, "order cancelled");

        let notify = self.close(&order, FulfillmentEvent::Cancelled).await;
        Ok(Transition { order, notify })
    }

    /// Re-attempts the grant for a `paid` order whose role was never delivered.
    pub async fn retry_entitlement(&self, id: OrderId, requested_by: UserId) -> Result<Order> {
        let mut order = self.load(id).await?;
        if order.status != OrderStatus::Paid {
            return Err(StorefrontError::InvalidTransition {
                order: order.id,
                from: order.status,
                to: OrderStatus::Paid,
            });
        }
        if order.entitlement_delivered {
            return Err(StorefrontError::Conflict(format!(
                "order {} already has its entitlement",
                order.id
            )));
        }
        let role = self.resolve_role(&order).await?;
        info!(order = %order.id, by = %requested_by, %role, "retrying entitlement");
        if !self.deliver(&mut order, role).await? {
            return Err(StorefrontError::Conflict(format!(
                "order {} already has its entitlement",
                order.id
            )));
        }
        Ok(order)
    }

    pub async fn pending_orders(&self) -> Result<Vec<Order>> {
        self.orders.list_pending().await
    }

    pub async fn all_orders(&self) -> Result<Vec<Order>> {
        self.orders.all_orders().await
    }

    pub async fn order(&self, id: OrderId) -> Result<Order> {
        self.load(id).await
    }

    async fn apply(&self, mut order: Order, next: OrderStatus) -> Result<Order> {
        if !order.status.can_transition_to(next) {
            return Err(StorefrontError::InvalidTransition {
                order: order.id,
                from: order.status,
                to: next,
            });
        }
        if !self
            .orders
            .cas_update_status(order.id, OrderStatus::Pending, next)
            .await?
        {
            // Someone else finished this order after we loaded it.
            let from = self
                .orders
                .get_order(order.id)
                .await?
                .map_or(order.status, |stored| stored.status);
            warn!(order = %order.id, %from, to = %next, "lost transition race");
            return Err(StorefrontError::InvalidTransition {
                order: order.id,
                from,
                to: next,
            });
        }
        order.status = next;
        Ok(order)
    }

    /// Grants `role` for a `paid` order unless the stored order already has it.
    ///
    /// Returns `false` when there was nothing left to deliver.
    async fn deliver(&self, order: &mut Order, role: RoleId) -> Result<bool> {
        let handle = self.deliveries.acquire(order.id);
        let delivered = {
            let _claim = handle.lock().await;
            self.deliver_claimed(order, role).await
        };
        self.deliveries.release(order.id, handle);
        delivered
    }

    async fn deliver_claimed(&self, order: &mut Order, role: RoleId) -> Result<bool> {
        if self.load(order.id).await?.entitlement_delivered {
            order.entitlement_delivered = true;
            return Ok(false);
        }
        if let Err(err) = self.entitlements.grant_role(order.purchaser, role).await {
            error!(
                order = %order.id,
                purchaser = %order.purchaser,
                %role,
                error = %err,
                "order is paid but its role was not granted"
            );
            return Err(StorefrontError::EntitlementGrantFailed {
                order: order.id,
                role,
                reason: err.to_string(),
                notify: None,
            });
        }
        if !self.orders.mark_delivered(order.id).await? {
            return Err(StorefrontError::Conflict(format!(
                "order {} changed while its role was being granted",
                order.id
            )));
        }
        order.entitlement_delivered = true;
        info!(order = %order.id, purchaser = %order.purchaser, %role, "entitlement delivered");
        Ok(true)
    }

    async fn close(&self, order: &Order, event: FulfillmentEvent) -> NotifyOutcome {
        if order.locus.is_none() {
            return NotifyOutcome::Skipped;
        }
        match self.notifier.close(order, event).await {
            Ok(()) => NotifyOutcome::Sent,
            Err(err) => {
                warn!(order = %order.id, ?event, error = %err, "fulfillment notification failed");
                NotifyOutcome::NotifyFailed(err.to_string())
            }
        }
    }

    async fn resolve_role(&self, order: &Order) -> Result<RoleId> {
        let product = self.product(order.product).await?;
        let variation = self.maybe_variation(order.variation).await?;
        Ok(role_for(&product, variation.as_ref()))
    }

    async fn load(&self, id: OrderId) -> Result<Order> {
        self.orders
            .get_order(id)
            .await?
            .ok_or(StorefrontError::NotFound {
                entity: "order",
                id: id.0,
            })
    }

    async fn product(&self, id: ProductId) -> Result<Product> {
        self.catalog
            .get_product(id)
            .await?
            .ok_or(StorefrontError::NotFound {
                entity: "product",
                id: id.0,
            })
    }

    async fn maybe_variation(&self, id: Option<VariationId>) -> Result<Option<Variation>> {
        let Some(id) = id else {
            return Ok(None);
        };
        let variation = self
            .catalog
            .get_variation(id)
            .await?
            .ok_or(StorefrontError::NotFound {
                entity: "variation",
                id: id.0,
            })?;
        Ok(Some(variation))
    }
}
