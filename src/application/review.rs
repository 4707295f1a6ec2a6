use super::orders::{OrderService, Transition};
use crate::domain::ids::{OrderId, UserId};
use crate::domain::order::Order;
use crate::error::{Result, StorefrontError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Matches the idle timeout of the chat view the session backs.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewConfig {
    pub idle_ttl: Duration,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            idle_ttl: DEFAULT_IDLE_TTL,
        }
    }
}

/// One administrator's pass over the pending orders.
///
/// The working set is loaded once and then only shrinks as orders are settled.
/// It is never trusted for legality: every confirm or cancel goes through
/// [`OrderService`], which re-checks the stored status. Sessions are private to
/// one interaction and share nothing but the service.
pub struct ReviewSession {
    service: Arc<OrderService>,
    orders: Vec<Order>,
    cursor: usize,
    config: ReviewConfig,
    last_activity: Instant,
}

impl ReviewSession {
    /// Loads the current pending orders, newest first, with the cursor on the first.
    pub async fn open(service: Arc<OrderService>, config: ReviewConfig) -> Result<Self> {
        let orders = service.pending_orders().await?;
        info!(pending = orders.len(), "review session opened");
        Ok(Self {
            service,
            orders,
            cursor: 0,
            config,
            last_activity: Instant::now(),
        })
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// The order under the cursor.
    pub fn current(&self) -> Result<&Order> {
        self.ensure_live()?;
        self.orders
            .get(self.cursor)
            .ok_or(StorefrontError::NoPendingOrders)
    }

    /// Moves to the next order, wrapping to the first.
    pub fn next(&mut self) -> Result<&Order> {
        self.step(1)
    }

    /// Moves to the previous order, wrapping to the last.
    pub fn previous(&mut self) -> Result<&Order> {
        self.step(-1)
    }

    pub async fn confirm_current(&mut self, by: UserId) -> Result<Transition> {
        let id = self.begin_action()?;
        let result = self.service.confirm(id, by).await;
        self.settle(id, &result);
        result
    }

    pub async fn cancel_current(&mut self, by: UserId) -> Result<Transition> {
        let id = self.begin_action()?;
        let result = self.service.cancel(id, by).await;
        self.settle(id, &result);
        result
    }

    fn step(&mut self, delta: isize) -> Result<&Order> {
        self.touch()?;
        let len = self.orders.len();
        if len == 0 {
            return Err(StorefrontError::NoPendingOrders);
        }
        self.cursor = (self.cursor as isize + delta).rem_euclid(len as isize) as usize;
        Ok(&self.orders[self.cursor])
    }

    fn begin_action(&mut self) -> Result<OrderId> {
        self.touch()?;
        self.orders
            .get(self.cursor)
            .map(|order| order.id)
            .ok_or(StorefrontError::NoPendingOrders)
    }

    /// Drops `id` from the working set once the store says it is no longer pending.
    ///
    /// Only storage failures leave the order in place, since they say nothing
    /// about its status.
    fn settle(&mut self, id: OrderId, result: &Result<Transition>) {
        let settled = match result {
            Ok(_) => true,
            Err(
                StorefrontError::InvalidTransition { .. }
                | StorefrontError::EntitlementGrantFailed { .. }
                | StorefrontError::NotFound { .. },
            ) => true,
            Err(_) => false,
        };
        if !settled {
            return;
        }
        self.orders.retain(|order| order.id != id);
        self.cursor = self.cursor.min(self.orders.len().saturating_sub(1));
    }

    fn touch(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.last_activity = Instant::now();
        Ok(())
    }

    fn ensure_live(&self) -> Result<()> {
        if self.last_activity.elapsed() >= self.config.idle_ttl {
            warn!(idle = ?self.last_activity.elapsed(), "review session expired");
            return Err(StorefrontError::SessionExpired);
        }
        Ok(())
    }
}
