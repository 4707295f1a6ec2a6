use crate::domain::catalog::{Product, Variation};
use crate::domain::ids::{OrderId, ProductId, RoleId, UserId, VariationId};
use crate::domain::order::{NewOrder, Order, OrderStatus};
use crate::domain::ports::{
    Catalog, EntitlementGranter, FulfillmentEvent, FulfillmentNotifier, OrderRepository,
};
use crate::error::{Result, StorefrontError};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Read;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Default)]
struct OrderTable {
    orders: BTreeMap<OrderId, Order>,
    txids: HashSet<String>,
    last_id: u64,
}

/// A thread-safe in-memory order store.
///
/// Every status change happens under the write lock, which makes
/// `cas_update_status` atomic per order. Clones share the same table.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    table: Arc<RwLock<OrderTable>>,
}

impl InMemoryOrderStore {
    /// Creates a new, empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderStore {
    async fn insert_order(&self, order: NewOrder) -> Result<Order> {
        let mut table = self.table.write().await;
        if table.txids.contains(&order.txid) {
            return Err(StorefrontError::Conflict(format!(
                "txid {} already used",
                order.txid
            )));
        }
        table.last_id += 1;
        let order = order.into_order(OrderId(table.last_id));
        table.txids.insert(order.txid.clone());
        table.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let table = self.table.read().await;
        Ok(table.orders.get(&id).cloned())
    }

    async fn cas_update_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<bool> {
        let mut table = self.table.write().await;
        let order = table.orders.get_mut(&id).ok_or(StorefrontError::NotFound {
            entity: "order",
            id: id.0,
        })?;
        if order.status != expected {
            return Ok(false);
        }
        order.status = next;
        Ok(true)
    }

    async fn mark_delivered(&self, id: OrderId) -> Result<bool> {
        let mut table = self.table.write().await;
        let order = table.orders.get_mut(&id).ok_or(StorefrontError::NotFound {
            entity: "order",
            id: id.0,
        })?;
        if order.status != OrderStatus::Paid || order.entitlement_delivered {
            return Ok(false);
        }
        order.entitlement_delivered = true;
        Ok(true)
    }

    async fn list_pending(&self) -> Result<Vec<Order>> {
        let table = self.table.read().await;
        let mut pending: Vec<Order> = table
            .orders
            .values()
            .filter(|order| order.status == OrderStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(pending)
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        let table = self.table.read().await;
        Ok(table.orders.values().cloned().collect())
    }
}

#[derive(Default)]
struct CatalogTables {
    products: HashMap<ProductId, Product>,
    variations: BTreeMap<VariationId, Variation>,
}

/// Catalog snapshot as loaded from a JSON file.
#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    pub products: Vec<Product>,
    #[serde(default)]
    pub variations: Vec<Variation>,
}

/// A thread-safe in-memory catalog.
///
/// Rejects entries that would mix fixed-price and per-variation pricing on one product.
#[derive(Default, Clone)]
pub struct InMemoryCatalog {
    tables: Arc<RwLock<CatalogTables>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from a JSON document shaped like [`CatalogFile`].
    pub async fn from_reader<R: Read>(source: R) -> Result<Self> {
        let file: CatalogFile = serde_json::from_reader(source)?;
        let catalog = Self::new();
        for product in file.products {
            catalog.add_product(product).await?;
        }
        for variation in file.variations {
            catalog.add_variation(variation).await?;
        }
        Ok(catalog)
    }

    pub async fn add_product(&self, product: Product) -> Result<()> {
        let mut tables = self.tables.write().await;
        let has_variations = tables.variations.values().any(|v| v.product == product.id);
        if has_variations && !product.uses_variations() {
            return Err(StorefrontError::invalid_input(format!(
                "product {} has variations and cannot take a fixed price",
                product.id
            )));
        }
        tables.products.insert(product.id, product);
        Ok(())
    }

    pub async fn add_variation(&self, variation: Variation) -> Result<()> {
        let mut tables = self.tables.write().await;
        let product = tables
            .products
            .get(&variation.product)
            .ok_or(StorefrontError::NotFound {
                entity: "product",
                id: variation.product.0,
            })?;
        if !product.uses_variations() {
            return Err(StorefrontError::invalid_input(format!(
                "product {} is sold at a fixed price and cannot take variations",
                product.id
            )));
        }
        tables.variations.insert(variation.id, variation);
        Ok(())
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let tables = self.tables.read().await;
        Ok(tables.products.get(&id).cloned())
    }

    async fn get_variation(&self, id: VariationId) -> Result<Option<Variation>> {
        let tables = self.tables.read().await;
        Ok(tables.variations.get(&id).cloned())
    }
}

/// Records every grant instead of calling a chat platform.
#[derive(Default, Clone)]
pub struct RecordingEntitlements {
    grants: Arc<RwLock<Vec<(UserId, RoleId)>>>,
}

impl RecordingEntitlements {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn grants(&self) -> Vec<(UserId, RoleId)> {
        self.grants.read().await.clone()
    }
}

#[async_trait]
impl EntitlementGranter for RecordingEntitlements {
    async fn grant_role(&self, user: UserId, role: RoleId) -> Result<()> {
        info!(%user, %role, "role granted");
        self.grants.write().await.push((user, role));
        Ok(())
    }
}

/// Writes fulfillment events to the log.
#[derive(Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl FulfillmentNotifier for LogNotifier {
    async fn close(&self, order: &Order, event: FulfillmentEvent) -> Result<()> {
        info!(order = %order.id, locus = ?order.locus, ?event, "fulfillment locus closed");
        Ok(())
    }
}
