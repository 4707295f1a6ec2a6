use crate::domain::ids::OrderId;
use crate::domain::order::{NewOrder, Order, OrderStatus};
use crate::domain::ports::OrderRepository;
use crate::error::{Result, StorefrontError};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for order records, keyed by big-endian order id.
pub const CF_ORDERS: &str = "orders";
/// Column Family mapping each txid to its order id.
pub const CF_TXIDS: &str = "txids";
/// Column Family for store bookkeeping (the id counter).
pub const CF_META: &str = "meta";

const LAST_ID_KEY: &[u8] = b"last_order_id";

/// A persistent order store using RocksDB.
///
/// Reads go straight to the database. Every read-check-write sequence runs under
/// one async mutex, so the conditional status update is atomic for every handle
/// cloned from the same `open` call.
#[derive(Clone)]
pub struct RocksDbOrderStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbOrderStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_ORDERS, CF_TXIDS, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn family(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorefrontError::Storage(format!("{name} column family not found")))
    }

    fn read(&self, id: OrderId) -> Result<Option<Order>> {
        let cf = self.family(CF_ORDERS)?;
        match self.db.get_cf(cf, id.0.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write(&self, order: &Order) -> Result<()> {
        let cf = self.family(CF_ORDERS)?;
        self.db
            .put_cf(cf, order.id.0.to_be_bytes(), serde_json::to_vec(order)?)?;
        Ok(())
    }

    fn last_id(&self) -> Result<u64> {
        let cf = self.family(CF_META)?;
        let Some(bytes) = self.db.get_cf(cf, LAST_ID_KEY)? else {
            return Ok(0);
        };
        let bytes: [u8; 8] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| StorefrontError::Storage("corrupt order id counter".to_string()))?;
        Ok(u64::from_be_bytes(bytes))
    }

    fn scan(&self) -> Result<Vec<Order>> {
        let cf = self.family(CF_ORDERS)?;
        let mut orders = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            orders.push(serde_json::from_slice(&value)?);
        }
        Ok(orders)
    }
}

#[async_trait]
impl OrderRepository for RocksDbOrderStore {
    async fn insert_order(&self, order: NewOrder) -> Result<Order> {
        let _guard = self.write_lock.lock().await;
        let txids = self.family(CF_TXIDS)?;
        if self.db.get_pinned_cf(txids, order.txid.as_bytes())?.is_some() {
            return Err(StorefrontError::Conflict(format!(
                "txid {} already used",
                order.txid
            )));
        }

        let id = self.last_id()? + 1;
        let order = order.into_order(OrderId(id));

        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.family(CF_ORDERS)?,
            id.to_be_bytes(),
            serde_json::to_vec(&order)?,
        );
        batch.put_cf(txids, order.txid.as_bytes(), id.to_be_bytes());
        batch.put_cf(self.family(CF_META)?, LAST_ID_KEY, id.to_be_bytes());
        self.db.write(batch)?;

        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        self.read(id)
    }

    async fn cas_update_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut order = self.read(id)?.ok_or(StorefrontError::NotFound {
            entity: "order",
            id: id.0,
        })?;
        if order.status != expected {
            return Ok(false);
        }
        order.status = next;
        self.write(&order)?;
        Ok(true)
    }

    async fn mark_delivered(&self, id: OrderId) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut order = self.read(id)?.ok_or(StorefrontError::NotFound {
            entity: "order",
            id: id.0,
        })?;
        if order.status != OrderStatus::Paid || order.entitlement_delivered {
            return Ok(false);
        }
        order.entitlement_delivered = true;
        self.write(&order)?;
        Ok(true)
    }

    async fn list_pending(&self) -> Result<Vec<Order>> {
        let mut pending: Vec<Order> = self
            .scan()?
            .into_iter()
            .filter(|order| order.status == OrderStatus::Pending)
            .collect();
        pending.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(pending)
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        self.scan()
    }
}
