#![allow(dead_code)]

use async_trait::async_trait;
use rolestore::application::orders::{OrderService, TxidGenerator};
use rolestore::domain::catalog::{Product, Variation};
use rolestore::domain::ids::{OrderId, ProductId, RoleId, UserId, VariationId};
use rolestore::domain::order::{Amount, Order};
use rolestore::domain::ports::{
    EntitlementGranter, EntitlementGranterBox, FulfillmentEvent, FulfillmentNotifier,
    FulfillmentNotifierBox,
};
use rolestore::error::{Result, StorefrontError};
use rolestore::infrastructure::in_memory::{InMemoryCatalog, InMemoryOrderStore, LogNotifier};
use rolestore::pix::Merchant;
use rust_decimal_macros::dec;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

pub const VIP: ProductId = ProductId(1);
pub const SUPPORTER: ProductId = ProductId(2);
pub const GOLD: VariationId = VariationId(7);
pub const SILVER: VariationId = VariationId(8);

pub fn merchant() -> Merchant {
    Merchant::new("abc@bank.com", "LOJA", "SAO PAULO")
}

/// VIP at 25.00 granting role 10; Supporter sold as Gold (30.00, role 21) or Silver (15.50).
pub async fn catalog() -> InMemoryCatalog {
    let catalog = InMemoryCatalog::new();
    catalog
        .add_product(Product {
            id: VIP,
            name: "VIP".to_string(),
            description: String::new(),
            price: Some(dec!(25.00)),
            role: RoleId(10),
            color: "#ffffff".to_string(),
            thumbnail_url: String::new(),
            banner_url: String::new(),
            channel_id: None,
            message_id: None,
        })
        .await
        .unwrap();
    catalog
        .add_product(Product {
            id: SUPPORTER,
            name: "Supporter".to_string(),
            description: String::new(),
            price: None,
            role: RoleId(20),
            color: "#ffaa00".to_string(),
            thumbnail_url: String::new(),
            banner_url: String::new(),
            channel_id: None,
            message_id: None,
        })
        .await
        .unwrap();
    catalog
        .add_variation(Variation {
            id: GOLD,
            product: SUPPORTER,
            name: "Gold".to_string(),
            price: Amount::new(dec!(30.00)).unwrap(),
            role: Some(RoleId(21)),
        })
        .await
        .unwrap();
    catalog
        .add_variation(Variation {
            id: SILVER,
            product: SUPPORTER,
            name: "Silver".to_string(),
            price: Amount::new(dec!(15.50)).unwrap(),
            role: None,
        })
        .await
        .unwrap();
    catalog
}

pub async fn service_with(
    entitlements: EntitlementGranterBox,
    notifier: FulfillmentNotifierBox,
) -> OrderService {
    OrderService::new(
        Box::new(InMemoryOrderStore::new()),
        Box::new(catalog().await),
        entitlements,
        notifier,
        merchant(),
    )
    .with_txids(TxidGenerator::starting_at(1))
}

pub async fn service(entitlements: EntitlementGranterBox) -> OrderService {
    service_with(entitlements, Box::new(LogNotifier)).await
}

/// Fails its first `failures` grants, then succeeds.
#[derive(Clone, Default)]
pub struct FlakyGranter {
    failures: Arc<AtomicUsize>,
    granted: Arc<Mutex<Vec<(UserId, RoleId)>>>,
}

impl FlakyGranter {
    pub fn failing(failures: usize) -> Self {
        Self {
            failures: Arc::new(AtomicUsize::new(failures)),
            granted: Arc::default(),
        }
    }

    pub async fn granted(&self) -> Vec<(UserId, RoleId)> {
        self.granted.lock().await.clone()
    }
}

#[async_trait]
impl EntitlementGranter for FlakyGranter {
    async fn grant_role(&self, user: UserId, role: RoleId) -> Result<()> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StorefrontError::Storage("member has left the guild".to_string()));
        }
        self.granted.lock().await.push((user, role));
        Ok(())
    }
}

/// Takes `delay` to answer every grant, optionally failing the first one.
#[derive(Clone)]
pub struct SlowGranter {
    delay: Duration,
    fail_next: Arc<AtomicBool>,
    granted: Arc<Mutex<Vec<(UserId, RoleId)>>>,
}

impl SlowGranter {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fail_next: Arc::new(AtomicBool::new(false)),
            granted: Arc::default(),
        }
    }

    pub fn failing_once(self) -> Self {
        self.fail_next.store(true, Ordering::SeqCst);
        self
    }

    pub async fn granted(&self) -> Vec<(UserId, RoleId)> {
        self.granted.lock().await.clone()
    }
}

#[async_trait]
impl EntitlementGranter for SlowGranter {
    async fn grant_role(&self, user: UserId, role: RoleId) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StorefrontError::Storage("rate limited".to_string()));
        }
        self.granted.lock().await.push((user, role));
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<(OrderId, FulfillmentEvent)>>>,
}

impl RecordingNotifier {
    pub async fn events(&self) -> Vec<(OrderId, FulfillmentEvent)> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl FulfillmentNotifier for RecordingNotifier {
    async fn close(&self, order: &Order, event: FulfillmentEvent) -> Result<()> {
        self.events.lock().await.push((order.id, event));
        Ok(())
    }
}

pub struct FailingNotifier;

#[async_trait]
impl FulfillmentNotifier for FailingNotifier {
    async fn close(&self, _order: &Order, _event: FulfillmentEvent) -> Result<()> {
        Err(StorefrontError::Storage("channel deleted".to_string()))
    }
}

pub fn write_commands(path: &Path, rows: &[[&str; 4]]) -> std::result::Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(["type", "actor", "target", "variation"])?;
    for row in rows {
        wtr.write_record(row)?;
    }

    wtr.flush()?;
    Ok(())
}
