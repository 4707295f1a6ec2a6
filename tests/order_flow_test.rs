mod common;

use common::{FailingNotifier, FlakyGranter, GOLD, RecordingNotifier, SILVER, SUPPORTER, VIP};
use rolestore::application::orders::{NotifyOutcome, OrderRequest};
use rolestore::domain::ids::{LocusId, OrderId, ProductId, RoleId, UserId};
use rolestore::domain::order::OrderStatus;
use rolestore::domain::ports::FulfillmentEvent;
use rolestore::error::StorefrontError;
use rolestore::infrastructure::in_memory::RecordingEntitlements;
use rolestore::pix;
use rust_decimal_macros::dec;

const ADMIN: UserId = UserId(1);

fn request(purchaser: u64) -> OrderRequest {
    OrderRequest {
        purchaser: UserId(purchaser),
        product: VIP,
        variation: None,
        locus: Some(LocusId(900 + purchaser)),
    }
}

#[tokio::test]
async fn test_purchase_to_delivery() {
    let entitlements = RecordingEntitlements::new();
    let notifier = RecordingNotifier::default();
    let service =
        common::service_with(Box::new(entitlements.clone()), Box::new(notifier.clone())).await;

    let placed = service.create(request(500)).await.unwrap();
    assert_eq!(placed.order.status, OrderStatus::Pending);
    assert_eq!(placed.order.amount.value(), dec!(25.00));
    assert!(placed.payload.as_str().contains("54042500"));
    assert!(placed.payload.as_str().contains(&placed.order.txid));
    pix::verify(placed.payload.as_str()).unwrap();

    let confirmed = service.confirm(placed.order.id, ADMIN).await.unwrap();
    assert_eq!(confirmed.order.status, OrderStatus::Paid);
    assert!(confirmed.order.entitlement_delivered);
    assert_eq!(confirmed.notify, NotifyOutcome::Sent);

    let stored = service.order(placed.order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Paid);
    assert!(stored.entitlement_delivered);
    assert_eq!(entitlements.grants().await, vec![(UserId(500), RoleId(10))]);
    assert_eq!(
        notifier.events().await,
        vec![(placed.order.id, FulfillmentEvent::Confirmed)]
    );

    let again = service.confirm(placed.order.id, ADMIN).await;
    assert!(matches!(
        again,
        Err(StorefrontError::InvalidTransition {
            from: OrderStatus::Paid,
            to: OrderStatus::Paid,
            ..
        })
    ));
    assert_eq!(entitlements.grants().await.len(), 1);
}

#[tokio::test]
async fn test_variation_prices_and_roles() {
    let entitlements = RecordingEntitlements::new();
    let service = common::service(Box::new(entitlements.clone())).await;

    let gold = service
        .create(OrderRequest {
            purchaser: UserId(501),
            product: SUPPORTER,
            variation: Some(GOLD),
            locus: None,
        })
        .await
        .unwrap();
    let silver = service
        .create(OrderRequest {
            purchaser: UserId(502),
            product: SUPPORTER,
            variation: Some(SILVER),
            locus: None,
        })
        .await
        .unwrap();
    assert!(gold.payload.as_str().contains("54043000"));
    assert!(silver.payload.as_str().contains("54041550"));

    let transition = service.confirm(gold.order.id, ADMIN).await.unwrap();
    assert_eq!(transition.notify, NotifyOutcome::Skipped);
    service.confirm(silver.order.id, ADMIN).await.unwrap();

    // Silver has no role of its own and falls back to the product's.
    assert_eq!(
        entitlements.grants().await,
        vec![(UserId(501), RoleId(21)), (UserId(502), RoleId(20))]
    );
}

#[tokio::test]
async fn test_cancel_is_terminal() {
    let entitlements = RecordingEntitlements::new();
    let notifier = RecordingNotifier::default();
    let service =
        common::service_with(Box::new(entitlements.clone()), Box::new(notifier.clone())).await;

    let placed = service.create(request(500)).await.unwrap();
    let cancelled = service.cancel(placed.order.id, ADMIN).await.unwrap();
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
    assert!(!cancelled.order.entitlement_delivered);

    assert!(matches!(
        service.confirm(placed.order.id, ADMIN).await,
        Err(StorefrontError::InvalidTransition {
            from: OrderStatus::Cancelled,
            ..
        })
    ));
    assert!(matches!(
        service.cancel(placed.order.id, ADMIN).await,
        Err(StorefrontError::InvalidTransition { .. })
    ));
    assert!(entitlements.grants().await.is_empty());
    assert_eq!(
        notifier.events().await,
        vec![(placed.order.id, FulfillmentEvent::Cancelled)]
    );
    assert!(service.pending_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_grant_failure_then_retry() {
    let granter = FlakyGranter::failing(1);
    let notifier = RecordingNotifier::default();
    let service = common::service_with(Box::new(granter.clone()), Box::new(notifier.clone())).await;

    let placed = service.create(request(500)).await.unwrap();
    let result = service.confirm(placed.order.id, ADMIN).await;
    assert!(matches!(
        result,
        Err(StorefrontError::EntitlementGrantFailed {
            role: RoleId(10),
            notify: Some(NotifyOutcome::Sent),
            ..
        })
    ));

    // Payment stands even though the role did not arrive, and the locus was still closed.
    let stored = service.order(placed.order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Paid);
    assert!(!stored.entitlement_delivered);
    assert_eq!(notifier.events().await.len(), 1);

    let report = service
        .sales_report(stored.created_at.date_naive())
        .await
        .unwrap();
    assert_eq!(report.undelivered, 1);

    let retried = service
        .retry_entitlement(placed.order.id, ADMIN)
        .await
        .unwrap();
    assert!(retried.entitlement_delivered);
    assert_eq!(granter.granted().await, vec![(UserId(500), RoleId(10))]);

    assert!(matches!(
        service.retry_entitlement(placed.order.id, ADMIN).await,
        Err(StorefrontError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_retry_requires_paid_order() {
    let service = common::service(Box::new(RecordingEntitlements::new())).await;
    let placed = service.create(request(500)).await.unwrap();

    assert!(matches!(
        service.retry_entitlement(placed.order.id, ADMIN).await,
        Err(StorefrontError::InvalidTransition {
            from: OrderStatus::Pending,
            ..
        })
    ));
}

#[tokio::test]
async fn test_notify_failure_keeps_transition() {
    let entitlements = RecordingEntitlements::new();
    let service =
        common::service_with(Box::new(entitlements.clone()), Box::new(FailingNotifier)).await;

    let placed = service.create(request(500)).await.unwrap();
    let transition = service.confirm(placed.order.id, ADMIN).await.unwrap();

    assert!(matches!(transition.notify, NotifyOutcome::NotifyFailed(_)));
    assert_eq!(transition.order.status, OrderStatus::Paid);
    assert!(transition.order.entitlement_delivered);
    assert_eq!(entitlements.grants().await.len(), 1);
}

#[tokio::test]
async fn test_unknown_ids() {
    let service = common::service(Box::new(RecordingEntitlements::new())).await;

    assert!(matches!(
        service.confirm(OrderId(42), ADMIN).await,
        Err(StorefrontError::NotFound { entity: "order", id: 42 })
    ));

    let missing_product = service
        .create(OrderRequest {
            purchaser: UserId(500),
            product: ProductId(99),
            variation: None,
            locus: None,
        })
        .await;
    assert!(matches!(
        missing_product,
        Err(StorefrontError::NotFound { entity: "product", .. })
    ));
    assert!(service.all_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_txids_are_unique() {
    let service = common::service(Box::new(RecordingEntitlements::new())).await;

    let first = service.create(request(500)).await.unwrap();
    let second = service.create(request(500)).await.unwrap();

    assert_ne!(first.order.txid, second.order.txid);
    assert_eq!(first.order.txid.len(), 25);
    assert_ne!(first.payload, second.payload);
}
