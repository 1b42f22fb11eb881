//! End-to-end store flows against the mock billing engine.
//!
//! The mock engine mirrors the production adapters' contract exactly, so
//! everything here exercises the same paths the real platforms take.

use prokit_lib::{
    BillingConfig, BillingError, LifecycleKind, MockBillingEngine, Platform, SubscriptionInfo,
    SubscriptionStatus,
};
use prokit_store::{
    MemoryKeyValueStore, PersistedState, PurchaseStatus, StaticIdentity, StorePhase,
    SubscriptionStore,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Harness {
    store: SubscriptionStore,
    engine: Arc<MockBillingEngine>,
    identity: Arc<StaticIdentity>,
    kv: Arc<MemoryKeyValueStore>,
    events: Arc<Mutex<Vec<LifecycleKind>>>,
}

fn harness_with_identity(user_id: Option<&str>) -> Harness {
    let engine = Arc::new(MockBillingEngine::new());
    let identity = Arc::new(StaticIdentity::new(user_id.map(str::to_string)));
    let kv = Arc::new(MemoryKeyValueStore::new());
    let store = SubscriptionStore::new(
        engine.clone(),
        identity.clone(),
        kv.clone(),
        BillingConfig::new("mock"),
    );

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    store.add_lifecycle_listener(Arc::new(move |event| {
        sink.lock().unwrap().push(event.kind);
    }));

    Harness {
        store,
        engine,
        identity,
        kv,
        events,
    }
}

fn harness() -> Harness {
    harness_with_identity(None)
}

/// Let fire-and-forget persistence tasks run.
async fn flush() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn test_fresh_purchase_activates() {
    let h = harness();
    h.store.initialize().await;
    assert_eq!(h.store.phase(), StorePhase::Ready);
    assert!(!h.store.is_pro());

    let packages = h.store.packages();
    assert_eq!(packages.len(), 2);

    let status = h.store.purchase_package(&packages[0]).await.unwrap();
    assert_eq!(status, PurchaseStatus::Completed);
    assert!(h.store.is_pro());

    // No drift between the committed snapshot and the derived flag.
    let info = h.store.customer_info().unwrap();
    assert_eq!(h.store.is_pro(), info.is_active);
    assert_eq!(info.product_id.as_deref(), Some("pro_monthly"));

    let events = h.events.lock().unwrap().clone();
    assert_eq!(events, vec![LifecycleKind::Activated]);
}

#[tokio::test]
async fn test_cancelled_purchase_is_clean_noop() {
    let h = harness();
    h.store.initialize().await;
    h.engine.cancel_next_purchase();

    let packages = h.store.packages();
    let status = h.store.purchase_package(&packages[0]).await.unwrap();
    assert_eq!(status, PurchaseStatus::Cancelled);
    assert!(!h.store.is_pro());
    assert!(!h.store.loading());
    assert!(h.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_purchase_keeps_last_known_state() {
    let h = harness();
    h.store.initialize().await;
    h.engine.fail_next_purchase("card declined");

    let packages = h.store.packages();
    let err = h.store.purchase_package(&packages[0]).await.unwrap_err();
    assert!(matches!(err, BillingError::PaymentFailed { .. }));
    assert!(!h.store.is_pro());
    assert!(!h.store.loading());
}

#[tokio::test]
async fn test_empty_catalog_degrades_to_no_plans() {
    let h = harness();
    h.engine.set_catalog_empty(true);
    h.store.initialize().await;

    assert_eq!(h.store.phase(), StorePhase::Ready);
    assert!(h.store.packages().is_empty());

    // Refreshing again stays quiet and empty.
    h.store.refresh_packages().await;
    assert!(h.store.packages().is_empty());
}

#[tokio::test]
async fn test_push_update_commits_through_same_path() {
    let h = harness();
    h.store.initialize().await;
    assert!(!h.store.is_pro());

    // Entitlement granted on "another device".
    h.engine.set_entitled(true);
    assert!(h.store.is_pro());
    assert_eq!(
        h.events.lock().unwrap().clone(),
        vec![LifecycleKind::Activated]
    );

    // Entitlement lapses: the product is still on record, so the snapshot
    // reports expired rather than cancelled.
    h.engine.set_entitled(false);
    assert!(!h.store.is_pro());
    let events = h.events.lock().unwrap().clone();
    assert_eq!(events[1], LifecycleKind::Expired);
}

#[tokio::test]
async fn test_restore_without_purchases_is_success() {
    let h = harness();
    h.store.initialize().await;

    h.store.restore_purchases().await.unwrap();
    assert!(!h.store.is_pro());
    let info = h.store.customer_info().unwrap();
    assert_eq!(info.status, SubscriptionStatus::None);
}

#[tokio::test]
async fn test_restore_recovers_entitlement() {
    let h = harness();
    h.store.initialize().await;
    h.engine.set_entitled(true);

    // Simulate a reinstall: the store forgets, the backend remembers.
    h.store.set_customer_info(SubscriptionInfo::none(Platform::Mock));
    assert!(!h.store.is_pro());

    h.store.restore_purchases().await.unwrap();
    assert!(h.store.is_pro());
}

#[tokio::test]
async fn test_upgrade_emits_upgraded_event() {
    let h = harness();
    h.store.initialize().await;

    let packages = h.store.packages();
    let monthly = packages.iter().find(|p| p.identifier == "pro_monthly").unwrap();
    let annual = packages.iter().find(|p| p.identifier == "pro_annual").unwrap();

    h.store.purchase_package(monthly).await.unwrap();
    h.store.purchase_package(annual).await.unwrap();

    let events = h.events.lock().unwrap().clone();
    assert_eq!(events, vec![LifecycleKind::Activated, LifecycleKind::Upgraded]);
    assert_eq!(
        h.store.customer_info().unwrap().product_id.as_deref(),
        Some("pro_annual")
    );
}

#[tokio::test]
async fn test_persisted_subset_roundtrip() {
    let h = harness();
    h.store.initialize().await;
    let packages = h.store.packages();
    h.store.purchase_package(&packages[1]).await.unwrap();
    flush().await;

    let persisted = PersistedState::load(&*h.kv).await.unwrap().unwrap();
    assert!(persisted.is_pro);
    assert_eq!(persisted.platform, Platform::Mock);
    assert_eq!(persisted.customer_info, h.store.customer_info());
    assert_eq!(persisted.web_subscription_info, None);
}

#[tokio::test]
async fn test_hydration_survives_offline_start() {
    let h = harness();
    h.store.initialize().await;
    let packages = h.store.packages();
    h.store.purchase_package(&packages[0]).await.unwrap();
    flush().await;

    // Next launch: same storage, but the backend is unreachable.
    let engine = Arc::new(MockBillingEngine::new());
    engine.set_offline(true);
    let store = SubscriptionStore::new(
        engine,
        Arc::new(StaticIdentity::anonymous()),
        h.kv.clone(),
        BillingConfig::new("mock"),
    );
    store.initialize().await;

    assert_eq!(store.phase(), StorePhase::Ready);
    assert!(store.is_pro(), "hydrated entitlement survives offline start");
}

#[tokio::test]
async fn test_cold_start_with_unreachable_backend_is_inactive_not_crashed() {
    let h = harness();
    h.engine.set_offline(true);
    h.store.initialize().await;

    assert_eq!(h.store.phase(), StorePhase::Ready);
    assert!(!h.store.is_pro());
    assert!(h.store.customer_info().is_some());
    assert!(h.store.packages().is_empty());
}

#[tokio::test]
async fn test_identity_switch_reinitializes() {
    let h = harness_with_identity(Some("user-a"));
    h.store.initialize().await;
    let watcher = h.store.watch_identity();

    // Sign out while ready: the store re-binds anonymously without
    // throwing, even though nothing is entitled.
    h.identity.set_user(None);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.store.phase(), StorePhase::Ready);
    assert!(!h.store.is_pro());

    // Sign in as somebody else while the backend is down: still no crash,
    // entitlement recomputed from last known state.
    h.engine.set_offline(true);
    h.identity.set_user(Some("user-b".to_string()));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.store.phase(), StorePhase::Ready);
    assert!(!h.store.is_pro());

    watcher.abort();
}

#[tokio::test]
async fn test_panicking_lifecycle_listener_is_isolated() {
    let h = harness();
    h.store.initialize().await;

    h.store.add_lifecycle_listener(Arc::new(|_| panic!("listener bug")));
    let seen = Arc::new(Mutex::new(0u32));
    let sink = seen.clone();
    h.store.add_lifecycle_listener(Arc::new(move |_| {
        *sink.lock().unwrap() += 1;
    }));

    h.engine.set_entitled(true);
    assert!(h.store.is_pro());
    assert_eq!(*seen.lock().unwrap(), 1);

    // The store stays fully usable after the panic.
    h.store.restore_purchases().await.unwrap();
    assert!(h.store.is_pro());
}
