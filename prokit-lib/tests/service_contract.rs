//! Contract test: drive a service purely through `Arc<dyn SubscriptionService>`,
//! the way the store consumes it, with no knowledge of the implementation
//! behind the trait object.

use prokit_lib::{
    service_for_platform, BillingConfig, MockBillingEngine, Platform, PlatformDeps,
    PurchaseOutcome, SubscriptionService, SubscriptionStatus,
};
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn test_full_session_through_trait_object() {
    let service = service_for_platform(Platform::Mock, PlatformDeps::default()).unwrap();

    service.configure(&BillingConfig::new("mock")).await.unwrap();
    // Configuration is idempotent.
    service.configure(&BillingConfig::new("mock")).await.unwrap();

    let info = service.log_in("user-a").await.unwrap();
    assert_eq!(info.status, SubscriptionStatus::None);
    assert!(!info.is_active);

    let packages = service.packages().await.unwrap();
    assert!(!packages.is_empty());
    assert!(packages.iter().all(|p| p.platform == Platform::Mock));

    match service.purchase(&packages[0]).await.unwrap() {
        PurchaseOutcome::Completed(info) => {
            assert!(info.is_active);
            assert_eq!(info.product_id.as_deref(), Some(packages[0].identifier.as_str()));
        }
        PurchaseOutcome::Cancelled => panic!("expected completed purchase"),
    }

    let restored = service.restore().await.unwrap();
    assert!(restored.is_active);

    // Logging out an anonymous or signed-in identity never fails.
    let after_logout = service.log_out().await.unwrap();
    assert_eq!(after_logout.platform, Platform::Mock);
}

#[tokio::test]
async fn test_push_channel_through_trait_object() {
    let engine = Arc::new(MockBillingEngine::new());
    let service: Arc<dyn SubscriptionService> = engine.clone();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let token = service
        .add_update_listener(Arc::new(move |info| {
            sink.lock().unwrap().push(info.is_active);
        }))
        .unwrap();

    engine.set_entitled(true);
    service.remove_update_listener(token);
    engine.set_entitled(false);

    assert_eq!(*seen.lock().unwrap(), vec![true]);
}
