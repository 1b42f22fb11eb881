//! The uniform `SubscriptionService` contract every billing backend
//! satisfies, plus the shared update-listener registry adapters use for
//! their push channel.

use crate::model::{Platform, PricingPackage, SubscriptionInfo};
use crate::Result;
use async_trait::async_trait;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::error;

/// One-time service configuration.
#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// Backend API key. Ignored by the mock engine.
    pub api_key: String,
    /// The entitlement identifier the app gates paid access on.
    pub entitlement_id: String,
    /// Route calls to the backend's sandbox environment.
    pub sandbox: bool,
}

impl BillingConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            entitlement_id: "pro".to_string(),
            sandbox: false,
        }
    }

    pub fn with_entitlement_id(mut self, entitlement_id: impl Into<String>) -> Self {
        self.entitlement_id = entitlement_id.into();
        self
    }

    pub fn with_sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }
}

/// Outcome of a purchase attempt.
///
/// User cancellation is a normal outcome, not an error: callers stay silent
/// on `Cancelled` and surface only `Err(_)` results.
#[derive(Debug, Clone, PartialEq)]
pub enum PurchaseOutcome {
    /// The purchase went through; the snapshot is the post-purchase state.
    Completed(SubscriptionInfo),
    /// The user backed out of the payment sheet.
    Cancelled,
}

/// Callback invoked with the new canonical snapshot whenever entitlement
/// changes outside the app's own action (renewal, refund, another device).
pub type UpdateCallback = Arc<dyn Fn(SubscriptionInfo) + Send + Sync>;

/// Unsubscribe token for a registered update listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

/// Uniform async contract over a billing backend.
///
/// Each implementation owns the translation from its native payload shape
/// into [`SubscriptionInfo`]; native field names never leak through this
/// interface.
#[async_trait]
pub trait SubscriptionService: Send + Sync {
    /// The platform this service reports in its snapshots.
    fn platform(&self) -> Platform;

    /// One-time SDK initialization. Idempotent: repeated configuration
    /// (e.g. hot reload) is tolerated silently.
    async fn configure(&self, config: &BillingConfig) -> Result<()>;

    /// Associate the billing identity with an application user. Logging in
    /// over an anonymous or identical identity must not fail.
    async fn log_in(&self, user_id: &str) -> Result<SubscriptionInfo>;

    /// Detach the billing identity. Backends where logging out an anonymous
    /// identity is illegal fall back to a plain info fetch instead of
    /// failing.
    async fn log_out(&self) -> Result<SubscriptionInfo>;

    /// Point-in-time authoritative fetch.
    async fn subscription_info(&self) -> Result<SubscriptionInfo>;

    /// The purchasable catalog. An upstream catalog with no products is the
    /// typed [`BillingError::CatalogEmpty`](crate::BillingError::CatalogEmpty)
    /// condition, distinguishable from a network failure.
    async fn packages(&self) -> Result<Vec<PricingPackage>>;

    /// Attempt a purchase of the given package.
    async fn purchase(&self, package: &PricingPackage) -> Result<PurchaseOutcome>;

    /// Re-synchronize entitlement from the backend's source of truth.
    /// Absence of prior purchases is success with inactive status.
    async fn restore(&self) -> Result<SubscriptionInfo>;

    /// Register a push listener for out-of-band entitlement changes.
    /// Backends without a push channel return `None`.
    fn add_update_listener(&self, _callback: UpdateCallback) -> Option<ListenerToken> {
        None
    }

    /// Remove a previously registered push listener.
    fn remove_update_listener(&self, _token: ListenerToken) {}

    /// Deep link to the backend's billing management page (web-only concept).
    fn management_url(&self) -> Option<String> {
        None
    }
}

/// Explicit observer registry with unsubscribe tokens.
///
/// Listener identity is the token, not the closure, so removal does not
/// depend on closure equality. A panicking listener is isolated: the
/// remaining listeners still run.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, UpdateCallback)>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, callback: UpdateCallback) -> ListenerToken {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.push((id, callback));
        ListenerToken(id)
    }

    pub fn remove(&self, token: ListenerToken) {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.retain(|(id, _)| *id != token.0);
    }

    pub fn len(&self) -> usize {
        let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notify every registered listener with a clone of the snapshot.
    /// Callbacks run outside the registry lock so a listener may
    /// re-register or unsubscribe from within its own invocation.
    pub fn notify(&self, info: &SubscriptionInfo) {
        let snapshot: Vec<(u64, UpdateCallback)> = {
            let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
            listeners.clone()
        };
        for (id, callback) in snapshot {
            let result = catch_unwind(AssertUnwindSafe(|| callback(info.clone())));
            if result.is_err() {
                error!(listener = id, "subscription update listener panicked");
            }
        }
    }
}
