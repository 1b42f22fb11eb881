//! In-memory billing engine for development and tests.
//!
//! Implements the full [`SubscriptionService`] contract without any network
//! access so the store and the lifecycle detector can be exercised exactly
//! as against the production adapters — same method signatures, same
//! error and cancellation semantics.

use crate::errors::BillingError;
use crate::model::{
    BillingPeriod, Platform, PricingPackage, SubscriptionInfo, SubscriptionStatus,
};
use crate::service::{
    BillingConfig, ListenerRegistry, ListenerToken, PurchaseOutcome, SubscriptionService,
    UpdateCallback,
};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;
use tracing::debug;

/// What the next `purchase` call should do.
#[derive(Debug, Clone, Default, PartialEq)]
enum NextPurchase {
    #[default]
    Succeed,
    Cancel,
    Fail(String),
}

#[derive(Debug, Default)]
struct MockState {
    configured: bool,
    user_id: Option<String>,
    entitled: bool,
    is_trial: bool,
    product_id: Option<String>,
    expiration: Option<DateTime<Utc>>,
    will_renew: bool,
    last_transaction_id: Option<String>,
    next_purchase: NextPurchase,
    catalog_empty: bool,
    offline: bool,
}

impl MockState {
    fn snapshot(&self) -> SubscriptionInfo {
        let status = if self.entitled {
            if self.is_trial {
                SubscriptionStatus::Trial
            } else {
                SubscriptionStatus::Active
            }
        } else if self.product_id.is_some() {
            SubscriptionStatus::Expired
        } else {
            SubscriptionStatus::None
        };
        SubscriptionInfo::new(
            Platform::Mock,
            status,
            self.product_id.clone(),
            self.expiration,
            self.entitled && self.will_renew,
        )
    }
}

/// Simulated billing engine with deterministic, overridable responses.
#[derive(Default)]
pub struct MockBillingEngine {
    state: Mutex<MockState>,
    listeners: ListenerRegistry,
}

impl MockBillingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    /// Current fabricated snapshot without going through the async contract.
    pub fn snapshot(&self) -> SubscriptionInfo {
        self.with_state(|state| state.snapshot())
    }

    /// Toggle the fabricated "pro" entitlement and fire update listeners,
    /// simulating an out-of-band change (renewal, refund, other device).
    pub fn set_entitled(&self, entitled: bool) {
        let info = self.with_state(|state| {
            state.entitled = entitled;
            if entitled {
                state
                    .product_id
                    .get_or_insert_with(|| "pro_monthly".to_string());
                state.expiration = Some(Utc::now() + Duration::days(30));
                state.will_renew = true;
            } else {
                state.will_renew = false;
            }
            state.is_trial = false;
            state.snapshot()
        });
        self.listeners.notify(&info);
    }

    /// Put the fabricated customer into a live trial and fire listeners.
    pub fn start_trial(&self, product_id: &str, days: i64) {
        let info = self.with_state(|state| {
            state.entitled = true;
            state.is_trial = true;
            state.product_id = Some(product_id.to_string());
            state.expiration = Some(Utc::now() + Duration::days(days));
            state.will_renew = true;
            state.snapshot()
        });
        self.listeners.notify(&info);
    }

    /// Make the next `purchase` call resolve as user-cancelled.
    pub fn cancel_next_purchase(&self) {
        self.with_state(|state| state.next_purchase = NextPurchase::Cancel);
    }

    /// Make the next `purchase` call fail with a payment error.
    pub fn fail_next_purchase(&self, reason: impl Into<String>) {
        self.with_state(|state| state.next_purchase = NextPurchase::Fail(reason.into()));
    }

    /// Simulate an upstream project with no products configured.
    pub fn set_catalog_empty(&self, empty: bool) {
        self.with_state(|state| state.catalog_empty = empty);
    }

    /// Simulate network loss: info fetches, login and restore fail until
    /// cleared.
    pub fn set_offline(&self, offline: bool) {
        self.with_state(|state| state.offline = offline);
    }

    /// Transaction id recorded by the last successful purchase.
    pub fn last_transaction_id(&self) -> Option<String> {
        self.with_state(|state| state.last_transaction_id.clone())
    }

    /// Forced reset back to a fresh, unentitled customer. Listeners stay
    /// registered; a reset fires them with the cleared snapshot.
    pub fn reset(&self) {
        let info = self.with_state(|state| {
            let configured = state.configured;
            *state = MockState {
                configured,
                ..MockState::default()
            };
            state.snapshot()
        });
        self.listeners.notify(&info);
    }

    fn ensure_online(&self, operation: &'static str) -> Result<()> {
        if self.with_state(|state| state.offline) {
            return Err(BillingError::network(operation, "simulated network loss"));
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionService for MockBillingEngine {
    fn platform(&self) -> Platform {
        Platform::Mock
    }

    async fn configure(&self, _config: &BillingConfig) -> Result<()> {
        self.with_state(|state| {
            if state.configured {
                debug!("mock billing engine already configured, skipping");
            }
            state.configured = true;
        });
        Ok(())
    }

    async fn log_in(&self, user_id: &str) -> Result<SubscriptionInfo> {
        self.ensure_online("logIn")?;
        Ok(self.with_state(|state| {
            state.user_id = Some(user_id.to_string());
            state.snapshot()
        }))
    }

    async fn log_out(&self) -> Result<SubscriptionInfo> {
        // Logging out an anonymous mock identity is legal; nothing to detach.
        Ok(self.with_state(|state| {
            state.user_id = None;
            state.snapshot()
        }))
    }

    async fn subscription_info(&self) -> Result<SubscriptionInfo> {
        self.ensure_online("getSubscriptionInfo")?;
        Ok(self.snapshot())
    }

    async fn packages(&self) -> Result<Vec<PricingPackage>> {
        self.ensure_online("getPackages")?;
        if self.with_state(|state| state.catalog_empty) {
            return Err(BillingError::CatalogEmpty);
        }
        Ok(vec![
            mock_package(
                "pro_monthly",
                "Pro Monthly",
                "Monthly subscription",
                9.99,
                BillingPeriod::Monthly,
            ),
            mock_package(
                "pro_annual",
                "Pro Annual",
                "Annual subscription",
                79.99,
                BillingPeriod::Annual,
            ),
        ])
    }

    async fn purchase(&self, package: &PricingPackage) -> Result<PurchaseOutcome> {
        self.ensure_online("purchasePackage")?;
        let directive = self.with_state(|state| {
            std::mem::take(&mut state.next_purchase)
        });
        match directive {
            NextPurchase::Cancel => {
                debug!(package = %package.identifier, "mock purchase cancelled by user");
                Ok(PurchaseOutcome::Cancelled)
            }
            NextPurchase::Fail(reason) => Err(BillingError::payment(reason)),
            NextPurchase::Succeed => {
                let info = self.with_state(|state| {
                    state.entitled = true;
                    state.is_trial = false;
                    state.product_id = Some(package.identifier.clone());
                    state.expiration = match package.billing_period {
                        BillingPeriod::Monthly => Some(Utc::now() + Duration::days(30)),
                        BillingPeriod::Annual => Some(Utc::now() + Duration::days(365)),
                        BillingPeriod::Lifetime => None,
                    };
                    state.will_renew = package.billing_period != BillingPeriod::Lifetime;
                    state.last_transaction_id = Some(uuid::Uuid::new_v4().to_string());
                    state.snapshot()
                });
                self.listeners.notify(&info);
                Ok(PurchaseOutcome::Completed(info))
            }
        }
    }

    async fn restore(&self) -> Result<SubscriptionInfo> {
        self.ensure_online("restorePurchases")?;
        // Entitlement survives "reinstalls": the mock's own state is the
        // backend source of truth.
        Ok(self.snapshot())
    }

    fn add_update_listener(&self, callback: UpdateCallback) -> Option<ListenerToken> {
        Some(self.listeners.add(callback))
    }

    fn remove_update_listener(&self, token: ListenerToken) {
        self.listeners.remove(token);
    }
}

fn mock_package(
    identifier: &str,
    title: &str,
    description: &str,
    price: f64,
    billing_period: BillingPeriod,
) -> PricingPackage {
    PricingPackage {
        identifier: identifier.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        price,
        price_string: format!("${price:.2}"),
        currency_code: "USD".to_string(),
        billing_period,
        platform: Platform::Mock,
        platform_data: serde_json::json!({ "mock_product": identifier }),
    }
}
