//! Adapter over the web billing backend.

use crate::errors::BillingError;
use crate::model::{
    BillingPeriod, Platform, PricingPackage, SubscriptionInfo, SubscriptionStatus,
};
use crate::sdk::{RawWebPlan, RawWebSubscription, WebBillingClient, WebBillingError};
use crate::service::{
    BillingConfig, ListenerRegistry, ListenerToken, PurchaseOutcome, SubscriptionService,
    UpdateCallback,
};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Opaque purchase handle embedded in `PricingPackage::platform_data`.
#[derive(Debug, Serialize, Deserialize)]
struct WebPlanHandle {
    plan_id: String,
}

/// `SubscriptionService` over an opaque [`WebBillingClient`].
///
/// Web billing has no anonymous entitlement: `log_out` clears the bound
/// user and reports the inactive snapshot rather than asking the backend.
pub struct WebAdapter {
    client: Arc<dyn WebBillingClient>,
    user_id: Mutex<Option<String>>,
    configured: AtomicBool,
    listeners: Arc<ListenerRegistry>,
}

impl WebAdapter {
    pub fn new(client: Arc<dyn WebBillingClient>) -> Self {
        Self {
            client,
            user_id: Mutex::new(None),
            configured: AtomicBool::new(false),
            listeners: Arc::new(ListenerRegistry::new()),
        }
    }

    fn user_id(&self) -> Option<String> {
        self.user_id.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Feed a server-pushed (webhook-relayed) subscription payload into the
    /// adapter's push channel. The embedding app wires its realtime
    /// transport to this.
    pub fn push_update(&self, raw: RawWebSubscription) {
        let info = translate_web_subscription(&raw);
        self.listeners.notify(&info);
    }
}

fn translate_web_subscription(raw: &RawWebSubscription) -> SubscriptionInfo {
    let status = match raw.status.as_str() {
        "active" => SubscriptionStatus::Active,
        "trialing" => SubscriptionStatus::Trial,
        "canceled" | "cancelled" | "past_due" => SubscriptionStatus::Cancelled,
        "expired" => SubscriptionStatus::Expired,
        _ => SubscriptionStatus::None,
    };

    let will_renew = status.is_entitled() && !raw.cancel_at_period_end;

    SubscriptionInfo::new(
        Platform::WebBilling,
        status,
        raw.plan_id.clone(),
        raw.current_period_end,
        will_renew,
    )
}

fn translate_plan(raw: &RawWebPlan) -> Option<PricingPackage> {
    let billing_period = match raw.interval.as_str() {
        "month" | "monthly" => BillingPeriod::Monthly,
        "year" | "annual" => BillingPeriod::Annual,
        "lifetime" => BillingPeriod::Lifetime,
        other => {
            debug!(plan = %raw.id, interval = other, "skipping plan with unsupported interval");
            return None;
        }
    };

    let handle = WebPlanHandle {
        plan_id: raw.id.clone(),
    };
    let platform_data = serde_json::to_value(&handle).ok()?;

    Some(PricingPackage {
        identifier: raw.id.clone(),
        title: raw.name.clone(),
        description: raw.description.clone(),
        price: raw.amount,
        price_string: format!("{} {:.2}", raw.currency.to_uppercase(), raw.amount),
        currency_code: raw.currency.to_uppercase(),
        billing_period,
        platform: Platform::WebBilling,
        platform_data,
    })
}

fn map_web_error(operation: &'static str, err: WebBillingError) -> BillingError {
    match err {
        WebBillingError::NoPlansConfigured => BillingError::CatalogEmpty,
        WebBillingError::CheckoutCancelled => BillingError::payment(err.to_string()),
        WebBillingError::Http { status, reason } => BillingError::Network {
            operation,
            reason: format!("HTTP {status}: {reason}"),
        },
        WebBillingError::Unavailable(reason) => BillingError::Network { operation, reason },
    }
}

#[async_trait]
impl SubscriptionService for WebAdapter {
    fn platform(&self) -> Platform {
        Platform::WebBilling
    }

    async fn configure(&self, _config: &BillingConfig) -> Result<()> {
        if self.configured.swap(true, Ordering::SeqCst) {
            debug!("web billing client already configured, skipping");
        }
        Ok(())
    }

    async fn log_in(&self, user_id: &str) -> Result<SubscriptionInfo> {
        {
            let mut bound = self.user_id.lock().unwrap_or_else(|e| e.into_inner());
            *bound = Some(user_id.to_string());
        }
        self.subscription_info().await
    }

    async fn log_out(&self) -> Result<SubscriptionInfo> {
        let mut bound = self.user_id.lock().unwrap_or_else(|e| e.into_inner());
        if bound.take().is_none() {
            debug!("log_out on anonymous web identity, nothing to detach");
        }
        Ok(SubscriptionInfo::none(Platform::WebBilling))
    }

    async fn subscription_info(&self) -> Result<SubscriptionInfo> {
        let user_id = self.user_id();
        let raw = self
            .client
            .current_subscription(user_id.as_deref())
            .await
            .map_err(|e| map_web_error("getSubscriptionInfo", e))?;
        Ok(translate_web_subscription(&raw))
    }

    async fn packages(&self) -> Result<Vec<PricingPackage>> {
        let plans = self
            .client
            .plans()
            .await
            .map_err(|e| map_web_error("getPackages", e))?;
        Ok(plans.iter().filter_map(translate_plan).collect())
    }

    async fn purchase(&self, package: &PricingPackage) -> Result<PurchaseOutcome> {
        let handle: WebPlanHandle = serde_json::from_value(package.platform_data.clone())?;
        let user_id = self.user_id();
        match self.client.checkout(&handle.plan_id, user_id.as_deref()).await {
            Ok(raw) => Ok(PurchaseOutcome::Completed(translate_web_subscription(&raw))),
            Err(WebBillingError::CheckoutCancelled) => Ok(PurchaseOutcome::Cancelled),
            Err(err) => Err(map_web_error("purchasePackage", err)),
        }
    }

    async fn restore(&self) -> Result<SubscriptionInfo> {
        // The backend is the source of truth; a fresh fetch is a restore.
        self.subscription_info().await
    }

    fn add_update_listener(&self, callback: UpdateCallback) -> Option<ListenerToken> {
        Some(self.listeners.add(callback))
    }

    fn remove_update_listener(&self, token: ListenerToken) {
        self.listeners.remove(token);
    }

    fn management_url(&self) -> Option<String> {
        let user_id = self.user_id();
        self.client.portal_url(user_id.as_deref())
    }
}
