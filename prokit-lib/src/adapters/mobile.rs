//! Adapter over the native mobile billing SDK.

use crate::errors::BillingError;
use crate::model::{
    BillingPeriod, Platform, PricingPackage, SubscriptionInfo, SubscriptionStatus,
};
use crate::sdk::{MobileBillingSdk, MobileSdkError, RawCustomerInfo, RawStorePackage};
use crate::service::{
    BillingConfig, ListenerRegistry, ListenerToken, PurchaseOutcome, SubscriptionService,
    UpdateCallback,
};
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// `SubscriptionService` over an opaque [`MobileBillingSdk`].
///
/// Owns the translation from the SDK's customer payload into the canonical
/// model, keyed by the configured entitlement id. Raw field names stop here.
pub struct MobileAdapter {
    sdk: Arc<dyn MobileBillingSdk>,
    entitlement_id: Mutex<String>,
    configured: AtomicBool,
    listeners: Arc<ListenerRegistry>,
}

impl MobileAdapter {
    pub fn new(sdk: Arc<dyn MobileBillingSdk>) -> Self {
        Self {
            sdk,
            entitlement_id: Mutex::new(String::new()),
            configured: AtomicBool::new(false),
            listeners: Arc::new(ListenerRegistry::new()),
        }
    }

    fn entitlement_id(&self) -> String {
        self.entitlement_id
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn translate(&self, raw: &RawCustomerInfo) -> SubscriptionInfo {
        translate_customer_info(raw, &self.entitlement_id())
    }
}

/// Translate the SDK customer payload for the given entitlement id.
///
/// An entitlement reported inactive maps to `Expired` once its expiration
/// has passed (or was never set) and to `Cancelled` while time remains.
fn translate_customer_info(raw: &RawCustomerInfo, entitlement_id: &str) -> SubscriptionInfo {
    let entitlement = match raw.entitlements.get(entitlement_id) {
        Some(e) => e,
        None => return SubscriptionInfo::none(Platform::MobileBilling),
    };

    let status = if entitlement.is_active {
        if entitlement.period_type == "trial" {
            SubscriptionStatus::Trial
        } else {
            SubscriptionStatus::Active
        }
    } else if entitlement
        .expiration_date
        .is_none_or(|end| end <= Utc::now())
    {
        SubscriptionStatus::Expired
    } else {
        SubscriptionStatus::Cancelled
    };

    SubscriptionInfo::new(
        Platform::MobileBilling,
        status,
        Some(entitlement.product_identifier.clone()),
        entitlement.expiration_date,
        entitlement.will_renew,
    )
}

fn translate_package(raw: &RawStorePackage) -> Option<PricingPackage> {
    let billing_period = match raw.package_type.as_str() {
        "monthly" => BillingPeriod::Monthly,
        "annual" | "yearly" => BillingPeriod::Annual,
        "lifetime" => BillingPeriod::Lifetime,
        other => {
            debug!(package = %raw.identifier, package_type = other, "skipping unsupported package type");
            return None;
        }
    };

    let platform_data = match serde_json::to_value(raw) {
        Ok(value) => value,
        Err(err) => {
            warn!(package = %raw.identifier, "failed to encode package handle: {err}");
            return None;
        }
    };

    Some(PricingPackage {
        identifier: raw.identifier.clone(),
        title: raw.title.clone(),
        description: raw.description.clone(),
        price: raw.price,
        price_string: raw.price_string.clone(),
        currency_code: raw.currency_code.clone(),
        billing_period,
        platform: Platform::MobileBilling,
        platform_data,
    })
}

fn map_sdk_error(operation: &'static str, err: MobileSdkError) -> BillingError {
    match err {
        MobileSdkError::NoProductsRegistered => BillingError::CatalogEmpty,
        MobileSdkError::AnonymousLogOut => BillingError::IdentityConflict {
            reason: err.to_string(),
        },
        // Cancellation is handled before this mapping; reaching it from any
        // other operation means the SDK misreported.
        MobileSdkError::PurchaseCancelled => BillingError::payment(err.to_string()),
        MobileSdkError::Network(reason) => BillingError::Network { operation, reason },
        MobileSdkError::Misconfigured(reason) => BillingError::Misconfigured(reason),
    }
}

#[async_trait]
impl SubscriptionService for MobileAdapter {
    fn platform(&self) -> Platform {
        Platform::MobileBilling
    }

    async fn configure(&self, config: &BillingConfig) -> Result<()> {
        if self.configured.swap(true, Ordering::SeqCst) {
            debug!("mobile billing SDK already configured, skipping");
            return Ok(());
        }

        if let Err(err) = self.sdk.configure(&config.api_key).await {
            self.configured.store(false, Ordering::SeqCst);
            return Err(map_sdk_error("configure", err));
        }

        {
            let mut entitlement_id = self
                .entitlement_id
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            *entitlement_id = config.entitlement_id.clone();
        }

        // Bridge the single SDK-level listener into our token registry.
        let listeners = self.listeners.clone();
        let entitlement_id = config.entitlement_id.clone();
        self.sdk.set_update_listener(Arc::new(move |raw| {
            let info = translate_customer_info(&raw, &entitlement_id);
            listeners.notify(&info);
        }));

        debug!("mobile billing SDK configured");
        Ok(())
    }

    async fn log_in(&self, user_id: &str) -> Result<SubscriptionInfo> {
        let raw = self
            .sdk
            .log_in(user_id)
            .await
            .map_err(|e| map_sdk_error("logIn", e))?;
        Ok(self.translate(&raw))
    }

    async fn log_out(&self) -> Result<SubscriptionInfo> {
        match self.sdk.log_out().await {
            Ok(raw) => Ok(self.translate(&raw)),
            Err(MobileSdkError::AnonymousLogOut) => {
                // Already anonymous. Recover with a read-only fetch rather
                // than surfacing the conflict.
                debug!("log_out on anonymous identity, falling back to customer_info");
                let raw = self
                    .sdk
                    .customer_info()
                    .await
                    .map_err(|e| map_sdk_error("getCustomerInfo", e))?;
                Ok(self.translate(&raw))
            }
            Err(err) => Err(map_sdk_error("logOut", err)),
        }
    }

    async fn subscription_info(&self) -> Result<SubscriptionInfo> {
        let raw = self
            .sdk
            .customer_info()
            .await
            .map_err(|e| map_sdk_error("getCustomerInfo", e))?;
        Ok(self.translate(&raw))
    }

    async fn packages(&self) -> Result<Vec<PricingPackage>> {
        let offerings = self
            .sdk
            .offerings()
            .await
            .map_err(|e| map_sdk_error("getOfferings", e))?;
        Ok(offerings.iter().filter_map(translate_package).collect())
    }

    async fn purchase(&self, package: &PricingPackage) -> Result<PurchaseOutcome> {
        let raw_package: RawStorePackage = serde_json::from_value(package.platform_data.clone())?;
        match self.sdk.purchase(&raw_package).await {
            Ok(raw) => Ok(PurchaseOutcome::Completed(self.translate(&raw))),
            Err(MobileSdkError::PurchaseCancelled) => Ok(PurchaseOutcome::Cancelled),
            Err(err) => Err(map_sdk_error("purchasePackage", err)),
        }
    }

    async fn restore(&self) -> Result<SubscriptionInfo> {
        let raw = self
            .sdk
            .restore()
            .await
            .map_err(|e| map_sdk_error("restorePurchases", e))?;
        Ok(self.translate(&raw))
    }

    fn add_update_listener(&self, callback: UpdateCallback) -> Option<ListenerToken> {
        Some(self.listeners.add(callback))
    }

    fn remove_update_listener(&self, token: ListenerToken) {
        self.listeners.remove(token);
    }
}
