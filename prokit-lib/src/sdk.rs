//! Opaque platform billing SDK boundaries.
//!
//! The native mobile billing module and the web billing backend are
//! version-specific vendor services. They are modeled here as traits the
//! embedding application implements over the real SDK; everything past
//! these traits is treated as a black box. The raw payload shapes below
//! belong to this boundary only — adapters translate them into the
//! canonical model and never let them escape.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Mobile billing SDK
// ---------------------------------------------------------------------------

/// One entitlement as the mobile SDK reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntitlement {
    pub is_active: bool,
    pub will_renew: bool,
    /// "normal", "trial" or "intro" in vendor terms.
    pub period_type: String,
    pub expiration_date: Option<DateTime<Utc>>,
    pub product_identifier: String,
}

/// The mobile SDK's customer payload: entitlement id -> entitlement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCustomerInfo {
    pub entitlements: HashMap<String, RawEntitlement>,
}

/// One purchasable package as the mobile SDK reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStorePackage {
    pub identifier: String,
    pub product_identifier: String,
    pub title: String,
    pub description: String,
    pub price: f64,
    /// Localized display price, e.g. "$9.99".
    pub price_string: String,
    pub currency_code: String,
    /// "monthly", "annual", "lifetime" or a vendor-specific value.
    pub package_type: String,
}

/// Typed mobile SDK failures.
#[derive(Debug, Error)]
pub enum MobileSdkError {
    /// The backend has no products registered for this app yet.
    #[error("no products registered for this app")]
    NoProductsRegistered,
    /// Logging out an anonymous identity is illegal on this backend.
    #[error("cannot log out an anonymous user")]
    AnonymousLogOut,
    /// The user dismissed the payment sheet.
    #[error("purchase cancelled by user")]
    PurchaseCancelled,
    #[error("network error: {0}")]
    Network(String),
    #[error("SDK misconfigured: {0}")]
    Misconfigured(String),
}

/// Listener the SDK invokes with a fresh customer payload on out-of-band
/// entitlement changes.
pub type MobileUpdateListener = Arc<dyn Fn(RawCustomerInfo) + Send + Sync>;

/// The native mobile billing module, treated as a black box.
#[async_trait]
pub trait MobileBillingSdk: Send + Sync {
    async fn configure(&self, api_key: &str) -> Result<(), MobileSdkError>;
    async fn log_in(&self, user_id: &str) -> Result<RawCustomerInfo, MobileSdkError>;
    async fn log_out(&self) -> Result<RawCustomerInfo, MobileSdkError>;
    async fn customer_info(&self) -> Result<RawCustomerInfo, MobileSdkError>;
    async fn offerings(&self) -> Result<Vec<RawStorePackage>, MobileSdkError>;
    async fn purchase(&self, package: &RawStorePackage) -> Result<RawCustomerInfo, MobileSdkError>;
    async fn restore(&self) -> Result<RawCustomerInfo, MobileSdkError>;
    /// Install the SDK-level push listener. Vendor SDKs support exactly one.
    fn set_update_listener(&self, listener: MobileUpdateListener);
}

// ---------------------------------------------------------------------------
// Web billing backend
// ---------------------------------------------------------------------------

/// The web billing backend's subscription payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawWebSubscription {
    /// "active", "trialing", "canceled", "past_due", "expired" or "none".
    pub status: String,
    pub plan_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
}

/// One plan as the web billing backend reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawWebPlan {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Unit amount in major currency units, e.g. 9.99.
    pub amount: f64,
    pub currency: String,
    /// "month", "year" or "lifetime".
    pub interval: String,
}

/// Typed web billing failures.
#[derive(Debug, Error)]
pub enum WebBillingError {
    /// No plans configured on the billing backend yet.
    #[error("no plans configured")]
    NoPlansConfigured,
    /// The user abandoned the checkout flow.
    #[error("checkout cancelled by user")]
    CheckoutCancelled,
    #[error("HTTP {status}: {reason}")]
    Http { status: u16, reason: String },
    #[error("billing backend unavailable: {0}")]
    Unavailable(String),
}

/// The web billing backend, treated as a black box.
#[async_trait]
pub trait WebBillingClient: Send + Sync {
    async fn current_subscription(
        &self,
        user_id: Option<&str>,
    ) -> Result<RawWebSubscription, WebBillingError>;
    async fn plans(&self) -> Result<Vec<RawWebPlan>, WebBillingError>;
    async fn checkout(
        &self,
        plan_id: &str,
        user_id: Option<&str>,
    ) -> Result<RawWebSubscription, WebBillingError>;
    /// Deep link to the hosted billing management portal.
    fn portal_url(&self, user_id: Option<&str>) -> Option<String>;
}
