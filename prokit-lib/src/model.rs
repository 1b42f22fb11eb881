//! Canonical subscription model.
//!
//! Every billing backend is translated into these shapes at the adapter
//! boundary. The store, the lifecycle detector and the UI only ever see
//! this model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The billing backend a snapshot originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    MobileBilling,
    WebBilling,
    Mock,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::MobileBilling => write!(f, "mobile-billing"),
            Platform::WebBilling => write!(f, "web-billing"),
            Platform::Mock => write!(f, "mock"),
        }
    }
}

/// Normalized subscription state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Expired,
    Trial,
    None,
}

impl SubscriptionStatus {
    /// Whether this status grants paid access. A live trial entitles the
    /// user the same way an active subscription does.
    pub fn is_entitled(&self) -> bool {
        matches!(self, Self::Active | Self::Trial)
    }
}

/// Canonical, immutable subscription snapshot.
///
/// `is_active` is always derived from the status at construction time and is
/// never set independently; use [`SubscriptionInfo::new`] or
/// [`SubscriptionInfo::none`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    pub platform: Platform,
    pub status: SubscriptionStatus,
    pub product_id: Option<String>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub will_renew: bool,
    pub is_active: bool,
    pub is_trial: bool,
}

impl SubscriptionInfo {
    /// Build a snapshot, deriving `is_active` and `is_trial` from the status.
    pub fn new(
        platform: Platform,
        status: SubscriptionStatus,
        product_id: Option<String>,
        expiration_date: Option<DateTime<Utc>>,
        will_renew: bool,
    ) -> Self {
        Self {
            platform,
            status,
            product_id,
            expiration_date,
            will_renew,
            is_active: status.is_entitled(),
            is_trial: status == SubscriptionStatus::Trial,
        }
    }

    /// The inactive fallback snapshot for a platform.
    pub fn none(platform: Platform) -> Self {
        Self::new(platform, SubscriptionStatus::None, None, None, false)
    }
}

/// Billing period of a purchasable offer, ordered by "size" so that a
/// product change can be classified as an upgrade or a downgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingPeriod {
    Monthly,
    Annual,
    Lifetime,
}

impl BillingPeriod {
    /// Best-effort inference from a store product identifier. Backends do
    /// not report the period of the *previously* held product, so transition
    /// classification falls back to naming conventions.
    pub fn from_product_id(product_id: &str) -> Option<Self> {
        let id = product_id.to_ascii_lowercase();
        if id.contains("lifetime") {
            Some(Self::Lifetime)
        } else if id.contains("annual") || id.contains("year") {
            Some(Self::Annual)
        } else if id.contains("month") {
            Some(Self::Monthly)
        } else {
            None
        }
    }
}

impl std::fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BillingPeriod::Monthly => write!(f, "monthly"),
            BillingPeriod::Annual => write!(f, "annual"),
            BillingPeriod::Lifetime => write!(f, "lifetime"),
        }
    }
}

/// A purchasable offer, normalized across backends.
///
/// `platform_data` is an opaque handle the adapter needs to execute the
/// purchase. It is carried through the store untouched and never
/// interpreted outside the adapter that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingPackage {
    pub identifier: String,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub price_string: String,
    pub currency_code: String,
    pub billing_period: BillingPeriod,
    pub platform: Platform,
    pub platform_data: serde_json::Value,
}

/// Classified transition between two entitlement snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleKind {
    Activated,
    Renewed,
    Cancelled,
    Expired,
    Upgraded,
    Downgraded,
    TrialStarted,
    TrialConverted,
}

/// A lifecycle transition, produced as a side-channel notification only.
/// Never part of durable state.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleEvent {
    pub kind: LifecycleKind,
    pub previous: Option<SubscriptionInfo>,
    pub current: SubscriptionInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_active_derived_from_status() {
        let info = SubscriptionInfo::new(
            Platform::Mock,
            SubscriptionStatus::Active,
            Some("pro_monthly".into()),
            None,
            true,
        );
        assert!(info.is_active);
        assert!(!info.is_trial);

        let trial = SubscriptionInfo::new(
            Platform::Mock,
            SubscriptionStatus::Trial,
            Some("pro_monthly".into()),
            None,
            true,
        );
        assert!(trial.is_active);
        assert!(trial.is_trial);

        for status in [
            SubscriptionStatus::Cancelled,
            SubscriptionStatus::Expired,
            SubscriptionStatus::None,
        ] {
            let info = SubscriptionInfo::new(Platform::Mock, status, None, None, false);
            assert!(!info.is_active, "{status:?} must not entitle");
        }
    }

    #[test]
    fn test_billing_period_ordering() {
        assert!(BillingPeriod::Annual > BillingPeriod::Monthly);
        assert!(BillingPeriod::Lifetime > BillingPeriod::Annual);
    }

    #[test]
    fn test_billing_period_inference() {
        assert_eq!(
            BillingPeriod::from_product_id("pro_annual_v2"),
            Some(BillingPeriod::Annual)
        );
        assert_eq!(
            BillingPeriod::from_product_id("com.app.pro.yearly"),
            Some(BillingPeriod::Annual)
        );
        assert_eq!(
            BillingPeriod::from_product_id("pro_monthly"),
            Some(BillingPeriod::Monthly)
        );
        assert_eq!(
            BillingPeriod::from_product_id("pro_lifetime"),
            Some(BillingPeriod::Lifetime)
        );
        assert_eq!(BillingPeriod::from_product_id("pro_unlimited"), None);
    }

    #[test]
    fn test_snapshot_serde_roundtrip() {
        let info = SubscriptionInfo::new(
            Platform::WebBilling,
            SubscriptionStatus::Cancelled,
            Some("plan_basic".into()),
            Some(Utc::now()),
            false,
        );
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("web-billing"));
        assert!(json.contains("cancelled"));
        let back: SubscriptionInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }
}
