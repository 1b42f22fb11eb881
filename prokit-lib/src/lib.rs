//! # Prokit Billing Contract
//!
//! Canonical subscription model and the uniform `SubscriptionService`
//! contract that every billing backend is translated into.
//!
//! The crate ships three conforming service implementations:
//! - [`adapters::MobileAdapter`] over an opaque native mobile billing SDK
//! - [`adapters::WebAdapter`] over a web billing backend
//! - [`mock::MockBillingEngine`], a self-contained in-memory simulation
//!
//! Adapters own the translation from their native payload shapes into the
//! canonical [`SubscriptionInfo`]; native field names never leak past the
//! adapter boundary. Entitlement state orchestration lives in the companion
//! `prokit-store` crate.

pub mod adapters;
pub mod errors;
pub mod factory;
pub mod mock;
pub mod model;
pub mod sdk;
pub mod service;

pub use adapters::{MobileAdapter, WebAdapter};
pub use errors::BillingError;
pub use factory::{service_for_platform, PlatformDeps};
pub use mock::MockBillingEngine;
pub use model::{
    BillingPeriod, LifecycleEvent, LifecycleKind, Platform, PricingPackage, SubscriptionInfo,
    SubscriptionStatus,
};
pub use sdk::{
    MobileBillingSdk, MobileSdkError, RawCustomerInfo, RawEntitlement, RawStorePackage,
    RawWebPlan, RawWebSubscription, WebBillingClient, WebBillingError,
};
pub use service::{
    BillingConfig, ListenerToken, PurchaseOutcome, SubscriptionService, UpdateCallback,
};

pub type Result<T> = std::result::Result<T, BillingError>;
