//! Adapter selection.
//!
//! The active platform is fixed per runtime environment and resolved once
//! at startup; business logic never branches on platform again.

use crate::adapters::{MobileAdapter, WebAdapter};
use crate::errors::BillingError;
use crate::mock::MockBillingEngine;
use crate::model::Platform;
use crate::sdk::{MobileBillingSdk, WebBillingClient};
use crate::service::SubscriptionService;
use crate::Result;
use std::sync::Arc;

/// Platform collaborators available to the factory. Only the handle for
/// the selected platform needs to be present.
#[derive(Default)]
pub struct PlatformDeps {
    pub mobile_sdk: Option<Arc<dyn MobileBillingSdk>>,
    pub web_client: Option<Arc<dyn WebBillingClient>>,
}

impl PlatformDeps {
    pub fn mobile(sdk: Arc<dyn MobileBillingSdk>) -> Self {
        Self {
            mobile_sdk: Some(sdk),
            web_client: None,
        }
    }

    pub fn web(client: Arc<dyn WebBillingClient>) -> Self {
        Self {
            mobile_sdk: None,
            web_client: Some(client),
        }
    }
}

/// Construct the subscription service for the given platform.
pub fn service_for_platform(
    platform: Platform,
    deps: PlatformDeps,
) -> Result<Arc<dyn SubscriptionService>> {
    match platform {
        Platform::MobileBilling => {
            let sdk = deps.mobile_sdk.ok_or_else(|| {
                BillingError::Misconfigured("mobile platform selected without a billing SDK".into())
            })?;
            Ok(Arc::new(MobileAdapter::new(sdk)))
        }
        Platform::WebBilling => {
            let client = deps.web_client.ok_or_else(|| {
                BillingError::Misconfigured("web platform selected without a billing client".into())
            })?;
            Ok(Arc::new(WebAdapter::new(client)))
        }
        Platform::Mock => Ok(Arc::new(MockBillingEngine::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_needs_no_deps() {
        let service = service_for_platform(Platform::Mock, PlatformDeps::default()).unwrap();
        assert_eq!(service.platform(), Platform::Mock);
    }

    #[test]
    fn test_missing_dependency_is_misconfiguration() {
        let result = service_for_platform(Platform::MobileBilling, PlatformDeps::default());
        assert!(matches!(result, Err(BillingError::Misconfigured(_))));

        let result = service_for_platform(Platform::WebBilling, PlatformDeps::default());
        assert!(matches!(result, Err(BillingError::Misconfigured(_))));
    }
}
