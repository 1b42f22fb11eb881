//! Pure lifecycle detection over canonical snapshots.
//!
//! `detect` compares the previous and current snapshot and classifies the
//! transition. It performs no I/O, reads no clock and has no side effects,
//! so it is deterministic and independently unit-testable.

use prokit_lib::{BillingPeriod, LifecycleEvent, LifecycleKind, SubscriptionInfo};

/// Classify the transition between two entitlement snapshots.
///
/// Rules are evaluated in order; the first match wins:
///
/// 1. no previous, current active          -> `Activated`
/// 2. active -> inactive                   -> `Expired` / `Cancelled`
/// 3. active -> active, product changed    -> `Upgraded` / `Downgraded`
/// 4. trial -> active non-trial            -> `TrialConverted`
/// 5. inactive -> trial                    -> `TrialStarted`
/// 6. active -> active, expiration moved   -> `Renewed`
/// 7. otherwise                            -> `None`
///
/// Rule 7 matters as much as the others: identical or insignificant diffs
/// must not fire a notification, otherwise redundant fetches turn into
/// duplicate-event storms.
pub fn detect(
    previous: Option<&SubscriptionInfo>,
    current: &SubscriptionInfo,
) -> Option<LifecycleEvent> {
    let kind = classify(previous, current)?;
    Some(LifecycleEvent {
        kind,
        previous: previous.cloned(),
        current: current.clone(),
    })
}

fn classify(previous: Option<&SubscriptionInfo>, current: &SubscriptionInfo) -> Option<LifecycleKind> {
    let previous = match previous {
        None => return current.is_active.then_some(LifecycleKind::Activated),
        Some(previous) => previous,
    };

    if previous.is_active && !current.is_active {
        return Some(if current.status == prokit_lib::SubscriptionStatus::Expired {
            LifecycleKind::Expired
        } else {
            LifecycleKind::Cancelled
        });
    }

    if previous.is_active && current.is_active && current.product_id != previous.product_id {
        return Some(classify_product_change(
            previous.product_id.as_deref(),
            current.product_id.as_deref(),
        ));
    }

    if previous.is_trial && current.is_active && !current.is_trial {
        return Some(LifecycleKind::TrialConverted);
    }

    if !previous.is_active && current.is_trial {
        return Some(LifecycleKind::TrialStarted);
    }

    if previous.is_active && current.is_active && current.expiration_date != previous.expiration_date
    {
        return Some(LifecycleKind::Renewed);
    }

    None
}

/// Upgrade when the new product's billing period ranks strictly higher than
/// the old one's; everything else, including unresolvable periods, is a
/// downgrade. Backends only report the product id, so the period is
/// inferred from naming conventions.
fn classify_product_change(previous: Option<&str>, current: Option<&str>) -> LifecycleKind {
    let rank = |id: Option<&str>| {
        id.and_then(BillingPeriod::from_product_id)
            .map(|period| period as u8 + 1)
            .unwrap_or(0)
    };
    if rank(current) > rank(previous) {
        LifecycleKind::Upgraded
    } else {
        LifecycleKind::Downgraded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use prokit_lib::{Platform, SubscriptionStatus};

    fn info(status: SubscriptionStatus, product_id: &str) -> SubscriptionInfo {
        SubscriptionInfo::new(
            Platform::Mock,
            status,
            Some(product_id.to_string()),
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()),
            true,
        )
    }

    #[test]
    fn test_activated_from_nothing() {
        let current = info(SubscriptionStatus::Active, "pro_monthly");
        let event = detect(None, &current).unwrap();
        assert_eq!(event.kind, LifecycleKind::Activated);
        assert!(event.previous.is_none());

        // An inactive first snapshot is not an activation.
        let inactive = SubscriptionInfo::none(Platform::Mock);
        assert!(detect(None, &inactive).is_none());
    }

    #[test]
    fn test_expired_vs_cancelled() {
        let previous = info(SubscriptionStatus::Active, "pro_monthly");

        let expired = info(SubscriptionStatus::Expired, "pro_monthly");
        assert_eq!(
            detect(Some(&previous), &expired).unwrap().kind,
            LifecycleKind::Expired
        );

        let cancelled = info(SubscriptionStatus::Cancelled, "pro_monthly");
        assert_eq!(
            detect(Some(&previous), &cancelled).unwrap().kind,
            LifecycleKind::Cancelled
        );

        // Dropping straight to "none" (e.g. refund) is a cancellation too.
        let gone = SubscriptionInfo::none(Platform::Mock);
        assert_eq!(
            detect(Some(&previous), &gone).unwrap().kind,
            LifecycleKind::Cancelled
        );
    }

    #[test]
    fn test_upgrade_and_downgrade() {
        let monthly = info(SubscriptionStatus::Active, "pro_monthly");
        let annual = info(SubscriptionStatus::Active, "pro_annual");
        let lifetime = info(SubscriptionStatus::Active, "pro_lifetime");

        assert_eq!(
            detect(Some(&monthly), &annual).unwrap().kind,
            LifecycleKind::Upgraded
        );
        assert_eq!(
            detect(Some(&annual), &monthly).unwrap().kind,
            LifecycleKind::Downgraded
        );
        assert_eq!(
            detect(Some(&annual), &lifetime).unwrap().kind,
            LifecycleKind::Upgraded
        );

        // Unresolvable period names classify as a downgrade, never a guess.
        let mystery = info(SubscriptionStatus::Active, "pro_unlimited");
        assert_eq!(
            detect(Some(&monthly), &mystery).unwrap().kind,
            LifecycleKind::Downgraded
        );
        assert_eq!(
            detect(Some(&mystery), &monthly).unwrap().kind,
            LifecycleKind::Upgraded
        );
    }

    #[test]
    fn test_trial_started_and_converted() {
        let nothing = SubscriptionInfo::none(Platform::Mock);
        let trial = info(SubscriptionStatus::Trial, "pro_monthly");
        let paid = info(SubscriptionStatus::Active, "pro_monthly");

        assert_eq!(
            detect(Some(&nothing), &trial).unwrap().kind,
            LifecycleKind::TrialStarted
        );
        assert_eq!(
            detect(Some(&trial), &paid).unwrap().kind,
            LifecycleKind::TrialConverted
        );
    }

    #[test]
    fn test_trial_conversion_with_product_change_is_classified_as_change() {
        // Rule 3 outranks rule 4: converting onto a different product
        // reports the product change.
        let trial = info(SubscriptionStatus::Trial, "pro_monthly");
        let paid_annual = info(SubscriptionStatus::Active, "pro_annual");
        assert_eq!(
            detect(Some(&trial), &paid_annual).unwrap().kind,
            LifecycleKind::Upgraded
        );
    }

    #[test]
    fn test_renewed_on_expiration_change() {
        let previous = info(SubscriptionStatus::Active, "pro_monthly");
        let mut renewed = previous.clone();
        renewed.expiration_date = previous.expiration_date.map(|d| d + Duration::days(30));
        assert_eq!(
            detect(Some(&previous), &renewed).unwrap().kind,
            LifecycleKind::Renewed
        );
    }

    #[test]
    fn test_identical_snapshots_are_silent() {
        let snapshot = info(SubscriptionStatus::Active, "pro_monthly");
        assert!(detect(Some(&snapshot), &snapshot.clone()).is_none());

        let inactive = SubscriptionInfo::none(Platform::Mock);
        assert!(detect(Some(&inactive), &inactive.clone()).is_none());
    }

    #[test]
    fn test_will_renew_flip_alone_is_insignificant() {
        // Turning auto-renew off does not end entitlement; no event fires
        // until the period actually lapses.
        let previous = info(SubscriptionStatus::Active, "pro_monthly");
        let mut current = previous.clone();
        current.will_renew = false;
        assert!(detect(Some(&previous), &current).is_none());
    }
}
