//! The stateful subscription store.
//!
//! Holds the current canonical snapshot, dispatches to the active platform
//! adapter, runs the lifecycle detector on every commit, persists the safe
//! state subset and re-initializes when the application identity changes.

use crate::identity::IdentityProvider;
use crate::lifecycle::detect;
use crate::persist::{KeyValueStore, PersistedState};
use prokit_lib::{
    BillingConfig, BillingError, LifecycleEvent, Platform, PricingPackage, PurchaseOutcome,
    SubscriptionInfo, SubscriptionService,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info, warn};

/// Callback invoked with every classified lifecycle transition.
pub type LifecycleCallback = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Unsubscribe token for a lifecycle listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LifecycleToken(u64);

/// Store lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorePhase {
    Uninitialized,
    Initializing,
    Ready,
}

/// Result of a purchase request as the UI sees it: a cancelled purchase is
/// a clean no-op, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseStatus {
    Completed,
    Cancelled,
}

#[derive(Debug)]
struct StoreState {
    phase: StorePhase,
    is_pro: bool,
    customer_info: Option<SubscriptionInfo>,
    web_subscription_info: Option<SubscriptionInfo>,
    packages: Vec<PricingPackage>,
    loading: bool,
    hydrated: bool,
    catalog_empty_logged: bool,
    push_listener_installed: bool,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            phase: StorePhase::Uninitialized,
            is_pro: false,
            customer_info: None,
            web_subscription_info: None,
            packages: Vec::new(),
            loading: false,
            hydrated: false,
            catalog_empty_logged: false,
            push_listener_installed: false,
        }
    }
}

struct StoreInner {
    service: Arc<dyn SubscriptionService>,
    identity: Arc<dyn IdentityProvider>,
    kv: Arc<dyn KeyValueStore>,
    config: BillingConfig,
    state: Mutex<StoreState>,
    lifecycle_listeners: Mutex<Vec<(u64, LifecycleCallback)>>,
    next_listener_id: AtomicU64,
}

/// Explicitly constructed, dependency-injected subscription store.
///
/// Clones share state. Only one purchase/restore should be in flight at a
/// time per store; callers gate repeat invocation on [`loading`] — the
/// store documents but does not enforce this mutual exclusion.
///
/// Concurrent commits (an in-flight purchase racing a push update) are
/// last-write-wins by design; the detector suppresses notifications for
/// redundant overwrites.
///
/// [`loading`]: SubscriptionStore::loading
#[derive(Clone)]
pub struct SubscriptionStore {
    inner: Arc<StoreInner>,
}

impl SubscriptionStore {
    pub fn new(
        service: Arc<dyn SubscriptionService>,
        identity: Arc<dyn IdentityProvider>,
        kv: Arc<dyn KeyValueStore>,
        config: BillingConfig,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                service,
                identity,
                kv,
                config,
                state: Mutex::new(StoreState::default()),
                lifecycle_listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(0),
            }),
        }
    }

    /// The platform of the active adapter.
    pub fn platform(&self) -> Platform {
        self.inner.service.platform()
    }

    /// The single entitlement flag the UI gates on.
    pub fn is_pro(&self) -> bool {
        self.lock_state(|state| state.is_pro)
    }

    pub fn phase(&self) -> StorePhase {
        self.lock_state(|state| state.phase)
    }

    /// True while a purchase or restore is in flight. Callers use this to
    /// gate repeat invocations.
    pub fn loading(&self) -> bool {
        self.lock_state(|state| state.loading)
    }

    /// Last-fetched purchasable offers.
    pub fn packages(&self) -> Vec<PricingPackage> {
        self.lock_state(|state| state.packages.clone())
    }

    /// Last canonical snapshot from the mobile (or mock) adapter.
    pub fn customer_info(&self) -> Option<SubscriptionInfo> {
        self.lock_state(|state| state.customer_info.clone())
    }

    /// Last canonical snapshot from the web adapter.
    pub fn web_subscription_info(&self) -> Option<SubscriptionInfo> {
        self.lock_state(|state| state.web_subscription_info.clone())
    }

    /// Deep link to the billing management page, where the platform has one.
    pub fn management_url(&self) -> Option<String> {
        self.inner.service.management_url()
    }

    fn lock_state<T>(&self, f: impl FnOnce(&mut StoreState) -> T) -> T {
        let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    // -----------------------------------------------------------------------
    // Initialization
    // -----------------------------------------------------------------------

    /// Bind the store to the current identity and bring it to `Ready`.
    ///
    /// Never fails: an adapter fetch failure degrades to the last known
    /// (or inactive) state so the app starts gated but alive. Re-run on
    /// every identity change; [`watch_identity`] automates that.
    ///
    /// [`watch_identity`]: SubscriptionStore::watch_identity
    pub async fn initialize(&self) {
        self.lock_state(|state| state.phase = StorePhase::Initializing);

        self.hydrate_once().await;

        if let Err(err) = self.inner.service.configure(&self.inner.config).await {
            warn!("billing configure failed: {err}");
        }

        // Anonymous sessions fetch read-only; never log_out here — logging
        // out an anonymous identity is the one call that can fail.
        let fetched = match self.inner.identity.current_user_id() {
            Some(user_id) => {
                debug!(user_id = %user_id, "binding billing identity");
                self.inner.service.log_in(&user_id).await
            }
            None => self.inner.service.subscription_info().await,
        };

        match fetched {
            Ok(snapshot) => self.commit_current(snapshot),
            Err(err) => {
                warn!("entitlement fetch failed, keeping last known state: {err}");
                let platform = self.platform();
                self.lock_state(|state| {
                    if current_slot(state, platform).is_none() {
                        // Nothing hydrated either: settle on inactive.
                        set_current_slot(state, platform, SubscriptionInfo::none(platform));
                        state.is_pro = false;
                    }
                });
            }
        }

        self.refresh_packages().await;
        self.install_push_listener();

        self.lock_state(|state| state.phase = StorePhase::Ready);
        debug!(platform = %self.platform(), is_pro = self.is_pro(), "subscription store ready");
    }

    /// Rehydrate the persisted subset, first initialization only.
    async fn hydrate_once(&self) {
        let already = self.lock_state(|state| std::mem::replace(&mut state.hydrated, true));
        if already {
            return;
        }
        match PersistedState::load(&*self.inner.kv).await {
            Ok(Some(persisted)) => {
                if persisted.platform != self.platform() {
                    debug!(
                        persisted = %persisted.platform,
                        active = %self.platform(),
                        "ignoring persisted state from another platform"
                    );
                    return;
                }
                self.lock_state(|state| {
                    state.is_pro = persisted.is_pro;
                    state.customer_info = persisted.customer_info;
                    state.web_subscription_info = persisted.web_subscription_info;
                });
                debug!(is_pro = self.is_pro(), "hydrated persisted entitlement state");
            }
            Ok(None) => {}
            Err(err) => warn!("failed to load persisted entitlement state: {err:#}"),
        }
    }

    /// Fetch the purchasable catalog. An empty upstream catalog is expected
    /// during setup and is logged once at info level, never as an error.
    pub async fn refresh_packages(&self) {
        match self.inner.service.packages().await {
            Ok(packages) => self.lock_state(|state| state.packages = packages),
            Err(BillingError::CatalogEmpty) => {
                let first = self.lock_state(|state| {
                    state.packages.clear();
                    !std::mem::replace(&mut state.catalog_empty_logged, true)
                });
                if first {
                    info!("no products configured upstream; billing catalog is empty");
                }
            }
            Err(err) => {
                warn!("failed to fetch packages, keeping previous catalog: {err}");
            }
        }
    }

    /// Register the adapter's push channel, once. Push commits converge on
    /// the same setter path as everything else.
    fn install_push_listener(&self) {
        let already = self.lock_state(|state| {
            std::mem::replace(&mut state.push_listener_installed, true)
        });
        if already {
            return;
        }

        let weak: Weak<StoreInner> = Arc::downgrade(&self.inner);
        let token = self.inner.service.add_update_listener(Arc::new(move |snapshot| {
            if let Some(inner) = weak.upgrade() {
                SubscriptionStore { inner }.commit_current(snapshot);
            }
        }));

        if token.is_none() {
            debug!("adapter has no push channel");
            self.lock_state(|state| state.push_listener_installed = false);
        }
    }

    // -----------------------------------------------------------------------
    // State commits
    // -----------------------------------------------------------------------

    /// Commit a mobile/mock canonical snapshot.
    pub fn set_customer_info(&self, snapshot: SubscriptionInfo) {
        self.commit(Slot::Customer, snapshot);
    }

    /// Commit a web canonical snapshot.
    pub fn set_web_subscription_info(&self, snapshot: SubscriptionInfo) {
        self.commit(Slot::Web, snapshot);
    }

    /// Commit into the slot matching the active platform.
    fn commit_current(&self, snapshot: SubscriptionInfo) {
        match self.platform() {
            Platform::WebBilling => self.commit(Slot::Web, snapshot),
            Platform::MobileBilling | Platform::Mock => self.commit(Slot::Customer, snapshot),
        }
    }

    /// The single mutation point: detect the transition, commit, recompute
    /// `is_pro`, notify lifecycle listeners and schedule a persistence
    /// write.
    fn commit(&self, slot: Slot, snapshot: SubscriptionInfo) {
        let event = self.lock_state(|state| {
            let previous = match slot {
                Slot::Customer => &state.customer_info,
                Slot::Web => &state.web_subscription_info,
            };
            let event = detect(previous.as_ref(), &snapshot);
            match slot {
                Slot::Customer => state.customer_info = Some(snapshot),
                Slot::Web => state.web_subscription_info = Some(snapshot),
            }
            recompute_is_pro(state, self.platform());
            event
        });

        if let Some(event) = event {
            debug!(kind = ?event.kind, "subscription lifecycle event");
            self.notify_lifecycle(&event);
        }

        self.persist_in_background();
    }

    /// Recompute `is_pro` purely from the stored platform snapshot. Never
    /// fetches; synchronous state transitions rely on that.
    pub fn check_pro_status(&self) -> bool {
        let platform = self.platform();
        self.lock_state(|state| {
            recompute_is_pro(state, platform);
            state.is_pro
        })
    }

    /// Persistence is fire-and-forget relative to commits: a crash between
    /// commit and flush loses at most the latest change, which the next
    /// `initialize` fetch recovers.
    fn persist_in_background(&self) {
        let persisted = self.lock_state(|state| PersistedState {
            is_pro: state.is_pro,
            platform: self.inner.service.platform(),
            customer_info: state.customer_info.clone(),
            web_subscription_info: state.web_subscription_info.clone(),
        });
        let kv = self.inner.kv.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = persisted.save(&*kv).await {
                        warn!("failed to persist entitlement state: {err:#}");
                    }
                });
            }
            Err(_) => debug!("no async runtime available, skipping persistence write"),
        }
    }

    // -----------------------------------------------------------------------
    // Purchase / restore
    // -----------------------------------------------------------------------

    /// Purchase a package through the active adapter and commit the
    /// resulting snapshot. A user-cancelled purchase resolves to
    /// `Ok(PurchaseStatus::Cancelled)` with no state change.
    pub async fn purchase_package(
        &self,
        package: &PricingPackage,
    ) -> Result<PurchaseStatus, BillingError> {
        self.lock_state(|state| state.loading = true);
        let result = self.inner.service.purchase(package).await;
        let status = match result {
            Ok(PurchaseOutcome::Completed(snapshot)) => {
                self.commit_current(snapshot);
                Ok(PurchaseStatus::Completed)
            }
            Ok(PurchaseOutcome::Cancelled) => {
                debug!(package = %package.identifier, "purchase cancelled by user");
                Ok(PurchaseStatus::Cancelled)
            }
            Err(err) => {
                warn!(package = %package.identifier, "purchase failed: {err}");
                Err(err)
            }
        };
        self.lock_state(|state| state.loading = false);
        status
    }

    /// Re-synchronize entitlement from the backend. Finding no prior
    /// purchases is success with an inactive snapshot committed.
    pub async fn restore_purchases(&self) -> Result<(), BillingError> {
        self.lock_state(|state| state.loading = true);
        let result = self.inner.service.restore().await;
        let outcome = match result {
            Ok(snapshot) => {
                self.commit_current(snapshot);
                Ok(())
            }
            Err(err) => {
                warn!("restore failed: {err}");
                Err(err)
            }
        };
        self.lock_state(|state| state.loading = false);
        outcome
    }

    // -----------------------------------------------------------------------
    // Lifecycle listeners
    // -----------------------------------------------------------------------

    /// Register a lifecycle observer. Listener identity is the returned
    /// token, not the closure.
    pub fn add_lifecycle_listener(&self, callback: LifecycleCallback) -> LifecycleToken {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let mut listeners = self
            .inner
            .lifecycle_listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        listeners.push((id, callback));
        LifecycleToken(id)
    }

    pub fn remove_lifecycle_listener(&self, token: LifecycleToken) {
        let mut listeners = self
            .inner
            .lifecycle_listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        listeners.retain(|(id, _)| *id != token.0);
    }

    /// Fan out an event. A panicking listener is isolated; the remaining
    /// listeners still run and the store stays usable.
    fn notify_lifecycle(&self, event: &LifecycleEvent) {
        let snapshot: Vec<(u64, LifecycleCallback)> = {
            let listeners = self
                .inner
                .lifecycle_listeners
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            listeners.clone()
        };
        for (id, callback) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                tracing::error!(listener = id, "lifecycle listener panicked");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Identity reactivity
    // -----------------------------------------------------------------------

    /// Spawn a task that re-runs `initialize` on every identity change
    /// (sign-in, sign-out, account switch). Push-based, no polling.
    pub fn watch_identity(&self) -> tokio::task::JoinHandle<()> {
        let mut rx = self.inner.identity.subscribe();
        let store = self.clone();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                debug!("application identity changed, reinitializing subscription store");
                store.initialize().await;
            }
        })
    }
}

#[derive(Clone, Copy)]
enum Slot {
    Customer,
    Web,
}

fn current_slot(state: &StoreState, platform: Platform) -> Option<&SubscriptionInfo> {
    match platform {
        Platform::WebBilling => state.web_subscription_info.as_ref(),
        Platform::MobileBilling | Platform::Mock => state.customer_info.as_ref(),
    }
}

fn set_current_slot(state: &mut StoreState, platform: Platform, snapshot: SubscriptionInfo) {
    match platform {
        Platform::WebBilling => state.web_subscription_info = Some(snapshot),
        Platform::MobileBilling | Platform::Mock => state.customer_info = Some(snapshot),
    }
}

fn recompute_is_pro(state: &mut StoreState, platform: Platform) {
    state.is_pro = current_slot(state, platform).is_some_and(|info| info.is_active);
}
