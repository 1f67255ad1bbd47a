use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::institutes::{InstituteService, InstituteStore};
use crate::memory::InMemoryStore;
use crate::members::{MembershipDirectory, RegistrationService, RegistrationStore};
use crate::plans::PlanCatalog;
use crate::subscriptions::{
    LifecycleScheduler, QuotaEnforcer, SchedulerHeartbeat, SubscriptionLedger, SubscriptionStore,
};

/// Application context for dependency injection and shared state
///
/// Holds the storage backends, the plan catalog and the clock. Services are
/// cheap to build from it: every field is an `Arc` and cloning the context
/// shares the same stores.
#[derive(Clone)]
pub struct AppContext {
    pub institute_store: Arc<dyn InstituteStore>,
    pub subscription_store: Arc<dyn SubscriptionStore>,
    pub directory: Arc<dyn MembershipDirectory>,
    pub registration_store: Arc<dyn RegistrationStore>,
    pub catalog: Arc<PlanCatalog>,
    pub clock: Arc<dyn Clock>,
    /// Last completed scheduler tick, shared with the health check.
    pub heartbeat: SchedulerHeartbeat,
    /// Tick interval of the in-process scheduler, `None` when it is disabled.
    pub scheduler_interval: Option<Duration>,
}

impl AppContext {
    /// Context backed by a fresh in-memory store, the default catalog and the system clock.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Builder pattern for constructing AppContext
    pub fn builder() -> AppContextBuilder {
        AppContextBuilder::new()
    }

    pub fn ledger(&self) -> SubscriptionLedger {
        SubscriptionLedger::new(
            self.subscription_store.clone(),
            self.institute_store.clone(),
            self.catalog.clone(),
            self.clock.clone(),
        )
    }

    pub fn quota(&self) -> QuotaEnforcer {
        QuotaEnforcer::new(
            self.subscription_store.clone(),
            self.directory.clone(),
            self.catalog.clone(),
        )
    }

    pub fn institutes(&self) -> InstituteService {
        InstituteService::new(
            self.institute_store.clone(),
            self.subscription_store.clone(),
            self.directory.clone(),
            self.registration_store.clone(),
            self.clock.clone(),
        )
    }

    pub fn registrations(&self) -> RegistrationService {
        RegistrationService::new(
            self.institute_store.clone(),
            self.directory.clone(),
            self.registration_store.clone(),
            self.quota(),
            self.clock.clone(),
        )
    }

    /// A scheduler sharing this context's stores, clock and heartbeat.
    pub fn scheduler(&self) -> LifecycleScheduler {
        LifecycleScheduler::new(
            self.subscription_store.clone(),
            self.institute_store.clone(),
            self.clock.clone(),
        )
        .with_heartbeat(self.heartbeat.clone())
    }
}

impl Default for AppContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for AppContext with fluent API
///
/// Any store left unset falls back to one shared [`InMemoryStore`].
#[must_use = "builder does nothing until you call build()"]
pub struct AppContextBuilder {
    institute_store: Option<Arc<dyn InstituteStore>>,
    subscription_store: Option<Arc<dyn SubscriptionStore>>,
    directory: Option<Arc<dyn MembershipDirectory>>,
    registration_store: Option<Arc<dyn RegistrationStore>>,
    catalog: Option<Arc<PlanCatalog>>,
    clock: Option<Arc<dyn Clock>>,
    scheduler_interval: Option<Duration>,
}

impl AppContextBuilder {
    pub fn new() -> Self {
        Self {
            institute_store: None,
            subscription_store: None,
            directory: None,
            registration_store: None,
            catalog: None,
            clock: None,
            scheduler_interval: None,
        }
    }

    /// Use one backend for every store.
    pub fn with_store<S>(self, store: S) -> Self
    where
        S: InstituteStore + SubscriptionStore + MembershipDirectory + RegistrationStore + 'static,
    {
        let store = Arc::new(store);
        self.with_institute_store(store.clone())
            .with_subscription_store(store.clone())
            .with_directory(store.clone())
            .with_registration_store(store)
    }

    pub fn with_institute_store(mut self, store: Arc<dyn InstituteStore>) -> Self {
        self.institute_store = Some(store);
        self
    }

    pub fn with_subscription_store(mut self, store: Arc<dyn SubscriptionStore>) -> Self {
        self.subscription_store = Some(store);
        self
    }

    /// Set the membership directory the quota enforcer counts against
    pub fn with_directory(mut self, directory: Arc<dyn MembershipDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_registration_store(mut self, store: Arc<dyn RegistrationStore>) -> Self {
        self.registration_store = Some(store);
        self
    }

    pub fn with_catalog(mut self, catalog: PlanCatalog) -> Self {
        self.catalog = Some(Arc::new(catalog));
        self
    }

    /// Set the time source
    ///
    /// # Example
    /// ```ignore
    /// let clock = ManualClock::new(Utc::now());
    /// let context = AppContext::builder()
    ///     .with_clock(Arc::new(clock.clone()))
    ///     .build();
    /// ```
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Record that a scheduler ticks every `interval`, for the health check
    pub fn with_scheduler_interval(mut self, interval: Duration) -> Self {
        self.scheduler_interval = Some(interval);
        self
    }

    pub fn build(self) -> AppContext {
        let fallback = InMemoryStore::new();

        AppContext {
            institute_store: self
                .institute_store
                .unwrap_or_else(|| Arc::new(fallback.clone())),
            subscription_store: self
                .subscription_store
                .unwrap_or_else(|| Arc::new(fallback.clone())),
            directory: self
                .directory
                .unwrap_or_else(|| Arc::new(fallback.clone())),
            registration_store: self
                .registration_store
                .unwrap_or_else(|| Arc::new(fallback)),
            catalog: self.catalog.unwrap_or_default(),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            heartbeat: SchedulerHeartbeat::new(),
            scheduler_interval: self.scheduler_interval,
        }
    }
}

impl Default for AppContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
