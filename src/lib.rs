//! campus-ledger - subscription lifecycle and plan enforcement for
//! multi-tenant school management
//!
//! Institutes subscribe to plans. The subscription ledger decides which plan
//! is active at any instant, a background scheduler moves entries through
//! `Upcoming → Active → Expired`, and the quota enforcer caps admins,
//! teachers and students per institute against the active plan.
//!
//! # Features
//!
//! - **HTTP**: Axum routes for subscriptions, institutes and registrations
//! - **Scheduler**: tokio interval task with graceful shutdown
//! - **Storage**: in-memory backend; SeaORM backend behind `database`
//! - **Health Checks**: scheduler freshness on `/health`
//! - **Testing**: Alba-style HTTP testing utilities
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use campus_ledger::{App, AppContext, ConfigBuilder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     campus_ledger::init_tracing();
//!
//!     let config = ConfigBuilder::new().from_env().build()?;
//!     let context = AppContext::builder()
//!         .with_catalog(config.load_plan_catalog()?)
//!         .build();
//!
//!     App::with_config(config)
//!         .with_context(context)
//!         .with_default_routes()
//!         .start_scheduler()
//!         .serve()
//!         .await?;
//!     Ok(())
//! }
//! ```

mod app;
pub mod clock;
mod config;
mod core;
#[cfg(feature = "database")]
pub mod database;
pub mod error;
pub mod health;
mod http;
pub mod institutes;
pub mod members;
pub mod memory;
mod middleware;
pub mod plans;
pub mod subscriptions;
pub mod testing;
mod utils;
pub mod validation;

// Re-exports for public API
pub use app::{AppContext, AppContextBuilder};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigBuilder, DevConfig, LoggingConfig, SchedulerConfig, ServerConfig};
pub use core::{App, AppBuilder};
#[cfg(feature = "database")]
pub use database::{DatabaseConfig, SeaOrmStore};
pub use error::{CampusError, ErrorContext, Result};
pub use health::{ComponentHealth, HealthCheck, HealthChecker, HealthStatus, SchedulerHealthCheck};
pub use http::{ApiResponse, RouteModule};
pub use memory::InMemoryStore;
pub use plans::{PlanCatalog, PlanLimits, UnknownPlan};
pub use subscriptions::{
    LifecycleScheduler, QuotaDecision, QuotaEnforcer, Subscription, SubscriptionError,
    SubscriptionLedger, SubscriptionStatus, TickReport,
};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "campus_ledger=debug")
/// - `CAMPUS_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = utils::parse_env_with_prefix::<bool>("LOG_JSON").unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Initialize tracing from a loaded [`Config`]
///
/// `RUST_LOG` still wins over `config.logging.level` when set.
pub fn init_tracing_with_config(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
