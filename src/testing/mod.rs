//! Testing utilities for campus-ledger
//!
//! Alba-style HTTP endpoint testing without running a server, plus a helper
//! that assembles the full route set over a given [`AppContext`].
//!
//! # Example
//!
//! ```rust,ignore
//! use campus_ledger::{AppContext, testing};
//!
//! #[tokio::test]
//! async fn health_is_served() {
//!     let app = testing::router(AppContext::new());
//!
//!     testing::get(app, "/health")
//!         .execute()
//!         .await
//!         .assert_ok()
//!         .assert_json();
//! }
//! ```

mod scenario;

pub use scenario::{Scenario, ScenarioAssert, delete, get, post, put};

use crate::{App, AppContext};
use axum::Router;

/// Every campus-ledger route with `context` applied as state.
pub fn router(context: AppContext) -> Router {
    App::new()
        .with_default_routes()
        .with_context(context)
        .into_test_router()
}
