//! App assembly: module registration and the health endpoint

use axum::{Json, Router, extract::State, routing::get};
use campus_ledger::testing::get as test_get;
use campus_ledger::{App, AppContext, ManualClock, RouteModule};
use chrono::{TimeZone, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

struct PlanNames;

impl RouteModule for PlanNames {
    fn routes(&self) -> Router<AppContext> {
        Router::new().route("/plans", get(plan_names))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/v1")
    }
}

async fn plan_names(State(ctx): State<AppContext>) -> Json<Value> {
    Json(json!(ctx.catalog.plan_names()))
}

#[tokio::test]
async fn test_prefixed_module_is_nested() {
    let app = App::new().register_module(PlanNames).into_test_router();

    test_get(app.clone(), "/v1/plans")
        .execute()
        .await
        .assert_ok()
        .assert_json_path("0", json!("basic"))
        .await;

    test_get(app, "/plans").execute().await.assert_not_found();
}

#[tokio::test]
async fn test_builder_registers_modules() {
    let app = App::builder()
        .register_module(PlanNames)
        .build()
        .into_test_router();

    test_get(app, "/v1/plans").execute().await.assert_ok();
}

#[tokio::test]
async fn test_health_without_scheduler() {
    let app = App::new().into_test_router();

    test_get(app, "/health")
        .execute()
        .await
        .assert_ok()
        .assert_json_path("status", json!("healthy"))
        .await
        .assert_json_path("checks.0.name", json!("scheduler"))
        .await;
}

#[tokio::test]
async fn test_health_tracks_scheduler_ticks() {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
    let ctx = AppContext::builder()
        .with_clock(Arc::new(clock.clone()))
        .with_scheduler_interval(Duration::from_secs(60))
        .build();
    let app = App::new().with_context(ctx.clone()).into_test_router();

    test_get(app.clone(), "/health")
        .execute()
        .await
        .assert_ok()
        .assert_json_path("status", json!("degraded"))
        .await;

    ctx.scheduler().run_tick().await;
    test_get(app.clone(), "/health")
        .execute()
        .await
        .assert_json_path("status", json!("healthy"))
        .await;

    clock.advance(chrono::Duration::minutes(5));
    test_get(app, "/health")
        .execute()
        .await
        .assert_json_path("status", json!("degraded"))
        .await;
}
