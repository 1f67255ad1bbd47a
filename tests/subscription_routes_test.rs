//! HTTP tests for the subscription ledger endpoints

use axum::Router;
use campus_ledger::testing::{self, get as test_get, post as test_post};
use campus_ledger::{AppContext, ManualClock};
use chrono::{TimeZone, Utc};
use serde_json::{Value, json};
use std::sync::Arc;

fn setup() -> (Router, AppContext, ManualClock) {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    let ctx = AppContext::builder()
        .with_clock(Arc::new(clock.clone()))
        .build();
    (testing::router(ctx.clone()), ctx, clock)
}

async fn create_institute(app: &Router, name: &str) -> String {
    let body: Value = test_post(app.clone(), "/institutes")
        .json_body(&json!({
            "name": name,
            "address": "12 Orchard Lane",
            "ownerAdminId": "admin-1"
        }))
        .execute()
        .await
        .assert_created()
        .json()
        .await;
    body["data"]["id"].as_str().unwrap().to_string()
}

async fn subscribe(app: &Router, institute_id: &str, plan: &str, duration: &str) -> Value {
    test_post(app.clone(), "/subscriptions")
        .json_body(&json!({
            "instituteId": institute_id,
            "adminId": "admin-1",
            "plan": plan,
            "planDuration": duration
        }))
        .execute()
        .await
        .assert_created()
        .json()
        .await
}

#[tokio::test]
async fn test_first_subscription_activates_and_renewal_queues() {
    let (app, _ctx, _clock) = setup();
    let id = create_institute(&app, "Riverside Academy").await;

    let first = subscribe(&app, &id, "basic", "1M").await;
    assert_eq!(first["message"], "New subscription activated successfully");
    assert_eq!(first["data"]["status"], "Active");
    assert_eq!(first["data"]["period_start"], "2025-01-01T00:00:00Z");
    assert_eq!(first["data"]["period_expiry"], "2025-02-01T00:00:00Z");

    let renewal = subscribe(&app, &id, "pro", "3M").await;
    assert!(
        renewal["message"]
            .as_str()
            .unwrap()
            .starts_with("Renewal plan saved successfully")
    );
    assert_eq!(renewal["data"]["status"], "Upcoming");
    assert_eq!(renewal["data"]["period_start"], "2025-02-01T00:00:00Z");
    assert_eq!(renewal["data"]["period_expiry"], "2025-05-01T00:00:00Z");

    // Projection only reflects the immediately activated plan
    test_get(app.clone(), &format!("/institutes/{id}"))
        .execute()
        .await
        .assert_ok()
        .assert_json_path("data.current_plan", json!("basic"))
        .await
        .assert_json_path("data.status", json!("Active"))
        .await;

    test_get(app, &format!("/subscriptions/current/{id}"))
        .execute()
        .await
        .assert_ok()
        .assert_json_path("data.current_subscription.plan", json!("basic"))
        .await
        .assert_json_path("data.has_upcoming_plan", json!(true))
        .await
        .assert_json_path("data.upcoming_plan_details.plan", json!("pro"))
        .await;
}

#[tokio::test]
async fn test_history_is_newest_first_and_404_when_empty() {
    let (app, _ctx, _clock) = setup();
    let id = create_institute(&app, "Hillcrest School").await;

    test_get(app.clone(), &format!("/subscriptions/history/{id}"))
        .execute()
        .await
        .assert_not_found()
        .assert_json_path("context.code", json!("no_subscription_history"))
        .await;

    subscribe(&app, &id, "basic", "1M").await;
    subscribe(&app, &id, "enterprise", "12M").await;

    test_get(app, &format!("/subscriptions/history/{id}"))
        .execute()
        .await
        .assert_ok()
        .assert_json_path("data.0.plan", json!("enterprise"))
        .await
        .assert_json_path("data.1.plan", json!("basic"))
        .await;
}

#[tokio::test]
async fn test_second_renewal_conflicts() {
    let (app, _ctx, _clock) = setup();
    let id = create_institute(&app, "Maple Grove").await;
    subscribe(&app, &id, "basic", "1M").await;
    subscribe(&app, &id, "pro", "1M").await;

    test_post(app, "/subscriptions")
        .json_body(&json!({
            "institute_id": id,
            "admin_id": "admin-1",
            "plan": "enterprise",
            "plan_duration": "6M"
        }))
        .execute()
        .await
        .assert_conflict();
}

#[tokio::test]
async fn test_creation_rejections() {
    let (app, _ctx, _clock) = setup();
    let id = create_institute(&app, "Cedar Point").await;

    let request = |plan: &str, duration: &str, institute: &str| {
        json!({
            "institute_id": institute,
            "admin_id": "admin-1",
            "plan": plan,
            "plan_duration": duration
        })
    };

    test_post(app.clone(), "/subscriptions")
        .json_body(&request("platinum", "1M", &id))
        .execute()
        .await
        .assert_unprocessable()
        .assert_json_path("context.code", json!("unknown_plan"))
        .await;

    for bad in ["0M", "3W", "M", "abc"] {
        test_post(app.clone(), "/subscriptions")
            .json_body(&request("basic", bad, &id))
            .execute()
            .await
            .assert_bad_request()
            .assert_json_path("context.code", json!("invalid_duration"))
            .await;
    }

    test_post(app.clone(), "/subscriptions")
        .json_body(&request("basic", "1M", "no-such-institute"))
        .execute()
        .await
        .assert_not_found()
        .assert_json_path("context.code", json!("institute_not_found"))
        .await;

    test_post(app.clone(), "/subscriptions")
        .json_body(&request("basic", "1M", "  "))
        .execute()
        .await
        .assert_bad_request();

    // Nothing was written
    test_get(app, &format!("/subscriptions/history/{id}"))
        .execute()
        .await
        .assert_not_found();
}

#[tokio::test]
async fn test_missing_fields_are_structured_bad_requests() {
    let (app, _ctx, _clock) = setup();

    test_post(app.clone(), "/subscriptions")
        .json_body(&json!({"plan": "basic", "planDuration": "1M"}))
        .execute()
        .await
        .assert_bad_request()
        .assert_json_path("context.code", json!("invalid_input"))
        .await;

    test_post(app.clone(), "/institutes")
        .json_body(&json!({"name": "No Address", "adminId": "owner"}))
        .execute()
        .await
        .assert_bad_request()
        .assert_json_path("context.code", json!("invalid_input"))
        .await;

    test_post(app, "/registrations")
        .json_body(&json!({"role": "student", "name": "Sam", "email": "sam@school.test"}))
        .execute()
        .await
        .assert_bad_request()
        .assert_json_path("context.code", json!("invalid_input"))
        .await;
}

#[tokio::test]
async fn test_get_subscription_by_id() {
    let (app, _ctx, _clock) = setup();
    let id = create_institute(&app, "Lakeside").await;
    let created = subscribe(&app, &id, "Basic", "6M").await;
    let subscription_id = created["data"]["id"].as_str().unwrap();

    // Plan names are stored canonically
    test_get(app.clone(), &format!("/subscriptions/{subscription_id}"))
        .execute()
        .await
        .assert_ok()
        .assert_json_path("data.plan", json!("basic"))
        .await;

    test_get(app, "/subscriptions/missing")
        .execute()
        .await
        .assert_not_found()
        .assert_json_path("context.code", json!("subscription_not_found"))
        .await;
}

#[tokio::test]
async fn test_scheduler_tick_is_visible_over_http() {
    let (app, ctx, clock) = setup();
    let id = create_institute(&app, "Oakwood").await;
    subscribe(&app, &id, "basic", "1M").await;
    subscribe(&app, &id, "pro", "3M").await;

    clock.set(Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 1).unwrap());
    let report = ctx.scheduler().run_tick().await;
    assert_eq!(report.expired, 1);
    assert_eq!(report.activated, 1);

    test_get(app.clone(), &format!("/subscriptions/current/{id}"))
        .execute()
        .await
        .assert_ok()
        .assert_json_path("data.current_subscription.plan", json!("pro"))
        .await
        .assert_json_path("data.has_upcoming_plan", json!(false))
        .await;

    test_get(app, &format!("/institutes/{id}"))
        .execute()
        .await
        .assert_json_path("data.current_plan", json!("pro"))
        .await
        .assert_json_path("data.current_plan_duration", json!("3M"))
        .await
        .assert_json_path("data.current_period_expiry", json!("2025-05-01T00:00:00Z"))
        .await;
}
