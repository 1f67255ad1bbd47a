//! HTTP tests for registration approval and institute lifecycle

use axum::Router;
use campus_ledger::AppContext;
use campus_ledger::testing::{
    self, delete as test_delete, get as test_get, post as test_post, put as test_put,
};
use serde_json::{Value, json};

async fn institute_on_plan(app: &Router, name: &str, plan: &str) -> String {
    let body: Value = test_post(app.clone(), "/institutes")
        .json_body(&json!({"name": name, "address": "5 Elm Road", "adminId": "owner"}))
        .execute()
        .await
        .assert_created()
        .json()
        .await;
    let id = body["data"]["id"].as_str().unwrap().to_string();

    test_post(app.clone(), "/subscriptions")
        .json_body(&json!({
            "institute_id": id,
            "admin_id": "owner",
            "plan": plan,
            "plan_duration": "12M"
        }))
        .execute()
        .await
        .assert_created();
    id
}

async fn submit(app: &Router, institute_id: &str, role: &str, email: &str) -> testing::ScenarioAssert {
    test_post(app.clone(), "/registrations")
        .json_body(&json!({
            "institute_id": institute_id,
            "role": role,
            "name": "Sam Example",
            "email": email
        }))
        .execute()
        .await
}

async fn registration_id(response: testing::ScenarioAssert) -> String {
    let body: Value = response.assert_created().json().await;
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_basic_plan_refuses_third_teacher() {
    let app = testing::router(AppContext::new());
    let id = institute_on_plan(&app, "North Ridge", "basic").await;

    for email in ["t1@school.test", "t2@school.test"] {
        let registration = registration_id(submit(&app, &id, "teacher", email).await).await;
        test_put(app.clone(), &format!("/registrations/{registration}/approve"))
            .execute()
            .await
            .assert_ok()
            .assert_json_path("data.role", json!("teacher"))
            .await;
    }

    submit(&app, &id, "Teacher", "t3@school.test")
        .await
        .assert_forbidden()
        .assert_json_path("context.code", json!("limit_exceeded"))
        .await
        .assert_json_path("context.current", json!("2"))
        .await
        .assert_json_path("context.max", json!("2"))
        .await
        .assert_json_path("context.plan", json!("basic"))
        .await;

    test_get(app, &format!("/institutes/{id}/usage"))
        .execute()
        .await
        .assert_ok()
        .assert_json_path("data.teacher.current", json!(2))
        .await
        .assert_json_path("data.student.max", json!(3))
        .await;
}

#[tokio::test]
async fn test_approval_rechecks_quota() {
    let app = testing::router(AppContext::new());
    let id = institute_on_plan(&app, "South Bank", "basic").await;

    // Both fit at submission time: no admins yet, basic allows one
    let first = registration_id(submit(&app, &id, "admin", "a1@school.test").await).await;
    let second = registration_id(submit(&app, &id, "admin", "a2@school.test").await).await;

    test_put(app.clone(), &format!("/registrations/{first}/approve"))
        .execute()
        .await
        .assert_ok();

    test_put(app.clone(), &format!("/registrations/{second}/approve"))
        .execute()
        .await
        .assert_forbidden()
        .assert_json_path("context.code", json!("limit_exceeded"))
        .await;

    // Still pending after the refusal
    test_get(app.clone(), &format!("/institutes/{id}/registrations"))
        .execute()
        .await
        .assert_ok()
        .assert_json_path("data.registrations.0.id", json!(second))
        .await
        .assert_json_path("data.usage.admin.current", json!(1))
        .await;

    test_put(app, &format!("/registrations/{first}/approve"))
        .execute()
        .await
        .assert_not_found()
        .assert_json_path("context.code", json!("registration_not_found"))
        .await;
}

#[tokio::test]
async fn test_submission_rejections() {
    let app = testing::router(AppContext::new());

    let body: Value = test_post(app.clone(), "/institutes")
        .json_body(&json!({"name": "Unpaid Prep", "address": "9 Birch St", "owner_admin_id": "o"}))
        .execute()
        .await
        .assert_created()
        .json()
        .await;
    let unpaid = body["data"]["id"].as_str().unwrap().to_string();

    submit(&app, &unpaid, "student", "s@school.test")
        .await
        .assert_forbidden()
        .assert_json_path("context.code", json!("no_active_subscription"))
        .await;

    submit(&app, &unpaid, "janitor", "j@school.test")
        .await
        .assert_bad_request()
        .assert_json_path("context.code", json!("invalid_role"))
        .await;

    submit(&app, "missing", "student", "s@school.test")
        .await
        .assert_not_found();

    let paid = institute_on_plan(&app, "Paid Prep", "pro").await;
    submit(&app, &paid, "student", "not-an-email")
        .await
        .assert_bad_request();

    registration_id(submit(&app, &paid, "student", "dup@school.test").await).await;
    submit(&app, &paid, "student", "DUP@school.test")
        .await
        .assert_conflict();
}

#[tokio::test]
async fn test_reject_with_and_without_reason() {
    let app = testing::router(AppContext::new());
    let id = institute_on_plan(&app, "West End", "enterprise").await;

    let with_reason = registration_id(submit(&app, &id, "student", "r1@school.test").await).await;
    test_put(app.clone(), &format!("/registrations/{with_reason}/reject"))
        .json_body(&json!({"reason": "  Duplicate application  "}))
        .execute()
        .await
        .assert_ok()
        .assert_json_path("data.status", json!("rejected"))
        .await
        .assert_json_path("data.rejection_reason", json!("Duplicate application"))
        .await;

    let bare = registration_id(submit(&app, &id, "student", "r2@school.test").await).await;
    test_put(app.clone(), &format!("/registrations/{bare}/reject"))
        .execute()
        .await
        .assert_ok()
        .assert_json_path("data.status", json!("rejected"))
        .await;

    // A rejected request cannot be approved
    test_put(app.clone(), &format!("/registrations/{bare}/approve"))
        .execute()
        .await
        .assert_conflict();

    let body: Value = test_get(app, &format!("/institutes/{id}/registrations"))
        .execute()
        .await
        .assert_ok()
        .json()
        .await;
    assert!(body["data"]["registrations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_institute_delete_cascades() {
    let app = testing::router(AppContext::new());
    let id = institute_on_plan(&app, "East Gate", "pro").await;

    let teacher = registration_id(submit(&app, &id, "teacher", "t@school.test").await).await;
    test_put(app.clone(), &format!("/registrations/{teacher}/approve"))
        .execute()
        .await
        .assert_ok();
    registration_id(submit(&app, &id, "student", "s@school.test").await).await;

    test_delete(app.clone(), &format!("/institutes/{id}"))
        .execute()
        .await
        .assert_ok()
        .assert_json_path("data.subscriptions", json!(1))
        .await
        .assert_json_path("data.members", json!(1))
        .await
        .assert_json_path("data.registrations", json!(1))
        .await;

    test_get(app.clone(), &format!("/institutes/{id}"))
        .execute()
        .await
        .assert_not_found();
    test_get(app.clone(), &format!("/subscriptions/history/{id}"))
        .execute()
        .await
        .assert_not_found();

    // The freed email can register elsewhere
    let other = institute_on_plan(&app, "East Gate Annex", "pro").await;
    registration_id(submit(&app, &other, "teacher", "t@school.test").await).await;
}

#[tokio::test]
async fn test_duplicate_institute_name_conflicts() {
    let app = testing::router(AppContext::new());
    institute_on_plan(&app, "Twin Oaks", "basic").await;

    test_post(app.clone(), "/institutes")
        .json_body(&json!({"name": "twin oaks", "address": "x", "adminId": "o"}))
        .execute()
        .await
        .assert_conflict();

    let body: Value = test_get(app, "/institutes").execute().await.assert_ok().json().await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}
