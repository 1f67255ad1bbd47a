//! Registration HTTP routes.

use super::registration::{PendingOverview, RegistrationRequest};
use super::types::{Member, PendingRegistration};
use crate::app::AppContext;
use crate::http::{ApiResponse, RouteModule};
use crate::subscriptions::error::{Result, SubscriptionError};
use crate::validation::ValidatedJson;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct RejectBody {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Registration and approval endpoints.
pub struct RegistrationRoutes;

impl RouteModule for RegistrationRoutes {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/registrations", post(submit))
            .route("/registrations/{id}/approve", put(approve))
            .route("/registrations/{id}/reject", put(reject))
            .route("/institutes/{id}/registrations", get(pending))
    }
}

async fn submit(
    State(ctx): State<AppContext>,
    ValidatedJson(body): ValidatedJson<RegistrationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PendingRegistration>>)> {
    let registration = ctx.registrations().submit(body).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(
            registration,
            "Registration submitted for approval",
        )),
    ))
}

async fn approve(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Member>>> {
    let member = ctx.registrations().approve(&id).await?;
    Ok(Json(ApiResponse::success_with_message(
        member,
        "Registration approved",
    )))
}

/// The body is optional; an empty body rejects without a reason.
async fn reject(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ApiResponse<PendingRegistration>>> {
    let body: RejectBody = if body.is_empty() {
        RejectBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| SubscriptionError::invalid_input(format!("invalid body: {e}")))?
    };

    let registration = ctx
        .registrations()
        .reject(&id, body.reason.as_deref())
        .await?;
    Ok(Json(ApiResponse::success_with_message(
        registration,
        "Registration rejected",
    )))
}

async fn pending(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<PendingOverview>>> {
    Ok(Json(ApiResponse::success(
        ctx.registrations().pending_for(&id).await?,
    )))
}
