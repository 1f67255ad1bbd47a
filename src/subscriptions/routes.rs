//! Subscription HTTP routes.

use super::error::{Result, SubscriptionError};
use super::types::{NewSubscription, Subscription, SubscriptionOverview};
use crate::app::AppContext;
use crate::http::{ApiResponse, RouteModule};
use crate::validation::ValidatedJson;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};

/// Subscription ledger endpoints.
pub struct SubscriptionRoutes;

impl RouteModule for SubscriptionRoutes {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/subscriptions", post(create_subscription))
            .route("/subscriptions/{id}", get(get_subscription))
            .route("/subscriptions/history/{institute_id}", get(history))
            .route("/subscriptions/current/{institute_id}", get(current))
    }
}

async fn create_subscription(
    State(ctx): State<AppContext>,
    ValidatedJson(body): ValidatedJson<NewSubscription>,
) -> Result<(StatusCode, Json<ApiResponse<Subscription>>)> {
    let created = ctx.ledger().create(body).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(
            created.subscription,
            created.outcome.message(),
        )),
    ))
}

async fn get_subscription(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Subscription>>> {
    let subscription = ctx.ledger().get(&id).await?;
    Ok(Json(ApiResponse::success(subscription)))
}

async fn history(
    State(ctx): State<AppContext>,
    Path(institute_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<Subscription>>>> {
    let history = ctx.ledger().history_for(&institute_id).await?;
    if history.is_empty() {
        return Err(SubscriptionError::NoHistory { institute_id });
    }
    Ok(Json(ApiResponse::success(history)))
}

async fn current(
    State(ctx): State<AppContext>,
    Path(institute_id): Path<String>,
) -> Result<Json<ApiResponse<SubscriptionOverview>>> {
    let overview = ctx.ledger().current_and_upcoming(&institute_id).await?;
    Ok(Json(ApiResponse::success(overview)))
}
