//! Institute HTTP routes.

use super::service::DeletionSummary;
use super::types::{Institute, NewInstitute};
use crate::app::AppContext;
use crate::http::{ApiResponse, RouteModule};
use crate::subscriptions::error::Result;
use crate::subscriptions::quota::UsageSummary;
use crate::validation::ValidatedJson;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};

/// Institute registry endpoints.
pub struct InstituteRoutes;

impl RouteModule for InstituteRoutes {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/institutes", get(list_institutes).post(create_institute))
            .route(
                "/institutes/{id}",
                get(get_institute).delete(delete_institute),
            )
            .route("/institutes/{id}/usage", get(usage))
    }
}

async fn create_institute(
    State(ctx): State<AppContext>,
    ValidatedJson(body): ValidatedJson<NewInstitute>,
) -> Result<(StatusCode, Json<ApiResponse<Institute>>)> {
    let institute = ctx.institutes().create_from(body).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(
            institute,
            "Institute created successfully",
        )),
    ))
}

async fn list_institutes(State(ctx): State<AppContext>) -> Result<Json<ApiResponse<Vec<Institute>>>> {
    Ok(Json(ApiResponse::success(ctx.institutes().list().await?)))
}

async fn get_institute(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Institute>>> {
    Ok(Json(ApiResponse::success(ctx.institutes().get(&id).await?)))
}

async fn delete_institute(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<DeletionSummary>>> {
    let summary = ctx.institutes().delete(&id).await?;
    Ok(Json(ApiResponse::success_with_message(
        summary,
        "Institute and related data deleted",
    )))
}

async fn usage(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<UsageSummary>>> {
    ctx.institutes().get(&id).await?;
    Ok(Json(ApiResponse::success(ctx.quota().usage(&id).await?)))
}
