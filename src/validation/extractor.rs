use super::validate;
use crate::subscriptions::error::SubscriptionError;
use axum::{
    Json,
    extract::{FromRequest, Request},
};
use serde::Deserialize;
use validator::Validate;

/// JSON body extractor that runs the body's derived validation.
///
/// Malformed JSON, a wrong content type and missing fields are all rejected
/// as `InvalidInput` (400) with the usual error envelope, instead of axum's
/// plain-text rejection.
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: for<'de> Deserialize<'de> + Validate + Send,
    S: Send + Sync,
{
    type Rejection = SubscriptionError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| SubscriptionError::invalid_input(format!("Invalid JSON: {}", e.body_text())))?;

        validate(&value)?;
        Ok(ValidatedJson(value))
    }
}
