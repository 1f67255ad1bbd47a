//! Domain error types for the ledger, quota and registration flows.

use crate::error::{CampusError, ErrorContext};
use crate::members::{ParseRoleError, Role};
use crate::plans::UnknownPlan;
use crate::subscriptions::duration::ParseDurationError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors surfaced by subscription, quota and registration operations.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// Institute not found.
    #[error("Institute not found: {institute_id}")]
    InstituteNotFound {
        /// The ID that was not found.
        institute_id: String,
    },

    /// Subscription not found.
    #[error("Subscription not found: {subscription_id}")]
    SubscriptionNotFound {
        /// The ID that was not found.
        subscription_id: String,
    },

    /// The institute has never had a subscription.
    #[error("No subscription history found for institute {institute_id}")]
    NoHistory {
        /// The institute.
        institute_id: String,
    },

    /// Registration request not found.
    #[error("Registration not found: {registration_id}")]
    RegistrationNotFound {
        /// The ID that was not found.
        registration_id: String,
    },

    /// A required field is missing or malformed.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// What was wrong.
        message: String,
    },

    /// The duration code does not match `^(\d+)M$`.
    #[error("{0}")]
    InvalidDuration(#[from] ParseDurationError),

    /// The role name is not one of admin, teacher, student.
    #[error("{0}")]
    InvalidRole(#[from] ParseRoleError),

    /// The plan name matches no catalog entry.
    #[error("Invalid subscription plan: {plan}")]
    UnknownPlan {
        /// The unrecognized plan name.
        plan: String,
    },

    /// The institute has no active subscription.
    #[error("Institute {institute_id} doesn't have an active subscription")]
    NoActiveSubscription {
        /// The institute.
        institute_id: String,
    },

    /// The plan's headcount limit for a role is reached.
    #[error(
        "Institute has reached its maximum {role} limit ({current}/{max}) for the {plan} plan"
    )]
    LimitExceeded {
        /// Role that was refused.
        role: Role,
        /// Current headcount.
        current: u32,
        /// Plan limit.
        max: u32,
        /// Active plan name.
        plan: String,
    },

    /// The write would violate a uniqueness or single-active invariant.
    #[error("Conflict: {message}")]
    Conflict {
        /// What clashed.
        message: String,
    },

    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(#[source] CampusError),
}

impl SubscriptionError {
    /// Create an institute not found error.
    pub fn institute_not_found(institute_id: impl Into<String>) -> Self {
        Self::InstituteNotFound {
            institute_id: institute_id.into(),
        }
    }

    /// Create a registration not found error.
    pub fn registration_not_found(registration_id: impl Into<String>) -> Self {
        Self::RegistrationNotFound {
            registration_id: registration_id.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a no active subscription error.
    pub fn no_active_subscription(institute_id: impl Into<String>) -> Self {
        Self::NoActiveSubscription {
            institute_id: institute_id.into(),
        }
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InstituteNotFound { .. }
            | Self::SubscriptionNotFound { .. }
            | Self::NoHistory { .. }
            | Self::RegistrationNotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidInput { .. } | Self::InvalidDuration(_) | Self::InvalidRole(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::UnknownPlan { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NoActiveSubscription { .. } | Self::LimitExceeded { .. } => {
                StatusCode::FORBIDDEN
            }
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Storage(inner) => inner.status_code(),
        }
    }

    /// Stable machine-readable code for API clients.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InstituteNotFound { .. } => "institute_not_found",
            Self::SubscriptionNotFound { .. } => "subscription_not_found",
            Self::NoHistory { .. } => "no_subscription_history",
            Self::RegistrationNotFound { .. } => "registration_not_found",
            Self::InvalidInput { .. } => "invalid_input",
            Self::InvalidDuration(_) => "invalid_duration",
            Self::InvalidRole(_) => "invalid_role",
            Self::UnknownPlan { .. } => "unknown_plan",
            Self::NoActiveSubscription { .. } => "no_active_subscription",
            Self::LimitExceeded { .. } => "limit_exceeded",
            Self::Conflict { .. } => "conflict",
            Self::Storage(_) => "internal",
        }
    }
}

impl From<CampusError> for SubscriptionError {
    /// Store-level conflicts keep their meaning; everything else is a storage failure.
    fn from(err: CampusError) -> Self {
        match err {
            CampusError::Conflict(message) => Self::Conflict { message },
            other => Self::Storage(other),
        }
    }
}

impl From<UnknownPlan> for SubscriptionError {
    fn from(err: UnknownPlan) -> Self {
        Self::UnknownPlan { plan: err.plan }
    }
}

impl IntoResponse for SubscriptionError {
    fn into_response(self) -> Response {
        let mut context = ErrorContext::new().with_context("code", self.code());

        if let Self::LimitExceeded {
            role,
            current,
            max,
            plan,
        } = &self
        {
            context = context
                .with_context("role", role.as_str())
                .with_context("current", current.to_string())
                .with_context("max", max.to_string())
                .with_context("plan", plan.clone());
        }

        let message = self.to_string();
        let error = match self {
            Self::Storage(inner) => inner,
            other => match other.status_code() {
                StatusCode::NOT_FOUND => CampusError::NotFound(message),
                StatusCode::FORBIDDEN => CampusError::Forbidden(message),
                StatusCode::CONFLICT => CampusError::Conflict(message),
                StatusCode::UNPROCESSABLE_ENTITY => CampusError::UnprocessableEntity(message),
                _ => CampusError::BadRequest(message),
            },
        };

        error.into_response_with_context(Some(context), crate::error::dev_mode())
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, SubscriptionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_exceeded_message() {
        let err = SubscriptionError::LimitExceeded {
            role: Role::Teacher,
            current: 2,
            max: 2,
            plan: "basic".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Institute has reached its maximum teacher limit (2/2) for the basic plan"
        );
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.code(), "limit_exceeded");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            SubscriptionError::institute_not_found("x").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            SubscriptionError::from("9X".parse::<crate::subscriptions::PlanDuration>().unwrap_err())
                .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SubscriptionError::conflict("dup").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            SubscriptionError::UnknownPlan {
                plan: "gold".to_string()
            }
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            SubscriptionError::Storage(CampusError::internal("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_conflicts_stay_conflicts() {
        let err: SubscriptionError = CampusError::conflict("already active").into();
        assert!(matches!(err, SubscriptionError::Conflict { .. }));

        let err: SubscriptionError = CampusError::internal("disk full").into();
        assert!(matches!(err, SubscriptionError::Storage(_)));
    }

    #[test]
    fn test_limit_exceeded_response_status() {
        let response = SubscriptionError::LimitExceeded {
            role: Role::Student,
            current: 3,
            max: 3,
            plan: "basic".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_unknown_plan_response_status() {
        let response = SubscriptionError::UnknownPlan {
            plan: "gold".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
