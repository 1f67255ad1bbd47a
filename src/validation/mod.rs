//! Request validation.
//!
//! Request types derive [`validator::Validate`]. Route handlers take them
//! through [`ValidatedJson`], and the services validate again so library
//! callers get the same checks. Every failure is a
//! [`SubscriptionError::InvalidInput`].
//!
//! # Example
//!
//! ```rust,ignore
//! use campus_ledger::validation::{ValidatedJson, not_blank};
//! use validator::Validate;
//!
//! #[derive(Deserialize, Validate)]
//! struct RenameInstitute {
//!     #[validate(custom(function = "not_blank"))]
//!     name: String,
//! }
//!
//! async fn rename(ValidatedJson(body): ValidatedJson<RenameInstitute>) { .. }
//! ```

mod extractor;
mod validators;

pub use extractor::ValidatedJson;
pub use validators::not_blank;

use crate::subscriptions::error::{Result, SubscriptionError};
use validator::{Validate, ValidationErrors};

/// Run the derived checks of `value`.
pub fn validate<T: Validate>(value: &T) -> Result<()> {
    value
        .validate()
        .map_err(|errors| SubscriptionError::invalid_input(describe(&errors)))
}

/// `Validation failed: email: email, name: must not be blank`, fields sorted.
fn describe(errors: &ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| {
                let msg = error
                    .message
                    .as_ref()
                    .map(|m| m.as_ref())
                    .unwrap_or_else(|| error.code.as_ref());
                format!("{}: {}", field, msg)
            })
        })
        .collect();
    messages.sort();

    format!("Validation failed: {}", messages.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Validate)]
    struct Signup {
        #[validate(custom(function = "not_blank"))]
        name: String,
        #[validate(email)]
        email: String,
    }

    #[test]
    fn test_valid_request_passes() {
        let signup = Signup {
            name: "Ada".to_string(),
            email: "ada@school.test".to_string(),
        };
        assert!(validate(&signup).is_ok());
    }

    #[test]
    fn test_failures_are_invalid_input_listing_each_field() {
        let signup = Signup {
            name: "   ".to_string(),
            email: "not-an-email".to_string(),
        };

        let err = validate(&signup).unwrap_err();
        assert!(matches!(err, SubscriptionError::InvalidInput { .. }));
        assert_eq!(
            err.to_string(),
            "Invalid input: Validation failed: email: email, name: must not be blank"
        );
    }
}
