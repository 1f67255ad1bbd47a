//! Institute members and the registration approval flow.

pub mod directory;
pub mod registration;
pub mod routes;
pub mod types;

pub use directory::{MembershipDirectory, RegistrationStore};
pub use registration::{PendingOverview, RegistrationRequest, RegistrationService};
pub use routes::RegistrationRoutes;
pub use types::{Member, ParseRoleError, PendingRegistration, RegistrationStatus, Role};
