use crate::app::AppContext;
use axum::Router;

/// Trait for composable route modules
///
/// Each endpoint group (subscriptions, institutes, registrations) implements
/// this and is merged into the [`crate::App`] router.
///
/// # Example
///
/// ```ignore
/// struct AuditRoutes;
///
/// impl RouteModule for AuditRoutes {
///     fn routes(&self) -> Router<AppContext> {
///         Router::new().route("/audit/{institute_id}", get(audit_log))
///     }
/// }
/// ```
pub trait RouteModule {
    /// Returns a router with all routes for this module
    ///
    /// The router should NOT have state applied. The App applies
    /// `AppContext` when it serves, so handlers use `State<AppContext>`.
    fn routes(&self) -> Router<AppContext>
    where
        Self: Sized;

    /// Optional: specify a path prefix for all routes in this module
    fn prefix(&self) -> Option<&str> {
        None
    }
}
