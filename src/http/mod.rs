//! HTTP response envelope and the RouteModule trait for organizing routes.

pub mod response;
pub mod routes;

pub use response::ApiResponse;
pub use routes::RouteModule;
