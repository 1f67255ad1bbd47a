//! Institutes and their cached plan projection.

pub mod projection;
pub mod routes;
pub mod service;
pub mod storage;
pub mod types;

pub use projection::{InstituteProjection, ProjectionSnapshot};
pub use routes::InstituteRoutes;
pub use service::{DeletionSummary, InstituteService};
pub use storage::InstituteStore;
pub use types::{Institute, InstituteStatus, NewInstitute};
