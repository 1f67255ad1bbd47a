//! Institute storage trait.

use super::projection::ProjectionSnapshot;
use super::types::{Institute, InstituteStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Persistence for institutes and their cached projection.
#[async_trait]
pub trait InstituteStore: Send + Sync {
    /// Insert a new institute. Fails with `Conflict` if the name is taken
    /// (compared case-insensitively).
    async fn create(&self, institute: &Institute) -> Result<()>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Institute>>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Institute>>;

    /// All institutes ordered by creation time.
    async fn list(&self) -> Result<Vec<Institute>>;

    /// Overwrite every projection field. Returns `false` if the institute is gone.
    async fn update_projection(
        &self,
        id: &str,
        snapshot: &ProjectionSnapshot,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Change only the cached status. Returns `false` if the institute is gone.
    async fn set_status(&self, id: &str, status: InstituteStatus, at: DateTime<Utc>)
    -> Result<bool>;

    /// Remove the institute row. Returns `false` if it did not exist.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Check if an institute exists.
    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.find_by_id(id).await?.is_some())
    }
}
