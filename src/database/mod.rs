//! SeaORM persistence.
//!
//! [`SeaOrmStore`] implements every storage trait over one connection pool.
//! [`migration::Migrator`] creates the schema.

pub mod config;
pub mod migration;
pub mod sea_orm_store;

pub use config::{DatabaseConfig, redact_database_url};
pub use migration::{Migrator, run_migrations};
pub use sea_orm;
pub use sea_orm_store::SeaOrmStore;
