//! SeaORM-backed storage for institutes, the subscription ledger, members and
//! registrations.
//!
//! # Example
//!
//! ```rust,ignore
//! use campus_ledger::{AppContext, DatabaseConfig, SeaOrmStore};
//!
//! let store = SeaOrmStore::connect(&DatabaseConfig::from_env().unwrap()).await?;
//! let context = AppContext::builder().with_store(store).build();
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectOptions, ConnectionTrait, Database,
    DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr,
    TransactionTrait, sea_query::Expr,
};
use std::time::Duration;

use super::config::DatabaseConfig;
use super::migration::{Migrator, run_migrations};
use crate::error::{CampusError, Result};
use crate::institutes::{Institute, InstituteStatus, InstituteStore, ProjectionSnapshot};
use crate::members::{
    Member, MembershipDirectory, PendingRegistration, RegistrationStatus, RegistrationStore, Role,
};
use crate::subscriptions::{BatchCursor, Subscription, SubscriptionStatus, SubscriptionStore};

// =============================================================================
// SeaORM Entities
// =============================================================================

mod entity {
    pub mod institute {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "institutes")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub name: String,
            /// Lowercased name, unique.
            #[sea_orm(unique)]
            pub name_key: String,
            pub address: String,
            pub owner_admin_id: String,
            pub current_plan: Option<String>,
            pub current_plan_duration: Option<String>,
            pub status: String,
            pub current_period_start: Option<DateTimeUtc>,
            pub current_period_expiry: Option<DateTimeUtc>,
            pub created_at: DateTimeUtc,
            pub updated_at: DateTimeUtc,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod subscription {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "subscriptions")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub institute_id: String,
            pub admin_id: String,
            pub plan: String,
            pub plan_duration: String,
            pub status: String,
            pub period_start: DateTimeUtc,
            pub period_expiry: DateTimeUtc,
            pub created_at: DateTimeUtc,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod member {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "members")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub institute_id: String,
            pub role: String,
            pub name: String,
            pub email: String,
            #[sea_orm(unique)]
            pub email_key: String,
            pub created_at: DateTimeUtc,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod registration {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "registrations")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub institute_id: String,
            pub role: String,
            pub name: String,
            pub email: String,
            pub email_key: String,
            pub status: String,
            pub rejection_reason: Option<String>,
            pub submitted_at: DateTimeUtc,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }
}

use entity::{institute, member, registration, subscription};

// =============================================================================
// Helper Functions
// =============================================================================

/// Unique violations become `Conflict`; everything else is a database error.
fn db_err(err: DbErr) -> CampusError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => CampusError::conflict(detail),
        _ => CampusError::Database(err.to_string()),
    }
}

fn corrupt(table: &str, column: &str, value: &str) -> CampusError {
    CampusError::internal(format!("Unrecognized {table}.{column} value '{value}'"))
}

#[inline]
fn count_to_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn model_to_institute(model: institute::Model) -> Result<Institute> {
    let status = InstituteStatus::from_stored(&model.status)
        .ok_or_else(|| corrupt("institutes", "status", &model.status))?;
    Ok(Institute {
        id: model.id,
        name: model.name,
        address: model.address,
        owner_admin_id: model.owner_admin_id,
        current_plan: model.current_plan,
        current_plan_duration: model.current_plan_duration,
        status,
        current_period_start: model.current_period_start,
        current_period_expiry: model.current_period_expiry,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

fn institute_to_active_model(institute: &Institute) -> institute::ActiveModel {
    institute::ActiveModel {
        id: Set(institute.id.clone()),
        name: Set(institute.name.clone()),
        name_key: Set(institute.name.to_lowercase()),
        address: Set(institute.address.clone()),
        owner_admin_id: Set(institute.owner_admin_id.clone()),
        current_plan: Set(institute.current_plan.clone()),
        current_plan_duration: Set(institute.current_plan_duration.clone()),
        status: Set(institute.status.as_str().to_string()),
        current_period_start: Set(institute.current_period_start),
        current_period_expiry: Set(institute.current_period_expiry),
        created_at: Set(institute.created_at),
        updated_at: Set(institute.updated_at),
    }
}

fn model_to_subscription(model: subscription::Model) -> Result<Subscription> {
    let status = SubscriptionStatus::from_stored(&model.status)
        .ok_or_else(|| corrupt("subscriptions", "status", &model.status))?;
    Ok(Subscription {
        id: model.id,
        institute_id: model.institute_id,
        admin_id: model.admin_id,
        plan: model.plan,
        plan_duration: model.plan_duration,
        status,
        period_start: model.period_start,
        period_expiry: model.period_expiry,
        created_at: model.created_at,
    })
}

fn subscription_to_active_model(subscription: &Subscription) -> subscription::ActiveModel {
    subscription::ActiveModel {
        id: Set(subscription.id.clone()),
        institute_id: Set(subscription.institute_id.clone()),
        admin_id: Set(subscription.admin_id.clone()),
        plan: Set(subscription.plan.clone()),
        plan_duration: Set(subscription.plan_duration.clone()),
        status: Set(subscription.status.as_str().to_string()),
        period_start: Set(subscription.period_start),
        period_expiry: Set(subscription.period_expiry),
        created_at: Set(subscription.created_at),
    }
}

fn parse_role(table: &str, value: &str) -> Result<Role> {
    value.parse().map_err(|_| corrupt(table, "role", value))
}

fn model_to_member(model: member::Model) -> Result<Member> {
    Ok(Member {
        role: parse_role("members", &model.role)?,
        id: model.id,
        institute_id: model.institute_id,
        name: model.name,
        email: model.email,
        created_at: model.created_at,
    })
}

fn model_to_registration(model: registration::Model) -> Result<PendingRegistration> {
    Ok(PendingRegistration {
        role: parse_role("registrations", &model.role)?,
        status: RegistrationStatus::from_stored(&model.status),
        id: model.id,
        institute_id: model.institute_id,
        name: model.name,
        email: model.email,
        rejection_reason: model.rejection_reason,
        submitted_at: model.submitted_at,
    })
}

fn collect<M, T>(models: Vec<M>, convert: fn(M) -> Result<T>) -> Result<Vec<T>> {
    models.into_iter().map(convert).collect()
}

/// `(column, id) > (cursor.at, cursor.id)` for keyset paging.
fn after_cursor(column: subscription::Column, cursor: &BatchCursor) -> Condition {
    Condition::any().add(column.gt(cursor.at)).add(
        Condition::all()
            .add(column.eq(cursor.at))
            .add(subscription::Column::Id.gt(cursor.id.as_str())),
    )
}

// =============================================================================
// Store
// =============================================================================

/// One SeaORM connection pool serving every storage trait.
#[derive(Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Connect with the pool settings from `config`, migrating if `auto_migrate` is set.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let mut opt = ConnectOptions::new(&config.url);
        opt.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .idle_timeout(Duration::from_secs(config.idle_timeout))
            .sqlx_logging(false);

        let db = Database::connect(opt).await.map_err(|e| {
            CampusError::internal(format!("Failed to connect to database: {}", e))
        })?;

        tracing::info!(
            url = %config.redacted_url(),
            max_connections = config.max_connections,
            "Database connected"
        );

        if config.auto_migrate {
            run_migrations::<Migrator>(&db).await?;
        }

        Ok(Self::new(db))
    }

    /// Get the inner SeaORM connection
    pub fn inner(&self) -> &DatabaseConnection {
        &self.db
    }
}

async fn has_other_in<C: ConnectionTrait>(
    conn: &C,
    institute_id: &str,
    status: SubscriptionStatus,
    excluding_id: &str,
) -> Result<bool> {
    let count = subscription::Entity::find()
        .filter(subscription::Column::InstituteId.eq(institute_id))
        .filter(subscription::Column::Status.eq(status.as_str()))
        .filter(subscription::Column::Id.ne(excluding_id))
        .count(conn)
        .await
        .map_err(db_err)?;
    Ok(count > 0)
}

#[async_trait]
impl InstituteStore for SeaOrmStore {
    async fn create(&self, institute: &Institute) -> Result<()> {
        if self.find_by_name(&institute.name).await?.is_some() {
            return Err(CampusError::conflict(format!(
                "Institute name '{}' is already taken",
                institute.name
            )));
        }

        institute_to_active_model(institute)
            .insert(&self.db)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Institute>> {
        institute::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(model_to_institute)
            .transpose()
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Institute>> {
        institute::Entity::find()
            .filter(institute::Column::NameKey.eq(name.to_lowercase()))
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(model_to_institute)
            .transpose()
    }

    async fn list(&self) -> Result<Vec<Institute>> {
        let models = institute::Entity::find()
            .order_by_asc(institute::Column::CreatedAt)
            .order_by_asc(institute::Column::Id)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        collect(models, model_to_institute)
    }

    async fn update_projection(
        &self,
        id: &str,
        snapshot: &ProjectionSnapshot,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = institute::Entity::update_many()
            .col_expr(
                institute::Column::CurrentPlan,
                Expr::value(snapshot.plan.clone()),
            )
            .col_expr(
                institute::Column::CurrentPlanDuration,
                Expr::value(snapshot.plan_duration.clone()),
            )
            .col_expr(
                institute::Column::Status,
                Expr::value(snapshot.status.as_str()),
            )
            .col_expr(
                institute::Column::CurrentPeriodStart,
                Expr::value(snapshot.period_start),
            )
            .col_expr(
                institute::Column::CurrentPeriodExpiry,
                Expr::value(snapshot.period_expiry),
            )
            .col_expr(institute::Column::UpdatedAt, Expr::value(at))
            .filter(institute::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected > 0)
    }

    async fn set_status(
        &self,
        id: &str,
        status: InstituteStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = institute::Entity::update_many()
            .col_expr(institute::Column::Status, Expr::value(status.as_str()))
            .col_expr(institute::Column::UpdatedAt, Expr::value(at))
            .filter(institute::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected > 0)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = institute::Entity::delete_by_id(id)
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected > 0)
    }
}

#[async_trait]
impl SubscriptionStore for SeaOrmStore {
    async fn insert(&self, subscription: &Subscription) -> Result<()> {
        let txn = self.db.begin().await.map_err(db_err)?;

        if subscription.status != SubscriptionStatus::Expired
            && has_other_in(
                &txn,
                &subscription.institute_id,
                subscription.status,
                &subscription.id,
            )
            .await?
        {
            return Err(CampusError::conflict(format!(
                "Institute {} already has an {} subscription",
                subscription.institute_id,
                subscription.status.as_str().to_lowercase()
            )));
        }

        subscription_to_active_model(subscription)
            .insert(&txn)
            .await
            .map_err(db_err)?;
        txn.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Subscription>> {
        subscription::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(model_to_subscription)
            .transpose()
    }

    async fn active_for(&self, institute_id: &str) -> Result<Option<Subscription>> {
        subscription::Entity::find()
            .filter(subscription::Column::InstituteId.eq(institute_id))
            .filter(subscription::Column::Status.eq(SubscriptionStatus::Active.as_str()))
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(model_to_subscription)
            .transpose()
    }

    async fn upcoming_for(&self, institute_id: &str) -> Result<Option<Subscription>> {
        subscription::Entity::find()
            .filter(subscription::Column::InstituteId.eq(institute_id))
            .filter(subscription::Column::Status.eq(SubscriptionStatus::Upcoming.as_str()))
            .order_by_asc(subscription::Column::PeriodStart)
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(model_to_subscription)
            .transpose()
    }

    async fn list_for_institute(&self, institute_id: &str) -> Result<Vec<Subscription>> {
        let models = subscription::Entity::find()
            .filter(subscription::Column::InstituteId.eq(institute_id))
            .order_by_desc(subscription::Column::PeriodStart)
            .order_by_desc(subscription::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        collect(models, model_to_subscription)
    }

    async fn due_for_expiry(
        &self,
        now: DateTime<Utc>,
        after: Option<&BatchCursor>,
        limit: usize,
    ) -> Result<Vec<Subscription>> {
        let mut query = subscription::Entity::find()
            .filter(subscription::Column::Status.is_in([
                SubscriptionStatus::Active.as_str(),
                SubscriptionStatus::Upcoming.as_str(),
            ]))
            .filter(subscription::Column::PeriodExpiry.lt(now));
        if let Some(cursor) = after {
            query = query.filter(after_cursor(subscription::Column::PeriodExpiry, cursor));
        }

        let models = query
            .order_by_asc(subscription::Column::PeriodExpiry)
            .order_by_asc(subscription::Column::Id)
            .limit(limit as u64)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        collect(models, model_to_subscription)
    }

    async fn due_for_activation(
        &self,
        now: DateTime<Utc>,
        after: Option<&BatchCursor>,
        limit: usize,
    ) -> Result<Vec<Subscription>> {
        let mut query = subscription::Entity::find()
            .filter(subscription::Column::Status.eq(SubscriptionStatus::Upcoming.as_str()))
            .filter(subscription::Column::PeriodStart.lte(now));
        if let Some(cursor) = after {
            query = query.filter(after_cursor(subscription::Column::PeriodStart, cursor));
        }

        let models = query
            .order_by_asc(subscription::Column::PeriodStart)
            .order_by_asc(subscription::Column::Id)
            .limit(limit as u64)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        collect(models, model_to_subscription)
    }

    async fn transition(
        &self,
        id: &str,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    ) -> Result<bool> {
        let txn = self.db.begin().await.map_err(db_err)?;

        if to == SubscriptionStatus::Active {
            let Some(current) = subscription::Entity::find_by_id(id)
                .one(&txn)
                .await
                .map_err(db_err)?
            else {
                return Ok(false);
            };
            if has_other_in(&txn, &current.institute_id, SubscriptionStatus::Active, id).await? {
                return Err(CampusError::conflict(format!(
                    "Institute {} already has an active subscription",
                    current.institute_id
                )));
            }
        }

        // Conditional on the current status; zero rows means someone else moved it
        let result = subscription::Entity::update_many()
            .col_expr(subscription::Column::Status, Expr::value(to.as_str()))
            .filter(subscription::Column::Id.eq(id))
            .filter(subscription::Column::Status.eq(from.as_str()))
            .exec(&txn)
            .await
            .map_err(db_err)?;

        txn.commit().await.map_err(db_err)?;
        Ok(result.rows_affected > 0)
    }

    async fn count_active(&self, institute_id: &str) -> Result<u32> {
        let count = subscription::Entity::find()
            .filter(subscription::Column::InstituteId.eq(institute_id))
            .filter(subscription::Column::Status.eq(SubscriptionStatus::Active.as_str()))
            .count(&self.db)
            .await
            .map_err(db_err)?;
        Ok(count_to_u32(count))
    }

    async fn delete_for_institute(&self, institute_id: &str) -> Result<u64> {
        let result = subscription::Entity::delete_many()
            .filter(subscription::Column::InstituteId.eq(institute_id))
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected)
    }
}

#[async_trait]
impl MembershipDirectory for SeaOrmStore {
    async fn count_by_role(&self, institute_id: &str, role: Role) -> Result<u32> {
        let count = member::Entity::find()
            .filter(member::Column::InstituteId.eq(institute_id))
            .filter(member::Column::Role.eq(role.as_str()))
            .count(&self.db)
            .await
            .map_err(db_err)?;
        Ok(count_to_u32(count))
    }

    async fn add_member(&self, member: &Member) -> Result<()> {
        member::ActiveModel {
            id: Set(member.id.clone()),
            institute_id: Set(member.institute_id.clone()),
            role: Set(member.role.as_str().to_string()),
            name: Set(member.name.clone()),
            email: Set(member.email.clone()),
            email_key: Set(member.email.to_lowercase()),
            created_at: Set(member.created_at),
        }
        .insert(&self.db)
        .await
        .map_err(|e| match db_err(e) {
            CampusError::Conflict(_) => CampusError::conflict(format!(
                "Email '{}' is already registered",
                member.email
            )),
            other => other,
        })?;
        Ok(())
    }

    async fn list_members(&self, institute_id: &str) -> Result<Vec<Member>> {
        let models = member::Entity::find()
            .filter(member::Column::InstituteId.eq(institute_id))
            .order_by_asc(member::Column::CreatedAt)
            .order_by_asc(member::Column::Id)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        collect(models, model_to_member)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Member>> {
        member::Entity::find()
            .filter(member::Column::EmailKey.eq(email.to_lowercase()))
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(model_to_member)
            .transpose()
    }

    async fn remove_member(&self, id: &str) -> Result<bool> {
        let result = member::Entity::delete_by_id(id.to_string())
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected > 0)
    }

    async fn remove_members_for(&self, institute_id: &str) -> Result<u64> {
        let result = member::Entity::delete_many()
            .filter(member::Column::InstituteId.eq(institute_id))
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected)
    }
}

#[async_trait]
impl RegistrationStore for SeaOrmStore {
    async fn insert_registration(&self, registration: &PendingRegistration) -> Result<()> {
        registration::ActiveModel {
            id: Set(registration.id.clone()),
            institute_id: Set(registration.institute_id.clone()),
            role: Set(registration.role.as_str().to_string()),
            name: Set(registration.name.clone()),
            email: Set(registration.email.clone()),
            email_key: Set(registration.email.to_lowercase()),
            status: Set(registration.status.as_str().to_string()),
            rejection_reason: Set(registration.rejection_reason.clone()),
            submitted_at: Set(registration.submitted_at),
        }
        .insert(&self.db)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_registration(&self, id: &str) -> Result<Option<PendingRegistration>> {
        registration::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(model_to_registration)
            .transpose()
    }

    async fn find_pending_by_email(&self, email: &str) -> Result<Option<PendingRegistration>> {
        registration::Entity::find()
            .filter(registration::Column::EmailKey.eq(email.to_lowercase()))
            .filter(registration::Column::Status.eq(RegistrationStatus::Pending.as_str()))
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(model_to_registration)
            .transpose()
    }

    async fn list_pending(&self, institute_id: &str) -> Result<Vec<PendingRegistration>> {
        let models = registration::Entity::find()
            .filter(registration::Column::InstituteId.eq(institute_id))
            .filter(registration::Column::Status.eq(RegistrationStatus::Pending.as_str()))
            .order_by_asc(registration::Column::SubmittedAt)
            .order_by_asc(registration::Column::Id)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        collect(models, model_to_registration)
    }

    async fn mark_rejected(&self, id: &str, reason: Option<&str>) -> Result<bool> {
        let result = registration::Entity::update_many()
            .col_expr(
                registration::Column::Status,
                Expr::value(RegistrationStatus::Rejected.as_str()),
            )
            .col_expr(
                registration::Column::RejectionReason,
                Expr::value(reason.map(str::to_string)),
            )
            .filter(registration::Column::Id.eq(id))
            .filter(registration::Column::Status.eq(RegistrationStatus::Pending.as_str()))
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected > 0)
    }

    async fn take_pending(&self, id: &str) -> Result<bool> {
        let result = registration::Entity::delete_many()
            .filter(registration::Column::Id.eq(id))
            .filter(registration::Column::Status.eq(RegistrationStatus::Pending.as_str()))
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected > 0)
    }

    async fn delete_registrations_for(&self, institute_id: &str) -> Result<u64> {
        let result = registration::Entity::delete_many()
            .filter(registration::Column::InstituteId.eq(institute_id))
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected)
    }
}
