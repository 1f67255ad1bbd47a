//! Institutes, subscriptions, members and registrations.
//!
//! Two partial unique indexes back the "one active, one upcoming per
//! institute" rule at the database level. They are created with raw SQL
//! because the syntax is shared by PostgreSQL and SQLite.

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Institutes::Table)
                    .if_not_exists()
                    .col(string(Institutes::Id).primary_key())
                    .col(string(Institutes::Name).not_null())
                    .col(string(Institutes::NameKey).not_null().unique_key())
                    .col(string(Institutes::Address).not_null())
                    .col(string(Institutes::OwnerAdminId).not_null())
                    .col(string_null(Institutes::CurrentPlan))
                    .col(string_null(Institutes::CurrentPlanDuration))
                    .col(string(Institutes::Status).not_null())
                    .col(timestamp_with_time_zone_null(Institutes::CurrentPeriodStart))
                    .col(timestamp_with_time_zone_null(Institutes::CurrentPeriodExpiry))
                    .col(timestamp_with_time_zone(Institutes::CreatedAt).not_null())
                    .col(timestamp_with_time_zone(Institutes::UpdatedAt).not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Subscriptions::Table)
                    .if_not_exists()
                    .col(string(Subscriptions::Id).primary_key())
                    .col(string(Subscriptions::InstituteId).not_null())
                    .col(string(Subscriptions::AdminId).not_null())
                    .col(string(Subscriptions::Plan).not_null())
                    .col(string(Subscriptions::PlanDuration).not_null())
                    .col(string(Subscriptions::Status).not_null())
                    .col(timestamp_with_time_zone(Subscriptions::PeriodStart).not_null())
                    .col(timestamp_with_time_zone(Subscriptions::PeriodExpiry).not_null())
                    .col(timestamp_with_time_zone(Subscriptions::CreatedAt).not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_subscriptions_institute_id")
                    .table(Subscriptions::Table)
                    .col(Subscriptions::InstituteId)
                    .to_owned(),
            )
            .await?;

        // Scheduler scans
        manager
            .create_index(
                Index::create()
                    .name("idx_subscriptions_status_expiry")
                    .table(Subscriptions::Table)
                    .col(Subscriptions::Status)
                    .col(Subscriptions::PeriodExpiry)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_subscriptions_status_start")
                    .table(Subscriptions::Table)
                    .col(Subscriptions::Status)
                    .col(Subscriptions::PeriodStart)
                    .to_owned(),
            )
            .await?;

        let db = manager.get_connection();
        db.execute_unprepared(
            "CREATE UNIQUE INDEX IF NOT EXISTS uq_subscriptions_one_active \
             ON subscriptions (institute_id) WHERE status = 'Active'",
        )
        .await?;
        db.execute_unprepared(
            "CREATE UNIQUE INDEX IF NOT EXISTS uq_subscriptions_one_upcoming \
             ON subscriptions (institute_id) WHERE status = 'Upcoming'",
        )
        .await?;

        manager
            .create_table(
                Table::create()
                    .table(Members::Table)
                    .if_not_exists()
                    .col(string(Members::Id).primary_key())
                    .col(string(Members::InstituteId).not_null())
                    .col(string(Members::Role).not_null())
                    .col(string(Members::Name).not_null())
                    .col(string(Members::Email).not_null())
                    .col(string(Members::EmailKey).not_null().unique_key())
                    .col(timestamp_with_time_zone(Members::CreatedAt).not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_members_institute_role")
                    .table(Members::Table)
                    .col(Members::InstituteId)
                    .col(Members::Role)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Registrations::Table)
                    .if_not_exists()
                    .col(string(Registrations::Id).primary_key())
                    .col(string(Registrations::InstituteId).not_null())
                    .col(string(Registrations::Role).not_null())
                    .col(string(Registrations::Name).not_null())
                    .col(string(Registrations::Email).not_null())
                    .col(string(Registrations::EmailKey).not_null())
                    .col(string(Registrations::Status).not_null())
                    .col(text_null(Registrations::RejectionReason))
                    .col(timestamp_with_time_zone(Registrations::SubmittedAt).not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_registrations_institute_status")
                    .table(Registrations::Table)
                    .col(Registrations::InstituteId)
                    .col(Registrations::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Registrations::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Members::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Subscriptions::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Institutes::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Institutes {
    Table,
    Id,
    Name,
    NameKey,
    Address,
    OwnerAdminId,
    CurrentPlan,
    CurrentPlanDuration,
    Status,
    CurrentPeriodStart,
    CurrentPeriodExpiry,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Subscriptions {
    Table,
    Id,
    InstituteId,
    AdminId,
    Plan,
    PlanDuration,
    Status,
    PeriodStart,
    PeriodExpiry,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Members {
    Table,
    Id,
    InstituteId,
    Role,
    Name,
    Email,
    EmailKey,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Registrations {
    Table,
    Id,
    InstituteId,
    Role,
    Name,
    Email,
    EmailKey,
    Status,
    RejectionReason,
    SubmittedAt,
}
