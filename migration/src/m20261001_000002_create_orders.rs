//! Migration to create the orders table
//!
//! The unique index on (platform_id, platform_order_id) is the durable dedup
//! boundary for upstream re-deliveries; adapter-side dedup is memory only.

use sea_orm_migration::{prelude::*, schema::*};

use crate::m20261001_000001_create_platforms::Platforms;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Orders::Table)
                    .if_not_exists()
                    .col(pk_auto(Orders::Id))
                    .col(integer(Orders::PlatformId))
                    .col(string(Orders::PlatformOrderId))
                    .col(string(Orders::CustomerName).default(""))
                    .col(string(Orders::CustomerPhone).default(""))
                    .col(text(Orders::CustomerAddress).default(""))
                    .col(double_null(Orders::CustomerLat))
                    .col(double_null(Orders::CustomerLng))
                    .col(json(Orders::Items))
                    .col(decimal_len(Orders::TotalAmount, 12, 2).default(0))
                    .col(integer(Orders::PreparationTime).default(15))
                    .col(string_len(Orders::Status, 20).default("pending"))
                    .col(string_null(Orders::PlatformStatus))
                    .col(timestamp_with_time_zone_null(Orders::ConfirmedAt))
                    .col(timestamp_with_time_zone_null(Orders::RejectedAt))
                    .col(text_null(Orders::RejectionReason))
                    .col(timestamp_with_time_zone(Orders::CreatedAt).default(Expr::current_timestamp()))
                    .col(timestamp_with_time_zone(Orders::UpdatedAt).default(Expr::current_timestamp()))
                    .col(timestamp_with_time_zone(Orders::ReconciledAt).default(Expr::current_timestamp()))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_orders_platform_id")
                            .from(Orders::Table, Orders::PlatformId)
                            .to(Platforms::Table, Platforms::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_orders_platform_ref")
                    .table(Orders::Table)
                    .col(Orders::PlatformId)
                    .col(Orders::PlatformOrderId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Automation scans filter by status and order by updated_at
        manager
            .create_index(
                Index::create()
                    .name("idx_orders_status_updated_at")
                    .table(Orders::Table)
                    .col(Orders::Status)
                    .col(Orders::UpdatedAt)
                    .to_owned(),
            )
            .await?;

        // Reconciliation takes the least recently checked orders first
        manager
            .create_index(
                Index::create()
                    .name("idx_orders_status_reconciled_at")
                    .table(Orders::Table)
                    .col(Orders::Status)
                    .col(Orders::ReconciledAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Orders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Orders {
    Table,
    Id,
    PlatformId,
    PlatformOrderId,
    CustomerName,
    CustomerPhone,
    CustomerAddress,
    CustomerLat,
    CustomerLng,
    Items,
    TotalAmount,
    PreparationTime,
    Status,
    PlatformStatus,
    ConfirmedAt,
    RejectedAt,
    RejectionReason,
    CreatedAt,
    UpdatedAt,
    ReconciledAt,
}
