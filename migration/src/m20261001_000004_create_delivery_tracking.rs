//! Migration to create the delivery_tracking table (one row per order, upserted
//! on every poll tick)

use sea_orm_migration::{prelude::*, schema::*};

use crate::m20261001_000002_create_orders::Orders;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeliveryTracking::Table)
                    .if_not_exists()
                    .col(pk_auto(DeliveryTracking::Id))
                    .col(integer(DeliveryTracking::OrderId).unique_key())
                    .col(string_len(DeliveryTracking::Platform, 50))
                    .col(double_null(DeliveryTracking::DriverLat))
                    .col(double_null(DeliveryTracking::DriverLng))
                    .col(timestamp_with_time_zone_null(DeliveryTracking::EstimatedArrival))
                    .col(string_len(DeliveryTracking::Status, 20))
                    .col(timestamp_with_time_zone(DeliveryTracking::CreatedAt).default(Expr::current_timestamp()))
                    .col(timestamp_with_time_zone(DeliveryTracking::UpdatedAt).default(Expr::current_timestamp()))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_delivery_tracking_order_id")
                            .from(DeliveryTracking::Table, DeliveryTracking::OrderId)
                            .to(Orders::Table, Orders::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Cleanup sweep deletes by updated_at
        manager
            .create_index(
                Index::create()
                    .name("idx_delivery_tracking_updated_at")
                    .table(DeliveryTracking::Table)
                    .col(DeliveryTracking::UpdatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeliveryTracking::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DeliveryTracking {
    Table,
    Id,
    OrderId,
    Platform,
    DriverLat,
    DriverLng,
    EstimatedArrival,
    Status,
    CreatedAt,
    UpdatedAt,
}
