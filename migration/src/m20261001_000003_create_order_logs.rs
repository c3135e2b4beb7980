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
                    .table(OrderLogs::Table)
                    .if_not_exists()
                    .col(pk_auto(OrderLogs::Id))
                    .col(integer(OrderLogs::OrderId))
                    .col(string_len(OrderLogs::Action, 30))
                    .col(json_null(OrderLogs::Details))
                    .col(timestamp_with_time_zone(OrderLogs::CreatedAt).default(Expr::current_timestamp()))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_order_logs_order_id")
                            .from(OrderLogs::Table, OrderLogs::OrderId)
                            .to(Orders::Table, Orders::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_order_logs_order_id")
                    .table(OrderLogs::Table)
                    .col(OrderLogs::OrderId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OrderLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum OrderLogs {
    Table,
    Id,
    OrderId,
    Action,
    Details,
    CreatedAt,
}
