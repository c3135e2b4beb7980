//! Migration to create the platforms table and seed the upstream marketplaces
//! the order hub ships adapters for.

use sea_orm_migration::{prelude::*, schema::*, sea_orm::ConnectionTrait};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// (name, is_active)
const DEFAULT_PLATFORMS: &[(&str, bool)] = &[("rappi", true), ("ubereats", true), ("pedidosya", true)];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Platforms::Table)
                    .if_not_exists()
                    .col(pk_auto(Platforms::Id))
                    .col(string_len(Platforms::Name, 50).unique_key())
                    .col(string_null(Platforms::ApiUrl))
                    .col(string_null(Platforms::ApiKey))
                    .col(boolean(Platforms::IsActive).default(true))
                    .col(timestamp_with_time_zone(Platforms::CreatedAt).default(Expr::current_timestamp()))
                    .to_owned(),
            )
            .await?;

        let mut seed = Query::insert();
        seed.into_table(Platforms::Table)
            .columns([Platforms::Name, Platforms::IsActive]);
        for (name, active) in DEFAULT_PLATFORMS {
            seed.values_panic([(*name).into(), (*active).into()]);
        }

        let db = manager.get_connection();
        db.execute(db.get_database_backend().build(&seed)).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Platforms::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Platforms {
    Table,
    Id,
    Name,
    ApiUrl,
    ApiKey,
    IsActive,
    CreatedAt,
}
