pub use sea_orm_migration::prelude::*;

mod m20261001_000001_create_platforms;
mod m20261001_000002_create_orders;
mod m20261001_000003_create_order_logs;
mod m20261001_000004_create_delivery_tracking;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_create_platforms::Migration),
            Box::new(m20261001_000002_create_orders::Migration),
            Box::new(m20261001_000003_create_order_logs::Migration),
            Box::new(m20261001_000004_create_delivery_tracking::Migration),
        ]
    }
}
