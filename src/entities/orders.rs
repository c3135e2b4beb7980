//! SeaORM Entity for orders
//!
//! `status` holds the internal lifecycle stage (see `models::order::OrderStatus`);
//! `platform_status` is the last raw label seen upstream and is informational only.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub platform_id: i32,
    /// Upstream identifier, unique per platform only
    pub platform_order_id: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_address: String,
    /// None until geocoded
    pub customer_lat: Option<f64>,
    pub customer_lng: Option<f64>,
    /// JSON array of `{name, quantity, price}`
    #[sea_orm(column_type = "Json")]
    pub items: Json,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub total_amount: Decimal,
    /// Minutes, set on acceptance
    pub preparation_time: i32,
    pub status: String,
    pub platform_status: Option<String>,
    pub confirmed_at: Option<DateTimeUtc>,
    pub rejected_at: Option<DateTimeUtc>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTimeUtc,
    /// Last transition time, drives automation timing
    pub updated_at: DateTimeUtc,
    /// Last upstream status check, whatever its outcome
    pub reconciled_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::platforms::Entity",
        from = "Column::PlatformId",
        to = "super::platforms::Column::Id"
    )]
    Platforms,
    #[sea_orm(has_many = "super::order_logs::Entity")]
    OrderLogs,
    #[sea_orm(has_one = "super::delivery_tracking::Entity")]
    DeliveryTracking,
}

impl Related<super::platforms::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Platforms.def()
    }
}

impl Related<super::order_logs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderLogs.def()
    }
}

impl Related<super::delivery_tracking::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DeliveryTracking.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
