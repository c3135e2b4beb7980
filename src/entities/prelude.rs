pub use super::delivery_tracking::Entity as DeliveryTracking;
pub use super::order_logs::Entity as OrderLogs;
pub use super::orders::Entity as Orders;
pub use super::platforms::Entity as Platforms;
