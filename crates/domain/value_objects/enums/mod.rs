pub mod calculation_kinds;
pub mod subscription_statuses;
