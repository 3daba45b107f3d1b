pub mod analytics;
pub mod enums;
pub mod subscriptions;
pub mod user_directory;
pub mod wolfram;
