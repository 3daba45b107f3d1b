pub mod analytics;
pub mod subscriptions;
pub mod user_directory;
pub mod users;
