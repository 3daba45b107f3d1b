mod json_file;

pub mod analytics;
pub mod user_directory;
