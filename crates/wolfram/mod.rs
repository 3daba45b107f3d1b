mod client;
mod parser;

pub use client::{DEFAULT_API_URL, WolframClient};
pub use parser::{QueryResult, parse_query_result};
