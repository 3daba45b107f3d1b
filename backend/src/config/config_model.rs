use std::path::PathBuf;

use super::stage::Stage;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub stage: Stage,
    pub backend_server: BackendServer,
    pub database: Database,
    pub app: App,
    pub auth: Auth,
    pub stripe: Stripe,
    pub wolfram: Wolfram,
}

#[derive(Debug, Clone)]
pub struct BackendServer {
    pub port: u16,
    pub body_limit: u64,
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct App {
    /// Public base URL used in checkout redirects; the request `Origin` is used when unset.
    pub url: Option<String>,
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Auth {
    pub session_secret: String,
    pub session_ttl_seconds: u64,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub admin_email: String,
}

#[derive(Debug, Clone)]
pub struct Stripe {
    pub secret_key: String,
    pub pro_price_id: Option<String>,
    pub webhook_secret: String,
}

#[derive(Debug, Clone)]
pub struct Wolfram {
    pub app_id: Option<String>,
    pub api_url: String,
}
