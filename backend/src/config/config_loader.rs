use std::path::PathBuf;

use anyhow::{Context, Result};
use crates::wolfram::DEFAULT_API_URL;

use super::{
    config_model::{App, Auth, BackendServer, Database, DotEnvyConfig, Stripe, Wolfram},
    stage::Stage,
};

const DEFAULT_SESSION_TTL_SECONDS: u64 = 60 * 60 * 24 * 30;

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let stage = get_stage();

    let backend_server = BackendServer {
        port: required("SERVER_PORT_BACKEND")?
            .parse()
            .context("SERVER_PORT_BACKEND is invalid")?,
        body_limit: required("SERVER_BODY_LIMIT")?
            .parse()
            .context("SERVER_BODY_LIMIT is invalid")?,
        timeout: required("SERVER_TIMEOUT")?
            .parse()
            .context("SERVER_TIMEOUT is invalid")?,
    };

    let database = Database {
        url: required("DATABASE_URL")?,
    };

    let app = App {
        url: optional("APP_URL").map(|url| url.trim_end_matches('/').to_string()),
        data_dir: optional("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data")),
    };

    let auth = Auth {
        session_secret: required("SESSION_SECRET")?,
        session_ttl_seconds: match optional("SESSION_TTL_SECONDS") {
            Some(raw) => raw.parse().context("SESSION_TTL_SECONDS is invalid")?,
            None => DEFAULT_SESSION_TTL_SECONDS,
        },
        google_client_id: required("GOOGLE_CLIENT_ID")?,
        google_client_secret: required("GOOGLE_CLIENT_SECRET")?,
        admin_email: required("ADMIN_EMAIL")?,
    };

    let stripe = stripe_for_stage(stage)?;

    let wolfram = Wolfram {
        app_id: optional("WOLFRAM_APP_ID"),
        api_url: optional("WOLFRAM_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
    };

    Ok(DotEnvyConfig {
        stage,
        backend_server,
        database,
        app,
        auth,
        stripe,
        wolfram,
    })
}

pub fn get_stage() -> Stage {
    dotenvy::dotenv().ok();

    let stage_str = std::env::var("STAGE").unwrap_or_default();
    Stage::try_from(&stage_str).unwrap_or_default()
}

/// Test-mode Stripe keys are used in development, live keys otherwise.
fn stripe_for_stage(stage: Stage) -> Result<Stripe> {
    let (secret_key_var, price_id_var) = stripe_vars(stage);

    Ok(Stripe {
        secret_key: required(secret_key_var)?,
        pro_price_id: optional(price_id_var),
        webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
    })
}

fn stripe_vars(stage: Stage) -> (&'static str, &'static str) {
    match stage {
        Stage::Development => ("STRIPE_SECRET_KEY_TEST", "STRIPE_PRO_PRICE_ID_TEST"),
        Stage::Production => ("STRIPE_SECRET_KEY", "STRIPE_PRO_PRICE_ID"),
    }
}

fn required(key: &str) -> Result<String> {
    optional(key).with_context(|| format!("{key} is invalid"))
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}
