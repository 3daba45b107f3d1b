use crate::{
    auth::{SessionKeys, google::GoogleOAuthClient},
    axum_http::{
        default_routers, paywall,
        routers::{
            self,
            auth::AuthRouterState,
            subscriptions::SubscriptionRouterState,
        },
    },
    config::{config_model::DotEnvyConfig, stage::Stage},
    usecases::{
        admin::AdminUseCase, auth::AuthUseCase, compute::ComputeUseCase,
        subscriptions::SubscriptionUseCase,
    },
};
use anyhow::Result;
use axum::{
    Extension, Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
    routing::get,
};
use crates::{
    infra::{
        db::{
            postgres::postgres_connection::PgPoolSquad,
            repositories::{subscriptions::SubscriptionPostgres, users::UserPostgres},
        },
        storages::{analytics::AnalyticsFile, user_directory::UserDirectoryFile},
    },
    payments::stripe_client::StripeClient,
    wolfram::WolframClient,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

pub async fn start(config: Arc<DotEnvyConfig>, db_pool: Arc<PgPoolSquad>) -> Result<()> {
    let app = app(Arc::clone(&config), db_pool)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.backend_server.port));
    let listener = TcpListener::bind(addr).await?;

    info!("Server is running on port {}", config.backend_server.port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Builds the full router with its repositories, clients and layers.
pub fn app(config: Arc<DotEnvyConfig>, db_pool: Arc<PgPoolSquad>) -> Result<Router> {
    let is_development = config.stage == Stage::Development;
    let session_keys = Arc::new(SessionKeys::new(
        &config.auth.session_secret,
        config.auth.session_ttl_seconds,
    ));

    let user_repository = Arc::new(UserPostgres::new(Arc::clone(&db_pool)));
    let subscription_repository = Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool)));
    let user_directory = Arc::new(UserDirectoryFile::new(&config.app.data_dir));
    let analytics_store = Arc::new(AnalyticsFile::new(&config.app.data_dir));

    let stripe_client = Arc::new(StripeClient::new(
        config.stripe.secret_key.clone(),
        config.stripe.webhook_secret.clone(),
    ));
    let wolfram_client = config.wolfram.app_id.clone().map(|app_id| {
        Arc::new(WolframClient::new(config.wolfram.api_url.clone(), app_id))
    });
    if wolfram_client.is_none() {
        warn!("WOLFRAM_APP_ID is not set; compute routes will report it per request");
    }

    let subscriptions_usecase = Arc::new(SubscriptionUseCase::new(
        user_repository,
        subscription_repository,
        stripe_client,
        config.stripe.pro_price_id.clone(),
        is_development,
    ));

    let auth_state = Arc::new(AuthRouterState {
        auth_usecase: AuthUseCase::new(
            Arc::new(GoogleOAuthClient::new(
                config.auth.google_client_id.clone(),
                config.auth.google_client_secret.clone(),
            )),
            Arc::clone(&user_directory),
            Arc::clone(&session_keys),
        ),
        app_url: config.app.url.clone(),
        secure_cookies: !is_development,
    });

    let compute_usecase = Arc::new(ComputeUseCase::new(
        wolfram_client,
        Arc::clone(&analytics_store),
    ));
    let (wolfram_routes, steps_routes) = routers::compute::routes(compute_usecase);
    let steps_routes = steps_routes.route_layer(middleware::from_fn_with_state(
        Arc::clone(&subscriptions_usecase),
        paywall::require_active_subscription::<UserPostgres, SubscriptionPostgres, StripeClient>,
    ));

    let admin_usecase = Arc::new(AdminUseCase::new(
        user_directory,
        analytics_store,
        config.auth.admin_email.clone(),
    ));

    let subscription_state = Arc::new(SubscriptionRouterState {
        subscriptions_usecase,
        app_url: config.app.url.clone(),
    });

    let app = Router::new()
        .fallback(default_routers::not_found)
        .nest("/api/auth", routers::auth::routes(auth_state))
        .nest(
            "/api",
            wolfram_routes
                .merge(steps_routes)
                .merge(routers::subscriptions::routes(subscription_state))
                .merge(routers::admin::routes(admin_usecase)),
        )
        .route("/api/health-check", get(default_routers::health_check))
        .layer(Extension(session_keys))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.backend_server.timeout,
        )))
        .layer(RequestBodyLimitLayer::new(
            (config.backend_server.body_limit * 1024 * 1024).try_into()?,
        ))
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([AUTHORIZATION, CONTENT_TYPE])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http());

    Ok(app)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
