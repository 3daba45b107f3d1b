use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use crates::domain::{
    repositories::analytics::AnalyticsRepository,
    value_objects::wolfram::{ComputeRequest, ComputeResponse, StepsRequest},
};
use tracing::debug;

use crate::{
    auth::AuthUser,
    usecases::compute::{ComputeUseCase, MathEngine},
};

pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized - Please sign in";

/// `/wolfram` and `/steps`. The caller layers the paywall onto the steps router.
pub fn routes<E, A>(compute_usecase: Arc<ComputeUseCase<E, A>>) -> (Router, Router)
where
    E: MathEngine + 'static,
    A: AnalyticsRepository + Send + Sync + 'static,
{
    let wolfram = Router::new()
        .route("/wolfram", post(wolfram::<E, A>))
        .with_state(Arc::clone(&compute_usecase));

    let steps = Router::new()
        .route("/steps", post(steps::<E, A>))
        .with_state(compute_usecase);

    (wolfram, steps)
}

pub async fn wolfram<E, A>(
    State(compute_usecase): State<Arc<ComputeUseCase<E, A>>>,
    auth: Option<AuthUser>,
    payload: Result<Json<ComputeRequest>, JsonRejection>,
) -> Response
where
    E: MathEngine + 'static,
    A: AnalyticsRepository + Send + Sync + 'static,
{
    let Some(auth) = auth else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ComputeResponse::failure(UNAUTHORIZED_MESSAGE)),
        )
            .into_response();
    };

    let request = payload.map(|Json(request)| request).unwrap_or_else(|rejection| {
        debug!(error = %rejection, "compute router: unreadable wolfram body");
        ComputeRequest::default()
    });

    debug!(user_id = %auth.user_id, "compute router: wolfram query");

    match compute_usecase.compute(request.input).await {
        Ok(pods) => Json(ComputeResponse::pods(pods)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn steps<E, A>(
    State(compute_usecase): State<Arc<ComputeUseCase<E, A>>>,
    payload: Result<Json<StepsRequest>, JsonRejection>,
) -> Response
where
    E: MathEngine + 'static,
    A: AnalyticsRepository + Send + Sync + 'static,
{
    let request = payload.map(|Json(request)| request).unwrap_or_else(|rejection| {
        debug!(error = %rejection, "compute router: unreadable steps body");
        StepsRequest::default()
    });

    match compute_usecase.steps(request.input, request.podstate).await {
        Ok(pods) => Json(ComputeResponse::pods(pods)).into_response(),
        Err(err) => err.into_response(),
    }
}
