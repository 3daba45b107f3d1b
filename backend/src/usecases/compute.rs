use std::sync::Arc;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::Utc;
use crates::{
    domain::{
        repositories::analytics::AnalyticsRepository,
        value_objects::{enums::calculation_kinds::CalculationKind, wolfram::Pod},
    },
    wolfram::{WolframClient, parse_query_result},
};
use thiserror::Error;
use tracing::{error, info, warn};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MathEngine: Send + Sync {
    /// Raw XML answer for `input`, optionally rendered in an alternate pod state.
    async fn query(&self, input: &str, podstate: Option<String>) -> AnyResult<String>;
}

#[async_trait]
impl MathEngine for WolframClient {
    async fn query(&self, input: &str, podstate: Option<String>) -> AnyResult<String> {
        self.query(input, podstate.as_deref()).await
    }
}

#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Missing WOLFRAM_APP_ID in environment")]
    MissingAppId,
    #[error("Missing required field: input")]
    MissingInput,
    #[error("Missing required fields: input, podstate")]
    MissingStepsFields,
    #[error("No pods returned")]
    NoPods,
    #[error("Server error")]
    Internal(#[from] anyhow::Error),
}

impl ComputeError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            ComputeError::MissingAppId | ComputeError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ComputeError::MissingInput | ComputeError::MissingStepsFields => {
                StatusCode::BAD_REQUEST
            }
            ComputeError::NoPods => StatusCode::OK,
        }
    }
}

pub type ComputeResult<T> = std::result::Result<T, ComputeError>;

pub struct ComputeUseCase<E, A>
where
    E: MathEngine + 'static,
    A: AnalyticsRepository + Send + Sync + 'static,
{
    /// `None` when no API key is configured.
    engine: Option<Arc<E>>,
    analytics_repo: Arc<A>,
}

impl<E, A> ComputeUseCase<E, A>
where
    E: MathEngine + 'static,
    A: AnalyticsRepository + Send + Sync + 'static,
{
    pub fn new(engine: Option<Arc<E>>, analytics_repo: Arc<A>) -> Self {
        Self {
            engine,
            analytics_repo,
        }
    }

    /// Evaluates an expression and counts it in the usage analytics.
    pub async fn compute(&self, input: Option<String>) -> ComputeResult<Vec<Pod>> {
        let engine = self.engine()?;
        let input = non_blank(input).ok_or(ComputeError::MissingInput)?;

        let pods = Self::run_query(engine, &input, None).await?;

        let kind = CalculationKind::classify(&input);
        if let Err(err) = self
            .analytics_repo
            .record_calculation(kind, Utc::now().date_naive())
            .await
        {
            error!(kind = %kind, error = ?err, "compute: failed to record calculation");
        }

        Ok(pods)
    }

    /// Fetches an alternate view of a result, typically the step-by-step solution.
    pub async fn steps(
        &self,
        input: Option<String>,
        podstate: Option<String>,
    ) -> ComputeResult<Vec<Pod>> {
        let engine = self.engine()?;
        let (input, podstate) = match (non_blank(input), non_blank(podstate)) {
            (Some(input), Some(podstate)) => (input, podstate),
            _ => return Err(ComputeError::MissingStepsFields),
        };

        Self::run_query(engine, &input, Some(podstate)).await
    }

    fn engine(&self) -> ComputeResult<&Arc<E>> {
        self.engine.as_ref().ok_or_else(|| {
            error!("compute: WOLFRAM_APP_ID is not configured");
            ComputeError::MissingAppId
        })
    }

    async fn run_query(
        engine: &Arc<E>,
        input: &str,
        podstate: Option<String>,
    ) -> ComputeResult<Vec<Pod>> {
        info!(input, podstate = ?podstate, "compute: querying math engine");

        let xml = engine.query(input, podstate).await.map_err(|err| {
            error!(input, error = ?err, "compute: math engine request failed");
            ComputeError::Internal(err)
        })?;

        let result = parse_query_result(&xml).map_err(|err| {
            error!(input, error = ?err, "compute: failed to parse math engine response");
            ComputeError::Internal(err)
        })?;

        if let Some(api_error) = result.error.as_deref() {
            warn!(input, api_error, "compute: math engine reported an error");
        }

        if result.pods.is_empty() {
            info!(input, "compute: no pods returned");
            return Err(ComputeError::NoPods);
        }

        info!(input, pod_count = result.pods.len(), "compute: query succeeded");
        Ok(result.pods)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
