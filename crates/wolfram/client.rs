use anyhow::{Context, Result};
use tracing::debug;

pub const DEFAULT_API_URL: &str = "https://api.wolframalpha.com/v2/query";

/// Thin client for the Wolfram|Alpha v2 full results API.
pub struct WolframClient {
    http: reqwest::Client,
    api_url: String,
    app_id: String,
}

impl WolframClient {
    pub fn new(api_url: String, app_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url,
            app_id,
        }
    }

    /// Runs a query and returns the raw XML body. `podstate` selects an
    /// alternate pod view such as the step-by-step solution.
    pub async fn query(&self, input: &str, podstate: Option<&str>) -> Result<String> {
        let mut params = vec![
            ("appid", self.app_id.as_str()),
            ("input", input),
            ("output", "XML"),
        ];
        if let Some(podstate) = podstate {
            params.push(("podstate", podstate));
        }

        debug!(input, ?podstate, "wolfram: sending query");

        let resp = self
            .http
            .get(&self.api_url)
            .query(&params)
            .send()
            .await
            .context("wolfram query request failed")?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .context("failed to read wolfram response body")?;

        debug!(status = %status, bytes = body.len(), "wolfram: response received");

        Ok(body)
    }
}
