//! reqwest implementation of the three backend collaborators.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use shared::{
    error::ApiException,
    protocol::{CatalogResponse, TelemetryAck, TelemetryEvent, ValidationRequest, ValidationResult},
};
use tracing::debug;
use url::Url;

use crate::{CatalogSource, ConsistencyChecker, TelemetrySink};

const SPECIES_PATH: &str = "api/species";
const VALIDATE_PATH: &str = "api/validate";
const TELEMETRY_PATH: &str = "api/telemetry";

#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url.trim())
            .with_context(|| format!("invalid backend url '{base_url}'"))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("failed to build endpoint url for '{path}'"))
    }
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiException::from_body(status.as_u16(), &body).into())
}

#[async_trait]
impl CatalogSource for HttpBackend {
    async fn fetch_catalog(&self) -> Result<CatalogResponse> {
        let response = self.http.get(self.endpoint(SPECIES_PATH)?).send().await?;
        let catalog = ensure_success(response)
            .await?
            .json::<CatalogResponse>()
            .await
            .context("malformed species catalog response")?;
        Ok(catalog)
    }
}

#[async_trait]
impl ConsistencyChecker for HttpBackend {
    async fn check(&self, request: &ValidationRequest) -> Result<ValidationResult> {
        let response = self
            .http
            .post(self.endpoint(VALIDATE_PATH)?)
            .json(request)
            .send()
            .await?;
        let result = ensure_success(response)
            .await?
            .json::<ValidationResult>()
            .await
            .context("malformed validation response")?;
        Ok(result)
    }
}

#[async_trait]
impl TelemetrySink for HttpBackend {
    async fn send_batch(&self, events: &[TelemetryEvent]) -> Result<()> {
        let response = self
            .http
            .post(self.endpoint(TELEMETRY_PATH)?)
            .json(events)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        if let Ok(ack) = response.json::<TelemetryAck>().await {
            debug!(
                "telemetry: sink acknowledged status={} logged={}",
                ack.status, ack.logged
            );
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
