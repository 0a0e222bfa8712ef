use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to load species catalog: {source}")]
pub struct CatalogLoadError {
    #[source]
    pub source: anyhow::Error,
}

#[derive(Debug, Error)]
#[error("consistency check request failed: {source}")]
pub struct ValidationRequestError {
    #[source]
    pub source: anyhow::Error,
}

#[derive(Debug, Error)]
#[error("failed to send telemetry batch of {batch_len} events: {source}")]
pub struct TelemetrySendError {
    pub batch_len: usize,
    #[source]
    pub source: anyhow::Error,
}

impl From<anyhow::Error> for CatalogLoadError {
    fn from(source: anyhow::Error) -> Self {
        Self { source }
    }
}

impl From<anyhow::Error> for ValidationRequestError {
    fn from(source: anyhow::Error) -> Self {
        Self { source }
    }
}
