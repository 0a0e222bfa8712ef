use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::protocol::{CatalogResponse, TelemetryEvent, ValidationRequest, ValidationResult};

pub mod catalog;
pub mod clock;
pub mod error;
pub mod gate;
pub mod http;
pub mod selection;
mod store;
pub mod telemetry;

pub use http::HttpBackend;
pub use store::{EcosystemStore, StoreEvent, StoreSnapshot};

pub const DEFAULT_CLOCK_TICK: Duration = Duration::from_secs(1);
pub const DEFAULT_TELEMETRY_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Source of the selectable species list.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_catalog(&self) -> Result<CatalogResponse>;
}

/// Service that judges whether eight species can live together in an
/// environment.
#[async_trait]
pub trait ConsistencyChecker: Send + Sync {
    async fn check(&self, request: &ValidationRequest) -> Result<ValidationResult>;
}

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn send_batch(&self, events: &[TelemetryEvent]) -> Result<()>;
}

pub struct MissingCatalogSource;

#[async_trait]
impl CatalogSource for MissingCatalogSource {
    async fn fetch_catalog(&self) -> Result<CatalogResponse> {
        Err(anyhow!("species catalog source is unavailable"))
    }
}

pub struct MissingConsistencyChecker;

#[async_trait]
impl ConsistencyChecker for MissingConsistencyChecker {
    async fn check(&self, _request: &ValidationRequest) -> Result<ValidationResult> {
        Err(anyhow!("consistency check service is unavailable"))
    }
}

pub struct MissingTelemetrySink;

#[async_trait]
impl TelemetrySink for MissingTelemetrySink {
    async fn send_batch(&self, _events: &[TelemetryEvent]) -> Result<()> {
        Err(anyhow!("telemetry sink is unavailable"))
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub session_seconds: u32,
    pub clock_tick: Duration,
    pub telemetry_flush_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_seconds: clock::DEFAULT_SESSION_SECONDS,
            clock_tick: DEFAULT_CLOCK_TICK,
            telemetry_flush_interval: DEFAULT_TELEMETRY_FLUSH_INTERVAL,
        }
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
