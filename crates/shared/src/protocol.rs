use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{Environment, Species};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogResponse {
    pub count: usize,
    pub species: Vec<Species>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub species: Vec<Species>,
    pub location: Environment,
}

pub const VALIDATION_FAILED_REASON: &str = "Validation failed";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub food_chain: Option<Map<String, Value>>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
            food_chain: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            food_chain: None,
        }
    }

    /// Outcome recorded when the checking service could not be reached.
    pub fn request_failed() -> Self {
        Self::invalid(VALIDATION_FAILED_REASON)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryEventKind {
    Click,
    MouseMove,
    SpeciesSelect,
    SpeciesRemove,
    LocationChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    #[serde(rename = "type")]
    pub kind: TelemetryEventKind,
    /// Milliseconds since the unix epoch.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl TelemetryEvent {
    pub fn new(kind: TelemetryEventKind, timestamp: i64, data: Option<Value>) -> Self {
        Self {
            kind,
            timestamp,
            data,
        }
    }

    pub fn species(kind: TelemetryEventKind, timestamp: i64, name: &str) -> Self {
        Self::new(
            kind,
            timestamp,
            Some(serde_json::json!({ "species": name })),
        )
    }

    pub fn location(timestamp: i64, environment: &Environment) -> Self {
        Self::new(
            TelemetryEventKind::LocationChange,
            timestamp,
            serde_json::to_value(environment).ok(),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryAck {
    pub status: String,
    pub logged: usize,
}
