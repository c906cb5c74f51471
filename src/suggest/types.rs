use crate::detector::Parameter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub station_name: String,
    pub area: String,
    pub parameter: Parameter,
    pub value: f64,
    pub threshold: f64,
    pub suggestion: String,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub created_at: DateTime<Utc>,
    pub suggestions: Vec<Suggestion>,
}

/// Why a request was answered without a fresh provider result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Degradation {
    NoCredential,
    Contention,
    Transport(String),
    ProviderRejected(String),
    Malformed(String),
}

impl Degradation {
    pub fn kind(&self) -> &'static str {
        match self {
            Degradation::NoCredential => "no_credential",
            Degradation::Contention => "contention",
            Degradation::Transport(_) => "transport",
            Degradation::ProviderRejected(_) => "provider_rejected",
            Degradation::Malformed(_) => "malformed",
        }
    }
}

/// Where a result came from. Only visible in logs and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    NoViolations,
    Cache,
    Provider,
    Fallback(Degradation),
}

#[derive(Debug, Clone)]
pub struct SuggestionReport {
    pub suggestions: Vec<Suggestion>,
    pub provenance: Provenance,
}
