pub mod mock;
pub mod poller;
pub mod remote;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;
use types::{Reading, Station};

#[derive(Error, Debug)]
pub enum StationStoreError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),
    #[error("Rate limited, retry after: {0}s")]
    RateLimited(u64),
    #[error("API error: {0}")]
    ApiError(String),
}

/// The sensor data store. Stations come back without readings attached.
#[async_trait]
pub trait StationSource: Send + Sync {
    async fn list_stations(&self) -> Result<Vec<Station>, StationStoreError>;
    async fn latest_reading(&self, station_id: &str) -> Result<Option<Reading>, StationStoreError>;
}
