use super::types::{Reading, Station, StationRecord};
use super::{StationSource, StationStoreError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;

pub struct RemoteStationStore {
    client: Client,
    base_url: String,
}

impl RemoteStationStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self, StationStoreError> {
        let client = Client::builder()
            .user_agent("EnvMonAdvisor/1.0")
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// GET with backoff on 429. `Ok(None)` means the resource does not exist.
    async fn get_with_retry(&self, url: &str) -> Result<Option<Value>, StationStoreError> {
        let mut retry_count = 0;
        let max_retries = 3;
        let mut delay = Duration::from_millis(500);

        loop {
            let response = self.client.get(url).send().await?;

            match response.status() {
                reqwest::StatusCode::OK => {
                    let body = response.text().await?;
                    return Ok(Some(serde_json::from_str(&body)?));
                }
                reqwest::StatusCode::NOT_FOUND | reqwest::StatusCode::NO_CONTENT => return Ok(None),
                reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    if retry_count >= max_retries {
                        return Err(StationStoreError::RateLimited(delay.as_secs()));
                    }

                    tracing::warn!(
                        "Rate limited by station store, retrying in {}ms",
                        delay.as_millis()
                    );

                    sleep(delay).await;
                    delay = delay.mul_f32(2.0 + fastrand::f32() * 0.5);
                    retry_count += 1;
                }
                status => {
                    let error_text = response.text().await.unwrap_or_default();
                    return Err(StationStoreError::ApiError(format!(
                        "HTTP {}: {}",
                        status, error_text
                    )));
                }
            }
        }
    }
}

#[async_trait]
impl StationSource for RemoteStationStore {
    async fn list_stations(&self) -> Result<Vec<Station>, StationStoreError> {
        let url = format!("{}/stations", self.base_url);
        let Some(body) = self.get_with_retry(&url).await? else {
            return Ok(Vec::new());
        };
        let records: Vec<StationRecord> = serde_json::from_value(body)?;
        Ok(records.into_iter().map(Station::from).collect())
    }

    async fn latest_reading(&self, station_id: &str) -> Result<Option<Reading>, StationStoreError> {
        let url = format!(
            "{}/stations/{}/readings/latest",
            self.base_url,
            urlencoding::encode(station_id)
        );
        match self.get_with_retry(&url).await? {
            None | Some(Value::Null) => Ok(None),
            Some(body) => Ok(Some(serde_json::from_value(body)?)),
        }
    }
}
