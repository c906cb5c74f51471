use super::types::{Reading, Station};
use super::{StationSource, StationStoreError};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Latest station snapshot plus a short rolling history per station.
///
/// Cheap to clone; all clones share the same data.
#[derive(Clone)]
pub struct StationBoard {
    snapshot: Arc<RwLock<Vec<Station>>>,
    history: Arc<RwLock<HashMap<String, VecDeque<Reading>>>>,
    history_len: usize,
}

impl StationBoard {
    pub fn new(history_len: usize) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(Vec::new())),
            history: Arc::new(RwLock::new(HashMap::new())),
            history_len: history_len.max(1),
        }
    }

    pub async fn stations(&self) -> Vec<Station> {
        self.snapshot.read().await.clone()
    }

    /// Oldest first. `None` if the station has never been seen.
    pub async fn history(&self, station_id: &str) -> Option<Vec<Reading>> {
        self.history
            .read()
            .await
            .get(station_id)
            .map(|readings| readings.iter().cloned().collect())
    }

    /// Replaces the snapshot and records every new reading. History of
    /// stations missing from the new snapshot is dropped.
    pub async fn publish(&self, stations: Vec<Station>) {
        {
            let mut history = self.history.write().await;
            history.retain(|id, _| stations.iter().any(|station| &station.id == id));
            for station in &stations {
                let readings = history.entry(station.id.clone()).or_default();
                if let Some(reading) = &station.latest_reading {
                    if readings.back().map(|last| last.timestamp) != Some(reading.timestamp) {
                        readings.push_back(reading.clone());
                    }
                    while readings.len() > self.history_len {
                        readings.pop_front();
                    }
                }
            }
        }
        *self.snapshot.write().await = stations;
    }
}

pub struct StationPoller {
    source: Arc<dyn StationSource>,
    board: StationBoard,
}

impl StationPoller {
    pub fn new(source: Arc<dyn StationSource>, board: StationBoard) -> Self {
        Self { source, board }
    }

    /// Fetches every station with its latest reading and publishes the result.
    /// A station whose reading cannot be fetched is published without one.
    pub async fn poll_once(&self) -> Result<usize, StationStoreError> {
        let stations = self.source.list_stations().await?;
        let mut refreshed = Vec::with_capacity(stations.len());

        for station in stations {
            let reading = match self.source.latest_reading(&station.id).await {
                Ok(reading) => reading,
                Err(e) => {
                    tracing::warn!(station = %station.id, "Failed to fetch latest reading: {}", e);
                    None
                }
            };
            refreshed.push(station.with_reading(reading));
        }

        let count = refreshed.len();
        self.board.publish(refreshed).await;
        Ok(count)
    }

    pub fn spawn(self, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.poll_once().await {
                    Ok(count) => tracing::debug!(stations = count, "Polled station store"),
                    Err(e) => tracing::error!("Station poll failed, keeping previous snapshot: {}", e),
                }
            }
        })
    }
}
