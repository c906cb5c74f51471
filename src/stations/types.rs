use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub temperature: f64,
    /// PM2.5 concentration.
    pub emissions: f64,
    pub noise: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    pub id: String,
    pub name: String,
    pub area: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub latest_reading: Option<Reading>,
}

impl Station {
    pub fn with_reading(mut self, reading: Option<Reading>) -> Self {
        self.latest_reading = reading;
        self
    }
}

/// Wire shape of a station as listed by the data store.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub area: String,
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lng", alias = "lon")]
    pub longitude: f64,
}

impl From<StationRecord> for Station {
    fn from(record: StationRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            area: record.area,
            latitude: record.latitude,
            longitude: record.longitude,
            latest_reading: None,
        }
    }
}
