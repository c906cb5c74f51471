use super::types::{Reading, Station};
use super::{StationSource, StationStoreError};
use async_trait::async_trait;
use chrono::{Timelike, Utc};

/// Stand-in data store used when no `STATION_STORE_URL` is configured.
pub struct MockStationStore {
    stations: Vec<Station>,
}

impl MockStationStore {
    pub fn new() -> Self {
        let roster = [
            ("st-01", "Central Plaza", "Downtown", -6.1754, 106.8272),
            ("st-02", "Harbour Gate", "Port District", -6.1045, 106.8805),
            ("st-03", "Ring Road Interchange", "Industrial Zone", -6.2297, 106.8295),
            ("st-04", "Riverside Park", "Green Belt", -6.2615, 106.7810),
            ("st-05", "Airport Perimeter", "North Airfield", -6.1256, 106.6559),
        ];

        let stations = roster
            .into_iter()
            .map(|(id, name, area, latitude, longitude)| Station {
                id: id.to_string(),
                name: name.to_string(),
                area: area.to_string(),
                latitude,
                longitude,
                latest_reading: None,
            })
            .collect();

        Self { stations }
    }
}

impl Default for MockStationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StationSource for MockStationStore {
    async fn list_stations(&self) -> Result<Vec<Station>, StationStoreError> {
        Ok(self.stations.clone())
    }

    async fn latest_reading(&self, station_id: &str) -> Result<Option<Reading>, StationStoreError> {
        let Some(index) = self.stations.iter().position(|s| s.id == station_id) else {
            return Ok(None);
        };
        Ok(Some(generate_mock_reading(index)))
    }
}

/// Realistic readings with a diurnal temperature curve. Roughly one reading
/// in ten spikes over a threshold so the advisor has something to do.
pub fn generate_mock_reading(station_index: usize) -> Reading {
    let now = Utc::now();
    let hour_of_day = now.hour() as f64 + now.minute() as f64 / 60.0;

    let temp_phase = (hour_of_day - 9.0) * std::f64::consts::PI / 12.0;
    let mut temperature = 27.0 + 4.0 * temp_phase.sin() + 2.0 * (fastrand::f64() - 0.5);
    // Industrial and port stations run dirtier and louder.
    let (mut emissions, mut noise) = match station_index {
        1 | 2 => (90.0 + 50.0 * fastrand::f64(), 65.0 + 15.0 * fastrand::f64()),
        _ => (35.0 + 60.0 * fastrand::f64(), 45.0 + 20.0 * fastrand::f64()),
    };

    if fastrand::f64() < 0.1 {
        match fastrand::usize(0..3) {
            0 => temperature += 6.0,
            1 => emissions += 80.0,
            _ => noise += 25.0,
        }
    }

    Reading {
        temperature,
        emissions,
        noise,
        timestamp: now,
    }
}
