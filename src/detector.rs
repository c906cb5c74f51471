use crate::stations::types::{Reading, Station};
use serde::{Deserialize, Serialize};

pub const TEMPERATURE_THRESHOLD_C: f64 = 30.0;
pub const EMISSIONS_THRESHOLD_PPM: f64 = 150.0;
pub const NOISE_THRESHOLD_DB: f64 = 85.0;

/// A monitored parameter. Declaration order is the reporting priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Parameter {
    Temperature,
    #[serde(rename = "PM2.5 Emissions")]
    Emissions,
    Noise,
}

impl Parameter {
    pub const ALL: [Parameter; 3] = [Parameter::Temperature, Parameter::Emissions, Parameter::Noise];

    pub fn label(self) -> &'static str {
        match self {
            Parameter::Temperature => "Temperature",
            Parameter::Emissions => "PM2.5 Emissions",
            Parameter::Noise => "Noise",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Parameter::Temperature => "°C",
            Parameter::Emissions => "ppm",
            Parameter::Noise => "dB",
        }
    }

    pub fn threshold(self) -> f64 {
        match self {
            Parameter::Temperature => TEMPERATURE_THRESHOLD_C,
            Parameter::Emissions => EMISSIONS_THRESHOLD_PPM,
            Parameter::Noise => NOISE_THRESHOLD_DB,
        }
    }

    pub fn value_of(self, reading: &Reading) -> f64 {
        match self {
            Parameter::Temperature => reading.temperature,
            Parameter::Emissions => reading.emissions,
            Parameter::Noise => reading.noise,
        }
    }

    pub fn is_violated_by(self, reading: &Reading) -> bool {
        self.value_of(reading) > self.threshold()
    }
}

impl std::fmt::Display for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Parameters of `reading` above their threshold, highest priority first.
pub fn violations(reading: &Reading) -> Vec<Parameter> {
    Parameter::ALL
        .into_iter()
        .filter(|p| p.is_violated_by(reading))
        .collect()
}

pub fn is_problematic(station: &Station) -> bool {
    station
        .latest_reading
        .as_ref()
        .is_some_and(|r| Parameter::ALL.iter().any(|p| p.is_violated_by(r)))
}

/// Stations with a reading that breaks at least one threshold, in input order.
/// Stations without a reading are never reported.
pub fn detect(stations: &[Station]) -> Vec<&Station> {
    stations.iter().filter(|s| is_problematic(s)).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;

    pub(crate) fn station(name: &str, area: &str, reading: Option<(f64, f64, f64)>) -> Station {
        Station {
            id: name.to_lowercase(),
            name: name.to_string(),
            area: area.to_string(),
            latitude: -6.2,
            longitude: 106.8,
            latest_reading: reading.map(|(temperature, emissions, noise)| Reading {
                temperature,
                emissions,
                noise,
                timestamp: Utc::now(),
            }),
        }
    }

    #[test]
    fn test_detect_keeps_only_violating_stations_in_order() {
        let stations = vec![
            station("S1", "A", Some((32.0, 100.0, 50.0))),
            station("S2", "A", Some((25.0, 100.0, 50.0))),
            station("S3", "B", Some((20.0, 100.0, 90.0))),
            station("S4", "B", Some((20.0, 151.0, 40.0))),
        ];

        let names: Vec<_> = detect(&stations).iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["S1", "S3", "S4"]);
    }

    #[test]
    fn test_station_without_reading_is_not_a_violation() {
        let stations = vec![station("S1", "A", None)];
        assert!(detect(&stations).is_empty());
    }

    #[test]
    fn test_threshold_is_strictly_greater_than() {
        let stations = vec![station("Edge", "A", Some((30.0, 150.0, 85.0)))];
        assert!(detect(&stations).is_empty());
    }

    #[test]
    fn test_violations_are_priority_ordered() {
        let s = station("S", "A", Some((35.0, 200.0, 90.0)));
        let reading = s.latest_reading.as_ref().unwrap();
        assert_eq!(
            violations(reading),
            vec![Parameter::Temperature, Parameter::Emissions, Parameter::Noise]
        );
    }

    #[test]
    fn test_parameter_labels_serialize_as_display_names() {
        let json = serde_json::to_string(&Parameter::Emissions).unwrap();
        assert_eq!(json, "\"PM2.5 Emissions\"");
        let back: Parameter = serde_json::from_str("\"Noise\"").unwrap();
        assert_eq!(back, Parameter::Noise);
    }
}
