use super::types::Suggestion;
use crate::detector::violations;
use crate::detector::Parameter;
use crate::stations::types::Station;

pub fn remediation(parameter: Parameter) -> &'static str {
    match parameter {
        Parameter::Temperature => "Deploy cooling systems or improve ventilation.",
        Parameter::Emissions => {
            "Reduce vehicle traffic and industrial activity; consider air filtration."
        }
        Parameter::Noise => "Install noise barriers or restrict noisy activities during peak hours.",
    }
}

/// Canned advice for the highest-priority violation of each station.
///
/// Only one record per station is produced even when several parameters are
/// over their limits; see DESIGN.md.
pub fn fallback_suggestions(violating: &[&Station]) -> Vec<Suggestion> {
    violating
        .iter()
        .filter_map(|station| {
            let reading = station.latest_reading.as_ref()?;
            let parameter = violations(reading).into_iter().next()?;
            Some(Suggestion {
                station_name: station.name.clone(),
                area: station.area.clone(),
                parameter,
                value: parameter.value_of(reading),
                threshold: parameter.threshold(),
                suggestion: remediation(parameter).to_string(),
            })
        })
        .collect()
}
