use serde::{Deserialize, Serialize};

use crate::{FuelError, RunParameters};

/// Lower limit and input step for one form field.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct FieldBound {
    pub min: f64,
    pub step: f64,
}

/// Form-level guards applied by the front ends before calling the model.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct InputBounds {
    pub distance_km: FieldBound,
    pub weight_kg: FieldBound,
    pub speed_kmh: FieldBound,
    pub fuel_interval_km: FieldBound,
    pub fuel_start_km: FieldBound,
    pub fuel_kcal_per_stop: FieldBound,
}

impl Default for InputBounds {
    fn default() -> Self {
        Self {
            distance_km: FieldBound { min: 1.0, step: 0.1 },
            weight_kg: FieldBound { min: 1.0, step: 0.5 },
            speed_kmh: FieldBound { min: 0.1, step: 0.1 },
            fuel_interval_km: FieldBound { min: 0.1, step: 0.1 },
            fuel_start_km: FieldBound { min: 0.0, step: 0.1 },
            fuel_kcal_per_stop: FieldBound { min: 1.0, step: 1.0 },
        }
    }
}

impl InputBounds {
    pub fn check(&self, params: &RunParameters) -> Result<(), FuelError> {
        let fields = [
            ("distance_km", params.distance_km, self.distance_km),
            ("weight_kg", params.weight_kg, self.weight_kg),
            ("speed_kmh", params.speed_kmh, self.speed_kmh),
            ("fuel_interval_km", params.fuel_interval_km, self.fuel_interval_km),
            ("fuel_start_km", params.fuel_start_km, self.fuel_start_km),
            (
                "fuel_kcal_per_stop",
                params.fuel_kcal_per_stop,
                self.fuel_kcal_per_stop,
            ),
        ];
        for (name, value, bound) in fields {
            if value.is_nan() || value < bound.min {
                return Err(FuelError::InvalidParameter(format!(
                    "{name} must be at least {} (got {value})",
                    bound.min
                )));
            }
        }
        Ok(())
    }
}

/// A named parameter set for batch evaluation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub params: RunParameters,
}

impl RunParameters {
    /// Parses a JSON object; absent fields keep the reference defaults.
    pub fn from_json_str(text: &str) -> Result<Self, FuelError> {
        serde_json::from_str(text).map_err(|e| FuelError::Config(e.to_string()))
    }
}

pub fn scenarios_from_json_str(text: &str) -> Result<Vec<Scenario>, FuelError> {
    serde_json::from_str(text).map_err(|e| FuelError::Config(e.to_string()))
}

pub fn load_parameters(path: &std::path::Path) -> Result<RunParameters, FuelError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| FuelError::Io(format!("{}: {e}", path.display())))?;
    RunParameters::from_json_str(&text)
}

pub fn load_scenarios(path: &std::path::Path) -> Result<Vec<Scenario>, FuelError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| FuelError::Io(format!("{}: {e}", path.display())))?;
    scenarios_from_json_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let params = RunParameters::from_json_str(r#"{ "weight_kg": 55.0 }"#).unwrap();
        assert_eq!(params.weight_kg, 55.0);
        assert_eq!(params.distance_km, 42.0);
        assert_eq!(params.fuel_kcal_per_stop, 87.0);
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let err = RunParameters::from_json_str("{ distance_km: }").unwrap_err();
        assert!(matches!(err, FuelError::Config(_)));
    }

    #[test]
    fn test_scenarios_parse() {
        let text = r#"[
            { "name": "marathon" },
            { "name": "half", "params": { "distance_km": 21.1, "fuel_start_km": 7.0 } }
        ]"#;
        let scenarios = scenarios_from_json_str(text).unwrap();
        assert_eq!(scenarios.len(), 2);
        assert_eq!(scenarios[0].params, RunParameters::default());
        assert_eq!(scenarios[1].params.distance_km, 21.1);
        assert_eq!(scenarios[1].params.speed_kmh, 10.0);
    }

    #[test]
    fn test_bounds() {
        let bounds = InputBounds::default();
        assert!(bounds.check(&RunParameters::default()).is_ok());
        let short = RunParameters {
            distance_km: 0.5,
            ..RunParameters::default()
        };
        assert!(bounds.check(&short).is_err());
        let slow = RunParameters {
            speed_kmh: 0.05,
            ..RunParameters::default()
        };
        assert!(bounds.check(&slow).is_err());
        let from_gun = RunParameters {
            fuel_start_km: 0.0,
            ..RunParameters::default()
        };
        assert!(bounds.check(&from_gun).is_ok());
    }
}
