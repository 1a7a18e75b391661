//! Race time and energy-reserve model for planning fueling stops.
//!
//! The model is a coarse one: a fixed glycogen store proportional to
//! body weight, a linear cost of 1 kcal per kg per km, and a fixed top-up at
//! every fueling stop. Everything here is pure arithmetic over plain values.

use std::fmt;

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod config;
pub mod report;

pub use config::{load_parameters, load_scenarios, InputBounds, Scenario};

/// Muscle glycogen energy stored per kg of body weight.
pub const GLYCOGEN_KCAL_PER_KG: f64 = 24.0;
/// Liver glycogen allowance added on top of the muscle store.
pub const LIVER_GLYCOGEN_KCAL: f64 = 400.0;
/// Running cost per kg of body weight per km.
pub const COST_KCAL_PER_KG_KM: f64 = 1.0;
/// Default curve resolution.
pub const DEFAULT_SAMPLES: usize = 500;

/// Upper limit on the number of fueling stops one race may schedule.
pub const MAX_FUELING_STOPS: usize = 100_000;

// Quotients this close to an integer are treated as that integer. The
// relative term is capped so large quotients still floor.
const SNAP_TOLERANCE: f64 = 1e-9;
const MAX_SNAP: f64 = 1e-6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FuelError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("failed to parse configuration: {0}")]
    Config(String),
    #[error("failed to read configuration: {0}")]
    Io(String),
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunParameters {
    pub distance_km: f64,
    pub weight_kg: f64,
    pub speed_kmh: f64,
    pub fuel_interval_km: f64,
    pub fuel_start_km: f64,
    pub fuel_kcal_per_stop: f64,
}

impl Default for RunParameters {
    fn default() -> Self {
        Self {
            distance_km: 42.0,
            weight_kg: 70.0,
            speed_kmh: 10.0,
            fuel_interval_km: 4.0,
            fuel_start_km: 5.0,
            fuel_kcal_per_stop: 87.0,
        }
    }
}

impl RunParameters {
    /// Rejects inputs the model cannot evaluate to finite values.
    pub fn validate(&self) -> Result<(), FuelError> {
        let fields = [
            ("distance_km", self.distance_km),
            ("weight_kg", self.weight_kg),
            ("speed_kmh", self.speed_kmh),
            ("fuel_interval_km", self.fuel_interval_km),
            ("fuel_start_km", self.fuel_start_km),
            ("fuel_kcal_per_stop", self.fuel_kcal_per_stop),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(FuelError::InvalidParameter(format!(
                    "{name} must be finite (got {value})"
                )));
            }
        }
        if self.distance_km <= 0.0 {
            return Err(FuelError::InvalidParameter(format!(
                "distance_km must be positive (got {})",
                self.distance_km
            )));
        }
        if self.speed_kmh <= 0.0 {
            return Err(FuelError::InvalidParameter(format!(
                "speed_kmh must be positive (got {})",
                self.speed_kmh
            )));
        }
        if self.fuel_interval_km <= 0.0 {
            return Err(FuelError::InvalidParameter(format!(
                "fuel_interval_km must be positive (got {})",
                self.fuel_interval_km
            )));
        }
        if self.fuel_start_km < self.distance_km {
            let scheduled = snapped_quotient(
                self.distance_km - self.fuel_start_km,
                self.fuel_interval_km,
            )
            .ceil();
            if scheduled > MAX_FUELING_STOPS as f64 {
                return Err(FuelError::InvalidParameter(format!(
                    "fueling plan schedules {scheduled} stops, more than {MAX_FUELING_STOPS}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelOptions {
    pub samples: usize,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            samples: DEFAULT_SAMPLES,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct EnergyPoint {
    pub distance_km: f64,
    pub energy_kcal: f64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct FuelingStop {
    /// 1-based position in the fueling schedule.
    pub index: usize,
    pub distance_km: f64,
    pub energy_kcal: f64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RaceTime {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl RaceTime {
    /// Splits a duration in hours into whole hours, minutes and seconds,
    /// truncating any fractional second.
    pub fn from_hours(time_hours: f64) -> Self {
        let total_seconds = if time_hours.is_finite() && time_hours > 0.0 {
            (time_hours * 3600.0).trunc() as u64
        } else {
            0
        };
        Self {
            hours: total_seconds / 3600,
            minutes: (total_seconds % 3600) / 60,
            seconds: total_seconds % 60,
        }
    }

    pub fn total_seconds(&self) -> u64 {
        self.hours * 3600 + self.minutes * 60 + self.seconds
    }
}

impl fmt::Display for RaceTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.hours, self.minutes, self.seconds
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RaceSummary {
    pub formatted_time: String,
    pub race_time: RaceTime,
    pub time_hours: f64,
    pub initial_energy_kcal: f64,
    pub total_expenditure_kcal: f64,
    pub final_energy_kcal: f64,
    pub stop_count: usize,
    pub total_fuel_added_kcal: f64,
    /// First distance at which the reserve reaches zero, if within the race.
    pub depletion_km: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RaceModel {
    pub params: RunParameters,
    pub summary: RaceSummary,
    pub curve: Vec<EnergyPoint>,
    pub stops: Vec<FuelingStop>,
}

pub fn initial_energy(params: &RunParameters) -> f64 {
    params.weight_kg * GLYCOGEN_KCAL_PER_KG + LIVER_GLYCOGEN_KCAL
}

pub fn total_expenditure(params: &RunParameters) -> f64 {
    params.weight_kg * COST_KCAL_PER_KG_KM * params.distance_km
}

pub fn race_time(params: &RunParameters) -> RaceTime {
    RaceTime::from_hours(params.distance_km / params.speed_kmh)
}

/// Number of fueling stops that fall strictly before the finish line.
fn stops_before_finish(params: &RunParameters) -> usize {
    if params.fuel_start_km >= params.distance_km {
        return 0;
    }
    let steps = snapped_quotient(
        params.distance_km - params.fuel_start_km,
        params.fuel_interval_km,
    );
    steps.ceil() as usize
}

/// Number of fueling stops taken at or before `distance_km`.
///
/// Stops are counted from `fuel_start_km` inclusive, one every
/// `fuel_interval_km`. A stop landing exactly on (or beyond) the finish line
/// is never taken, so the count at the finish matches the stop list.
pub fn stop_count_at(params: &RunParameters, distance_km: f64) -> usize {
    if distance_km < params.fuel_start_km {
        return 0;
    }
    let steps = snapped_quotient(distance_km - params.fuel_start_km, params.fuel_interval_km);
    let reached = steps.floor() as usize + 1;
    reached.min(stops_before_finish(params))
}

/// Energy reserve (kcal) at `distance_km` into the race.
pub fn energy_at(params: &RunParameters, distance_km: f64) -> f64 {
    energy_with_stops(params, stop_count_at(params, distance_km), distance_km)
}

fn energy_with_stops(params: &RunParameters, stops: usize, distance_km: f64) -> f64 {
    initial_energy(params) + stops as f64 * params.fuel_kcal_per_stop
        - params.weight_kg * COST_KCAL_PER_KG_KM * distance_km
}

fn snapped_quotient(numerator: f64, denominator: f64) -> f64 {
    let q = numerator / denominator;
    let nearest = q.round();
    let tolerance = (SNAP_TOLERANCE * nearest.abs().max(1.0)).min(MAX_SNAP);
    if (q - nearest).abs() <= tolerance {
        nearest
    } else {
        q
    }
}

/// Evenly spaced distances over `[0, distance_km]`, both ends exact.
pub fn sample_distances(distance_km: f64, samples: usize) -> Array1<f64> {
    if samples <= 1 {
        return Array1::from_vec(vec![distance_km]);
    }
    let mut distances = Array1::linspace(0.0, distance_km, samples);
    distances[0] = 0.0;
    distances[samples - 1] = distance_km;
    distances
}

fn fueling_stops(params: &RunParameters) -> Vec<FuelingStop> {
    let count = stops_before_finish(params);
    let mut stops = Vec::with_capacity(count);
    for i in 0..count {
        let index = i + 1;
        let distance_km = params.fuel_start_km + i as f64 * params.fuel_interval_km;
        stops.push(FuelingStop {
            index,
            distance_km,
            energy_kcal: energy_with_stops(params, index, distance_km),
        });
    }
    stops
}

fn energy_curve(params: &RunParameters, samples: usize) -> Vec<EnergyPoint> {
    let distances = sample_distances(params.distance_km, samples);
    let energies = distances.mapv(|d| energy_at(params, d));
    distances
        .iter()
        .zip(energies.iter())
        .map(|(&distance_km, &energy_kcal)| EnergyPoint {
            distance_km,
            energy_kcal,
        })
        .collect()
}

/// First distance in `[0, distance_km]` where the reserve reaches zero.
fn depletion_point(params: &RunParameters, stops: &[FuelingStop]) -> Option<f64> {
    let burn_per_km = params.weight_kg * COST_KCAL_PER_KG_KM;
    let mut segment_start = 0.0;
    let mut segment_energy = energy_at(params, 0.0);
    let boundaries = stops
        .iter()
        .filter(|s| s.distance_km > 0.0)
        .map(|s| (s.distance_km, Some(s.energy_kcal)))
        .chain(std::iter::once((params.distance_km, None)));

    for (segment_end, next_energy) in boundaries {
        if segment_energy <= 0.0 {
            return Some(segment_start);
        }
        if burn_per_km > 0.0 {
            let zero_at = segment_start + segment_energy / burn_per_km;
            if zero_at <= segment_end {
                return Some(zero_at);
            }
        }
        match next_energy {
            Some(energy) => {
                segment_start = segment_end;
                segment_energy = energy;
            }
            None => break,
        }
    }
    None
}

/// Computes the race model with the default curve resolution.
pub fn compute_race_model(params: &RunParameters) -> Result<RaceModel, FuelError> {
    compute_race_model_with(params, &ModelOptions::default())
}

/// Computes race time, summary energies, the sampled energy curve and the
/// fueling stop list for one set of parameters.
pub fn compute_race_model_with(
    params: &RunParameters,
    options: &ModelOptions,
) -> Result<RaceModel, FuelError> {
    params.validate()?;
    if options.samples < 2 {
        return Err(FuelError::InvalidParameter(format!(
            "samples must be at least 2 (got {})",
            options.samples
        )));
    }

    let time_hours = params.distance_km / params.speed_kmh;
    let race_time = RaceTime::from_hours(time_hours);
    let initial = initial_energy(params);
    let expenditure = total_expenditure(params);

    let stops = fueling_stops(params);
    let stop_count = stops.len();
    let total_fuel_added = stop_count as f64 * params.fuel_kcal_per_stop;
    let final_energy = initial + total_fuel_added - expenditure;
    let curve = energy_curve(params, options.samples);
    let depletion_km = depletion_point(params, &stops);

    Ok(RaceModel {
        params: *params,
        summary: RaceSummary {
            formatted_time: race_time.to_string(),
            race_time,
            time_hours,
            initial_energy_kcal: initial,
            total_expenditure_kcal: expenditure,
            final_energy_kcal: final_energy,
            stop_count,
            total_fuel_added_kcal: total_fuel_added,
            depletion_km,
        },
        curve,
        stops,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_reference_scenario() {
        let model = compute_race_model(&RunParameters::default()).unwrap();
        let s = &model.summary;
        assert_eq!(s.formatted_time, "04:12:00");
        assert!(approx(s.initial_energy_kcal, 2080.0));
        assert!(approx(s.total_expenditure_kcal, 2940.0));
        assert_eq!(s.stop_count, 10);
        assert!(approx(s.total_fuel_added_kcal, 870.0));
        assert!(approx(s.final_energy_kcal, 10.0));
        assert_eq!(model.stops.len(), 10);
        assert!(approx(model.stops[0].distance_km, 5.0));
        assert!(approx(model.stops[9].distance_km, 41.0));
        assert_eq!(s.depletion_km, None);
    }

    #[test]
    fn test_final_energy_matches_last_sample() {
        let params = RunParameters {
            distance_km: 21.1,
            weight_kg: 62.5,
            speed_kmh: 12.3,
            fuel_interval_km: 3.3,
            fuel_start_km: 2.0,
            fuel_kcal_per_stop: 100.0,
        };
        let model = compute_race_model(&params).unwrap();
        let last = model.curve.last().unwrap();
        assert_eq!(last.distance_km, params.distance_km);
        assert!(approx(last.energy_kcal, model.summary.final_energy_kcal));
        let expected = initial_energy(&params)
            + stop_count_at(&params, params.distance_km) as f64 * params.fuel_kcal_per_stop
            - params.weight_kg * params.distance_km;
        assert!(approx(model.summary.final_energy_kcal, expected));
    }

    #[test]
    fn test_curve_shape_and_resolution() {
        let options = ModelOptions { samples: 37 };
        let model = compute_race_model_with(&RunParameters::default(), &options).unwrap();
        assert_eq!(model.curve.len(), 37);
        assert_eq!(model.curve[0].distance_km, 0.0);
        assert!(approx(model.curve[0].energy_kcal, 2080.0));
        for pair in model.curve.windows(2) {
            assert!(pair[1].distance_km > pair[0].distance_km);
        }
    }

    #[test]
    fn test_stop_count_step_function() {
        let params = RunParameters::default();
        assert_eq!(stop_count_at(&params, 0.0), 0);
        assert_eq!(stop_count_at(&params, 4.999), 0);
        assert_eq!(stop_count_at(&params, 5.0), 1);
        assert_eq!(stop_count_at(&params, 8.999), 1);
        assert_eq!(stop_count_at(&params, 9.0), 2);
        assert_eq!(stop_count_at(&params, 42.0), 10);
    }

    #[test]
    fn test_energy_slope_and_jumps() {
        let params = RunParameters::default();
        let a = energy_at(&params, 6.0);
        let b = energy_at(&params, 7.5);
        assert!(b < a);
        assert!(approx(a - b, params.weight_kg * 1.5));

        let eps = 1e-7;
        let before = energy_at(&params, 9.0 - eps);
        let after = energy_at(&params, 9.0);
        assert!(approx(
            after - before,
            params.fuel_kcal_per_stop - params.weight_kg * eps
        ));
    }

    #[test]
    fn test_stop_energy_uses_own_index() {
        let params = RunParameters::default();
        let model = compute_race_model(&params).unwrap();
        for stop in &model.stops {
            let expected = initial_energy(&params) + stop.index as f64 * params.fuel_kcal_per_stop
                - params.weight_kg * stop.distance_km;
            assert!(approx(stop.energy_kcal, expected));
        }
    }

    #[test]
    fn test_fractional_interval_does_not_drift() {
        let params = RunParameters {
            distance_km: 1.0,
            fuel_interval_km: 0.1,
            fuel_start_km: 0.0,
            ..RunParameters::default()
        };
        let model = compute_race_model(&params).unwrap();
        assert_eq!(model.stops.len(), 10);
        assert_eq!(stop_count_at(&params, 0.3), 4);
        assert_eq!(model.summary.stop_count, 10);
    }

    #[test]
    fn test_stop_on_finish_line_is_not_taken() {
        let params = RunParameters {
            distance_km: 41.0,
            ..RunParameters::default()
        };
        let model = compute_race_model(&params).unwrap();
        assert_eq!(model.stops.len(), 9);
        assert_eq!(model.summary.stop_count, 9);
        let last = model.curve.last().unwrap();
        assert!(approx(last.energy_kcal, model.summary.final_energy_kcal));
    }

    #[test]
    fn test_no_stops_when_fueling_starts_after_finish() {
        for start in [42.0, 50.0] {
            let params = RunParameters {
                fuel_start_km: start,
                ..RunParameters::default()
            };
            let model = compute_race_model(&params).unwrap();
            assert!(model.stops.is_empty());
            assert_eq!(model.summary.stop_count, 0);
            assert_eq!(model.summary.total_fuel_added_kcal, 0.0);
            assert!(approx(model.summary.final_energy_kcal, 2080.0 - 2940.0));
        }
    }

    #[test]
    fn test_depletion_point() {
        let params = RunParameters {
            fuel_start_km: 50.0,
            ..RunParameters::default()
        };
        let model = compute_race_model(&params).unwrap();
        let depletion = model.summary.depletion_km.unwrap();
        assert!(approx(depletion, 2080.0 / 70.0));
        assert!(approx(energy_at(&params, depletion), 0.0));
        for point in model.curve.iter().filter(|p| p.distance_km < depletion) {
            assert!(point.energy_kcal > 0.0);
        }
    }

    #[test]
    fn test_race_time_truncates_and_keeps_hours() {
        assert_eq!(RaceTime::from_hours(4.2).to_string(), "04:12:00");
        assert_eq!(RaceTime::from_hours(1.0 / 7200.0 * 3.0 - 1e-9).to_string(), "00:00:01");
        assert_eq!(RaceTime::from_hours(0.9 / 3600.0).to_string(), "00:00:00");
        assert_eq!(RaceTime::from_hours(59.7 / 3600.0).to_string(), "00:00:59");
        assert_eq!(RaceTime::from_hours(59.7 / 3600.0).total_seconds(), 59);
        assert_eq!(RaceTime::from_hours(4.2).total_seconds(), 4 * 3600 + 12 * 60);
        assert_eq!(RaceTime::from_hours(30.5).to_string(), "30:30:00");
        assert_eq!(RaceTime::from_hours(125.0).hours, 125);
    }

    #[test]
    fn test_invalid_parameters_are_rejected() {
        let bad = [
            RunParameters { speed_kmh: 0.0, ..RunParameters::default() },
            RunParameters { speed_kmh: -3.0, ..RunParameters::default() },
            RunParameters { fuel_interval_km: 0.0, ..RunParameters::default() },
            RunParameters { fuel_interval_km: -1.0, ..RunParameters::default() },
            RunParameters { distance_km: 0.0, ..RunParameters::default() },
            RunParameters { weight_kg: f64::NAN, ..RunParameters::default() },
        ];
        for params in bad {
            assert!(matches!(
                compute_race_model(&params),
                Err(FuelError::InvalidParameter(_))
            ));
        }
        let too_coarse = ModelOptions { samples: 1 };
        assert!(compute_race_model_with(&RunParameters::default(), &too_coarse).is_err());
    }

    #[test]
    fn test_oversized_fueling_plan_is_rejected() {
        let tiny_interval = RunParameters {
            fuel_interval_km: 1e-300,
            ..RunParameters::default()
        };
        assert!(matches!(
            compute_race_model(&tiny_interval),
            Err(FuelError::InvalidParameter(_))
        ));
        let endless = RunParameters {
            distance_km: 1e12,
            ..RunParameters::default()
        };
        assert!(compute_race_model(&endless).is_err());

        let at_limit = RunParameters {
            distance_km: 5.0 + MAX_FUELING_STOPS as f64,
            fuel_interval_km: 1.0,
            ..RunParameters::default()
        };
        let model = compute_race_model_with(&at_limit, &ModelOptions { samples: 2 }).unwrap();
        assert_eq!(model.stops.len(), MAX_FUELING_STOPS);
    }

    #[test]
    fn test_large_quotients_still_floor() {
        assert_eq!(snapped_quotient(1_000_000_000.4, 1.0).floor(), 1_000_000_000.0);
        assert_eq!(snapped_quotient(2_000_000_000.6, 1.0).floor(), 2_000_000_000.0);
        assert_eq!(snapped_quotient(0.3, 0.1), 3.0);
    }
}
