//! Text shared by the CLI and web front ends.

use crate::{RaceModel, RunParameters};

pub fn summary_lines(model: &RaceModel) -> Vec<String> {
    let p = &model.params;
    let s = &model.summary;
    let mut lines = vec![
        format!("Race Distance: {:.1} km", p.distance_km),
        format!("Runner Weight: {:.1} kg", p.weight_kg),
        format!("Speed: {:.1} km/h", p.speed_kmh),
        format!("Estimated Race Time: {}", s.formatted_time),
        format!("Initial Energy Reserve: {:.0} kcal", s.initial_energy_kcal),
        format!("Total Energy Expenditure: {:.0} kcal", s.total_expenditure_kcal),
        format!("Final Energy Reserve: {:.0} kcal", s.final_energy_kcal),
    ];
    if let Some(km) = s.depletion_km {
        lines.push(format!("Energy Reserve Depleted at: {km:.1} km"));
    }
    lines
}

pub fn stops_text(model: &RaceModel) -> String {
    if model.stops.is_empty() {
        return "No fueling stops planned based on the provided strategy.".to_string();
    }
    let listing = model
        .stops
        .iter()
        .map(|stop| format!("{:.1} km", stop.distance_km))
        .collect::<Vec<_>>()
        .join(", ");
    let s = &model.summary;
    format!(
        "Fueling Stops at: {listing}\nTotal Fuel Added: {:.0} kcal (from {} stops)",
        s.total_fuel_added_kcal, s.stop_count
    )
}

pub fn formula_lines() -> [&'static str; 3] {
    [
        "Initial Energy = 24 x Weight (kg) + 400 kcal",
        "Energy Reserve(d) = Initial Energy + (Fueling Stops Up To d x Fuel kcal) - (Weight (kg) x d)",
        "Time = Distance (km) / Speed (km/h)",
    ]
}

pub fn strategy_notes(params: &RunParameters) -> Vec<String> {
    let muscle = params.weight_kg * crate::GLYCOGEN_KCAL_PER_KG;
    vec![
        format!(
            "Glycogen estimate: ~24 kcal/kg from muscle plus ~400 kcal from the liver. \
             For a {:.0} kg runner that is about {:.0} kcal + 400 kcal. Actual stores vary \
             with training, diet and muscle mass.",
            params.weight_kg, muscle
        ),
        "Energy expenditure: ~1 kcal per kg per km is a common starting point; running \
         economy, terrain, pace and biomechanics all shift the real cost."
            .to_string(),
        format!(
            "Fueling strategy: starting at {:.1} km and then every {:.1} km, each stop adding \
             {:.0} kcal, is a simplified way to top up during a race. Adjust timing and \
             carbohydrate type to your gut tolerance, pace and conditions.",
            params.fuel_start_km, params.fuel_interval_km, params.fuel_kcal_per_stop
        ),
        "These are ball-park figures. Use them for a first plan and refine it from how you \
         feel in training."
            .to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute_race_model;

    #[test]
    fn test_summary_and_stops_for_reference_run() {
        let model = compute_race_model(&RunParameters::default()).unwrap();
        let lines = summary_lines(&model);
        assert!(lines.contains(&"Estimated Race Time: 04:12:00".to_string()));
        assert!(lines.contains(&"Final Energy Reserve: 10 kcal".to_string()));
        let text = stops_text(&model);
        assert!(text.starts_with("Fueling Stops at: 5.0 km, 9.0 km"));
        assert!(text.ends_with("Total Fuel Added: 870 kcal (from 10 stops)"));
    }

    #[test]
    fn test_stops_text_without_stops() {
        let params = RunParameters {
            fuel_start_km: 60.0,
            ..RunParameters::default()
        };
        let model = compute_race_model(&params).unwrap();
        assert_eq!(
            stops_text(&model),
            "No fueling stops planned based on the provided strategy."
        );
        assert!(summary_lines(&model)
            .iter()
            .any(|l| l.starts_with("Energy Reserve Depleted at:")));
    }

    #[test]
    fn test_notes_mention_schedule() {
        let notes = strategy_notes(&RunParameters::default());
        assert!(notes[0].contains("1680 kcal"));
        assert!(notes[2].contains("5.0 km"));
        assert!(notes[2].contains("4.0 km"));
    }
}
