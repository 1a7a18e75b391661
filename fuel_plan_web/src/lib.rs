use leptos::*;
use wasm_bindgen::JsCast;
use web_sys::HtmlInputElement;

use fuel_plan::report::{formula_lines, stops_text, strategy_notes, summary_lines};
use fuel_plan::{compute_race_model, InputBounds, RaceModel, RunParameters};

#[cfg(feature = "chart_plotly")]
use wasm_bindgen::JsValue;

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
const APP_COMMIT: &str = env!("FUEL_PLAN_COMMIT");

/// Applies the form guards, then runs the model. Errors become the status
/// message shown in place of the results.
fn evaluate(params: &RunParameters) -> Result<RaceModel, String> {
    InputBounds::default()
        .check(params)
        .and_then(|_| compute_race_model(params))
        .map_err(|err| err.to_string())
}

fn input_number(ev: &leptos::ev::Event) -> Option<f64> {
    let input = ev.target()?.dyn_into::<HtmlInputElement>().ok()?;
    input.value().trim().parse::<f64>().ok()
}

fn curve_csv(model: &RaceModel) -> String {
    let mut csv = String::from("distance_km,energy_kcal\n");
    for p in &model.curve {
        csv.push_str(&format!("{:.4},{:.3}\n", p.distance_km, p.energy_kcal));
    }
    csv
}

#[cfg(feature = "chart_plotly")]
fn to_js_value(value: &serde_json::Value) -> JsValue {
    use serde::Serialize;
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .unwrap_or(JsValue::NULL)
}

#[cfg(feature = "chart_plotly")]
fn plot_xy(div_id: &str, traces: &serde_json::Value, layout: &serde_json::Value) {
    let Some(div) = web_sys::window()
        .and_then(|w| w.document())
        .and_then(|d| d.get_element_by_id(div_id))
    else {
        return;
    };
    let plotly = js_sys::Reflect::get(&js_sys::global(), &JsValue::from_str("Plotly"))
        .unwrap_or(JsValue::UNDEFINED);
    let plotly_fn = |name: &str| {
        js_sys::Reflect::get(&plotly, &JsValue::from_str(name))
            .ok()
            .filter(JsValue::is_function)
    };
    if let Some(func) = plotly_fn("react")
        .or_else(|| plotly_fn("newPlot"))
        .and_then(|v| v.dyn_into::<js_sys::Function>().ok())
    {
        let _ = func.call3(
            &JsValue::NULL,
            &JsValue::from(div),
            &to_js_value(traces),
            &to_js_value(layout),
        );
    }
}

#[cfg(feature = "chart_plotly")]
fn render_energy_plot(model: &RaceModel) {
    let xs: Vec<f64> = model.curve.iter().map(|p| p.distance_km).collect();
    let ys: Vec<f64> = model.curve.iter().map(|p| p.energy_kcal).collect();
    let mut traces = vec![serde_json::json!({
        "type": "scatter",
        "mode": "lines",
        "name": "Energy Reserve (kcal)",
        "x": xs,
        "y": ys,
        "line": { "color": "green", "width": 2 },
        "hovertemplate": "%{x:.1f} km<br>%{y:.0f} kcal<extra></extra>",
    })];

    if !model.stops.is_empty() {
        let sx: Vec<f64> = model.stops.iter().map(|s| s.distance_km).collect();
        let sy: Vec<f64> = model.stops.iter().map(|s| s.energy_kcal).collect();
        let labels: Vec<String> = model
            .stops
            .iter()
            .map(|s| format!("Stop {}", s.index))
            .collect();
        traces.push(serde_json::json!({
            "type": "scatter",
            "mode": "markers",
            "name": "Fueling Stops",
            "x": sx,
            "y": sy,
            "text": labels,
            "marker": { "color": "blue", "size": 10 },
            "hovertemplate": "%{text}: %{x:.1f} km<br>%{y:.0f} kcal<extra></extra>",
        }));
    }

    traces.push(serde_json::json!({
        "type": "scatter",
        "mode": "lines",
        "name": "Zero Energy Threshold",
        "x": [0.0, model.params.distance_km],
        "y": [0.0, 0.0],
        "line": { "color": "red", "dash": "dot", "width": 1 },
        "hoverinfo": "skip",
    }));

    let layout = serde_json::json!({
        "title": "Energy Reserve vs. Distance",
        "xaxis": { "title": "Distance (km)", "zeroline": false },
        "yaxis": { "title": "Energy Reserve (kcal)" },
        "legend": { "x": 1, "xanchor": "right", "y": 1 },
        "margin": { "t": 50 },
    });
    plot_xy("energy_plot", &serde_json::Value::Array(traces), &layout);
}

#[cfg(feature = "chart_plotly")]
fn blob_url_from_str(s: &str) -> Option<String> {
    let parts = js_sys::Array::new();
    parts.push(&JsValue::from_str(s));
    let blob = web_sys::Blob::new_with_str_sequence(&parts).ok()?;
    web_sys::Url::create_object_url_with_blob(&blob).ok()
}

#[component]
pub fn App() -> impl IntoView {
    let bounds = InputBounds::default();
    let defaults = RunParameters::default();
    let (params, set_params) = create_signal(defaults);
    let (model, set_model) = create_signal(Result::<RaceModel, String>::Err(String::new()));
    let (csv_href, set_csv_href) = create_signal(String::new());

    let publish = move |result: Result<RaceModel, String>| {
        #[cfg(feature = "chart_plotly")]
        {
            let old = csv_href.get_untracked();
            if !old.is_empty() {
                let _ = web_sys::Url::revoke_object_url(&old);
            }
            let href = result
                .as_ref()
                .ok()
                .and_then(|m| blob_url_from_str(&curve_csv(m)))
                .unwrap_or_default();
            set_csv_href.set(href);
        }
        #[cfg(not(feature = "chart_plotly"))]
        {
            let _ = (csv_href, set_csv_href);
        }
        set_model.set(result);
    };
    publish(evaluate(&defaults));

    let on_number = move |apply: fn(&mut RunParameters, f64)| {
        move |ev: leptos::ev::Event| match input_number(&ev) {
            Some(value) => {
                set_params.update(|p| apply(p, value));
                publish(evaluate(&params.get_untracked()));
            }
            None => set_model.set(Err("Enter a number.".to_string())),
        }
    };

    #[cfg(feature = "chart_plotly")]
    create_effect(move |_| {
        if let Ok(current) = model.get() {
            render_energy_plot(&current);
        }
    });

    let results_view = move || match model.get() {
        Ok(current) => {
            let lines = summary_lines(&current);
            let stops = stops_text(&current);
            view! {
                <ul class="results">
                    {lines.into_iter().map(|l| view! { <li>{l}</li> }).collect_view()}
                </ul>
                {stops.lines().map(|l| view! { <p class="note">{l.to_string()}</p> }).collect_view()}
            }
            .into_view()
        }
        Err(msg) => view! { <p class="error">{msg}</p> }.into_view(),
    };

    let notes_view = move || {
        strategy_notes(&params.get())
            .into_iter()
            .map(|n| view! { <li>{n}</li> })
            .collect_view()
    };

    view! {
        <main class="tufte">
            <header>
                <h1>"Fueling Strategy & Energy Calculator"</h1>
                <p class="subtitle">"Estimate race time and your energy reserve over the race for a planned fueling schedule."</p>
                <p class="note">{"Web version "}{APP_VERSION}{" ("}{APP_COMMIT}{")"}</p>
            </header>
            <section class="model">
                {formula_lines().into_iter().map(|f| view! { <p class="formula">{f}</p> }).collect_view()}
            </section>
            <section class="controls">
                <h3>"Runner & Run Details"</h3>
                <label title="Total distance of your race (e.g. 42 km for a marathon).">"Race Distance (km) "
                    <input type="number" min=bounds.distance_km.min step=bounds.distance_km.step value=defaults.distance_km
                        on:change=on_number(|p, v| p.distance_km = v)/>
                </label>
                <label title="Your body weight in kilograms.">"Weight (kg) "
                    <input type="number" min=bounds.weight_kg.min step=bounds.weight_kg.step value=defaults.weight_kg
                        on:change=on_number(|p, v| p.weight_kg = v)/>
                </label>
                <label title="Your average running speed in km/h.">"Speed (km/h) "
                    <input type="number" min=bounds.speed_kmh.min step=bounds.speed_kmh.step value=defaults.speed_kmh
                        on:change=on_number(|p, v| p.speed_kmh = v)/>
                </label>
                <h3>"Fueling Plan Details"</h3>
                <label title="Distance between fueling stops.">"Fueling Interval (km) "
                    <input type="number" min=bounds.fuel_interval_km.min step=bounds.fuel_interval_km.step value=defaults.fuel_interval_km
                        on:change=on_number(|p, v| p.fuel_interval_km = v)/>
                </label>
                <label title="Distance at which fueling begins, typically once glycogen stores start to decline.">"Start Fueling at (km) "
                    <input type="number" min=bounds.fuel_start_km.min step=bounds.fuel_start_km.step value=defaults.fuel_start_km
                        on:change=on_number(|p, v| p.fuel_start_km = v)/>
                </label>
                <label title="Calories provided by each fueling stop (e.g. one carb gel).">"Calories per Fueling Stop (kcal) "
                    <input type="number" min=bounds.fuel_kcal_per_stop.min step=bounds.fuel_kcal_per_stop.step value=defaults.fuel_kcal_per_stop
                        on:change=on_number(|p, v| p.fuel_kcal_per_stop = v)/>
                </label>
            </section>
            <section class="results">
                <h3>"Results"</h3>
                {results_view}
            </section>
            <section class="plots">
                <div id="energy_plot" class="plot"></div>
            </section>
            <section class="downloads">
                <a href=move || csv_href.get() download="energy_curve.csv"
                    style=move || if csv_href.get().is_empty() { "display:none;" } else { "display:inline;" }>
                    "Download energy_curve.csv"
                </a>
            </section>
            <section class="notes">
                <h3>"Strategy Analysis"</h3>
                <ul>{notes_view}</ul>
                <p class="note">"Everything is computed locally in your browser."</p>
            </section>
        </main>
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen::prelude::wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    leptos::mount_to_body(|| view! { <App/> });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_reports_bound_violations() {
        let params = RunParameters {
            weight_kg: 0.5,
            ..RunParameters::default()
        };
        let err = evaluate(&params).unwrap_err();
        assert!(err.contains("weight_kg"));
    }

    #[test]
    fn test_curve_csv_has_one_row_per_sample() {
        let model = evaluate(&RunParameters::default()).unwrap();
        let csv = curve_csv(&model);
        assert_eq!(csv.lines().count(), 1 + model.curve.len());
        assert!(csv.lines().last().unwrap().starts_with("42.0000,10.000"));
    }
}
