use std::fs::{self, File};
use std::io::{self, Write};
use std::panic;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use fuel_plan::report::{formula_lines, stops_text, strategy_notes, summary_lines};
use fuel_plan::{
    compute_race_model_with, load_parameters, load_scenarios, InputBounds, ModelOptions,
    RaceModel, RunParameters, Scenario, DEFAULT_SAMPLES,
};
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Fueling strategy and energy calculator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Estimate race time and the energy reserve curve for one run
    Plan(PlanArgs),
    /// Evaluate a JSON list of named scenarios into a summary CSV
    Batch(BatchArgs),
}

/// Run and fueling parameters. Unset flags fall back to `--config`, then to
/// the reference marathon scenario.
#[derive(Args, Debug, Default)]
struct RunArgs {
    /// JSON file with any of the run parameters
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Race distance (km)
    #[arg(long)]
    distance: Option<f64>,

    /// Body weight (kg)
    #[arg(long)]
    weight: Option<f64>,

    /// Average running speed (km/h)
    #[arg(long)]
    speed: Option<f64>,

    /// Distance between fueling stops (km)
    #[arg(long)]
    fuel_interval: Option<f64>,

    /// Distance of the first fueling stop (km)
    #[arg(long)]
    fuel_start: Option<f64>,

    /// Calories taken at each fueling stop (kcal)
    #[arg(long)]
    fuel_kcal: Option<f64>,
}

#[derive(Parser, Debug)]
struct PlanArgs {
    #[command(flatten)]
    run: RunArgs,

    /// Number of curve samples between start and finish
    #[arg(long, default_value_t = DEFAULT_SAMPLES)]
    samples: usize,

    /// Output CSV path for the energy curve (`-` for stdout)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Output JSON path for the full model
    #[arg(long, value_hint = ValueHint::FilePath)]
    json: Option<PathBuf>,

    /// Output PNG chart path
    #[arg(long, value_hint = ValueHint::FilePath)]
    png: Option<PathBuf>,

    /// Output SVG chart path
    #[arg(long, value_hint = ValueHint::FilePath)]
    svg: Option<PathBuf>,

    /// Disable chart generation
    #[arg(long, action = ArgAction::SetTrue)]
    no_plot: bool,

    /// Print the model formulas and strategy notes
    #[arg(long, action = ArgAction::SetTrue)]
    notes: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct BatchArgs {
    /// JSON array of `{ "name": ..., "params": { ... } }` scenarios
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    scenarios: PathBuf,

    /// Output CSV path (`-` for stdout)
    #[arg(short, long, default_value = "scenarios.csv", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Number of curve samples per scenario
    #[arg(long, default_value_t = DEFAULT_SAMPLES)]
    samples: usize,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Plan(args) => args.verbose,
        Command::Batch(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Plan(args) => handle_plan(args),
        Command::Batch(args) => handle_batch(args),
    }
}

fn resolve_params(run: &RunArgs) -> Result<RunParameters> {
    let mut params = match run.config.as_ref() {
        Some(path) => load_parameters(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => RunParameters::default(),
    };
    if let Some(v) = run.distance {
        params.distance_km = v;
    }
    if let Some(v) = run.weight {
        params.weight_kg = v;
    }
    if let Some(v) = run.speed {
        params.speed_kmh = v;
    }
    if let Some(v) = run.fuel_interval {
        params.fuel_interval_km = v;
    }
    if let Some(v) = run.fuel_start {
        params.fuel_start_km = v;
    }
    if let Some(v) = run.fuel_kcal {
        params.fuel_kcal_per_stop = v;
    }
    InputBounds::default().check(&params)?;
    Ok(params)
}

fn handle_plan(args: PlanArgs) -> Result<()> {
    let params = resolve_params(&args.run)?;
    debug!(?params, "resolved run parameters");

    let options = ModelOptions {
        samples: args.samples,
    };
    let t_compute = Instant::now();
    let model = compute_race_model_with(&params, &options)?;
    if args.verbose {
        info!(
            "Compute stage: {:.3} ms ({} samples)",
            t_compute.elapsed().as_secs_f64() * 1000.0,
            model.curve.len()
        );
    }
    info!(
        "Model computed: {} fueling stops, final reserve {:.0} kcal",
        model.summary.stop_count, model.summary.final_energy_kcal
    );
    if let Some(km) = model.summary.depletion_km {
        warn!("Energy reserve runs out at {:.1} km", km);
    }

    let stdout_curve = args
        .output
        .as_ref()
        .is_some_and(|path| path.as_os_str() == "-");
    if !stdout_curve {
        print_report(&model, args.notes)?;
    }

    if let Some(path) = args.output.as_ref() {
        if stdout_curve {
            write_curve_stdout(&model)?;
        } else {
            write_curve_csv(&model, path)?;
            info!("Wrote curve CSV: {}", path.display());
        }
    }

    if let Some(path) = args.json.as_ref() {
        write_json_report(&model, path)?;
        info!("Wrote model JSON: {}", path.display());
    }

    if !args.no_plot {
        let mut targets: Vec<(PathBuf, ChartKind)> = Vec::new();
        if let Some(path) = args.png.as_ref() {
            targets.push((path.clone(), ChartKind::Png));
        }
        if let Some(path) = args.svg.as_ref() {
            targets.push((path.clone(), ChartKind::Svg));
        }
        for (path, kind) in targets {
            let t_plot = Instant::now();
            if let Err(err) = render_chart_guard(&model, &path, kind) {
                warn!("Skipping chart render ({}): {}", path.display(), err);
            } else {
                info!("Wrote chart: {}", path.display());
            }
            if args.verbose {
                info!(
                    "Plot stage: {:.1} ms",
                    t_plot.elapsed().as_secs_f64() * 1000.0
                );
            }
        }
    }

    Ok(())
}

fn print_report(model: &RaceModel, notes: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "Results")?;
    for line in summary_lines(model) {
        writeln!(out, "  {line}")?;
    }
    for line in stops_text(model).lines() {
        writeln!(out, "  {line}")?;
    }
    if notes {
        writeln!(out)?;
        writeln!(out, "Model")?;
        for line in formula_lines() {
            writeln!(out, "  {line}")?;
        }
        writeln!(out)?;
        writeln!(out, "Strategy Analysis")?;
        for note in strategy_notes(&model.params) {
            writeln!(out, "  - {note}")?;
        }
    }
    Ok(())
}

fn write_curve_stdout(model: &RaceModel) -> Result<()> {
    let stdout = io::stdout();
    let handle = stdout.lock();
    let mut writer = csv::Writer::from_writer(handle);
    write_curve_rows(model, &mut writer)
}

fn write_curve_csv(model: &RaceModel, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    write_curve_rows(model, &mut writer)
}

/// Curve samples merged with the stop points, ordered by distance. Stop rows
/// carry their 1-based index in the `stop` column.
fn write_curve_rows<W: Write>(model: &RaceModel, writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record(["distance_km", "energy_kcal", "stop"])?;

    let mut stops = model.stops.iter().peekable();
    for point in &model.curve {
        while let Some(stop) = stops.next_if(|s| s.distance_km <= point.distance_km) {
            writer.write_record([
                format!("{:.4}", stop.distance_km),
                format!("{:.3}", stop.energy_kcal),
                stop.index.to_string(),
            ])?;
        }
        writer.write_record([
            format!("{:.4}", point.distance_km),
            format!("{:.3}", point.energy_kcal),
            String::new(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: String,
    version: &'static str,
    #[serde(flatten)]
    model: &'a RaceModel,
}

fn write_json_report(model: &RaceModel, path: &Path) -> Result<()> {
    let report = JsonReport {
        generated_at: Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION"),
        model,
    };
    let text = serde_json::to_string_pretty(&report)?;
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[derive(Clone, Debug, PartialEq)]
struct BatchRow {
    name: String,
    formatted_time: String,
    initial_energy_kcal: f64,
    total_expenditure_kcal: f64,
    final_energy_kcal: f64,
    stop_count: usize,
    total_fuel_added_kcal: f64,
    depletion_km: Option<f64>,
    error: Option<String>,
}

fn evaluate_scenarios(scenarios: &[Scenario], options: &ModelOptions) -> Vec<BatchRow> {
    scenarios
        .par_iter()
        .map(|scenario| {
            let result = InputBounds::default()
                .check(&scenario.params)
                .and_then(|_| compute_race_model_with(&scenario.params, options));
            match result {
                Ok(model) => {
                    let s = model.summary;
                    BatchRow {
                        name: scenario.name.clone(),
                        formatted_time: s.formatted_time,
                        initial_energy_kcal: s.initial_energy_kcal,
                        total_expenditure_kcal: s.total_expenditure_kcal,
                        final_energy_kcal: s.final_energy_kcal,
                        stop_count: s.stop_count,
                        total_fuel_added_kcal: s.total_fuel_added_kcal,
                        depletion_km: s.depletion_km,
                        error: None,
                    }
                }
                Err(err) => BatchRow {
                    name: scenario.name.clone(),
                    formatted_time: String::new(),
                    initial_energy_kcal: f64::NAN,
                    total_expenditure_kcal: f64::NAN,
                    final_energy_kcal: f64::NAN,
                    stop_count: 0,
                    total_fuel_added_kcal: 0.0,
                    depletion_km: None,
                    error: Some(err.to_string()),
                },
            }
        })
        .collect()
}

fn handle_batch(args: BatchArgs) -> Result<()> {
    let scenarios = load_scenarios(&args.scenarios)
        .with_context(|| format!("failed to load scenarios {}", args.scenarios.display()))?;
    if scenarios.is_empty() {
        return Err(anyhow!("scenario list was empty"));
    }

    let options = ModelOptions {
        samples: args.samples,
    };
    let t_compute = Instant::now();
    let rows = evaluate_scenarios(&scenarios, &options);
    let failed = rows.iter().filter(|r| r.error.is_some()).count();
    info!(
        "Evaluated {} scenarios in {:.1} ms ({} failed)",
        rows.len(),
        t_compute.elapsed().as_secs_f64() * 1000.0,
        failed
    );
    for row in rows.iter().filter(|r| r.error.is_some()) {
        warn!(
            "Scenario {}: {}",
            row.name,
            row.error.as_deref().unwrap_or_default()
        );
    }

    if args.output.as_os_str() == "-" {
        let stdout = io::stdout();
        let mut writer = csv::Writer::from_writer(stdout.lock());
        write_batch_rows(&rows, &mut writer)?;
    } else {
        let file = File::create(&args.output)
            .with_context(|| format!("failed to create {}", args.output.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        write_batch_rows(&rows, &mut writer)?;
        info!("Wrote scenario table: {}", args.output.display());
    }
    Ok(())
}

fn write_batch_rows<W: Write>(rows: &[BatchRow], writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record([
        "name",
        "race_time",
        "initial_energy_kcal",
        "total_expenditure_kcal",
        "final_energy_kcal",
        "stop_count",
        "total_fuel_added_kcal",
        "depletion_km",
        "error",
    ])?;
    for row in rows {
        let fmt_kcal = |v: f64| {
            if v.is_finite() {
                format!("{:.0}", v)
            } else {
                String::new()
            }
        };
        writer.write_record([
            row.name.clone(),
            row.formatted_time.clone(),
            fmt_kcal(row.initial_energy_kcal),
            fmt_kcal(row.total_expenditure_kcal),
            fmt_kcal(row.final_energy_kcal),
            row.stop_count.to_string(),
            fmt_kcal(row.total_fuel_added_kcal),
            row.depletion_km
                .map(|v| format!("{:.2}", v))
                .unwrap_or_default(),
            row.error.clone().unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

enum ChartKind {
    Png,
    Svg,
}

fn render_chart_guard(model: &RaceModel, path: &Path, kind: ChartKind) -> Result<(), String> {
    let render = || -> Result<(), String> {
        let drawn = match kind {
            ChartKind::Png => {
                let root = BitMapBackend::new(path, (1000, 600)).into_drawing_area();
                draw_energy_chart(root, model)
            }
            ChartKind::Svg => {
                let root = SVGBackend::new(path, (1000, 600)).into_drawing_area();
                draw_energy_chart(root, model)
            }
        };
        drawn.map_err(|e| format!("plotting error: {}", e))
    };

    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

fn energy_axis_range(model: &RaceModel) -> (f64, f64) {
    let (lo, hi) = model
        .curve
        .iter()
        .map(|p| p.energy_kcal)
        .fold((0.0_f64, 0.0_f64), |(lo, hi), e| (lo.min(e), hi.max(e)));
    let pad = ((hi - lo) * 0.05).max(10.0);
    (lo - pad, hi + pad)
}

fn draw_energy_chart<DB>(root: DrawingArea<DB, plotters::coord::Shift>, model: &RaceModel) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let x_max = model.params.distance_km;
    let (y_min, y_max) = energy_axis_range(model);

    let title_font = FontDesc::new(FontFamily::SansSerif, 26.0, FontStyle::Normal);
    let mut chart = ChartBuilder::on(&root)
        .caption("Energy Reserve vs. Distance", title_font)
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 70)
        .set_label_area_size(LabelAreaPosition::Bottom, 45)
        .build_cartesian_2d(0.0..x_max, y_min..y_max)?;

    let axis_font = FontDesc::new(FontFamily::SansSerif, 18.0, FontStyle::Normal);
    chart
        .configure_mesh()
        .x_desc("Distance (km)")
        .y_desc("Energy Reserve (kcal)")
        .x_label_formatter(&|v| format!("{:.0}", v))
        .y_label_formatter(&|v| format!("{:.0}", v))
        .label_style(axis_font.color(&BLACK.mix(0.85)))
        .light_line_style(&BLACK.mix(0.05))
        .draw()?;

    let reserve_color = RGBColor(0, 128, 0);
    chart
        .draw_series(LineSeries::new(
            model.curve.iter().map(|p| (p.distance_km, p.energy_kcal)),
            ShapeStyle {
                color: reserve_color.to_rgba(),
                filled: false,
                stroke_width: 2,
            },
        ))?
        .label("Energy Reserve (kcal)")
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], reserve_color));

    if !model.stops.is_empty() {
        let stop_color = RGBColor(30, 60, 220);
        chart
            .draw_series(
                model
                    .stops
                    .iter()
                    .map(|s| Circle::new((s.distance_km, s.energy_kcal), 6, stop_color.filled())),
            )?
            .label("Fueling Stops")
            .legend(move |(x, y)| Circle::new((x + 15, y), 5, stop_color.filled()));
    }

    let zero_color = RGBColor(220, 0, 0);
    chart
        .draw_series(LineSeries::new(
            [(0.0, 0.0), (x_max, 0.0)],
            &zero_color.mix(0.7),
        ))?
        .label("Zero Energy Threshold")
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], zero_color));

    let legend_font = FontDesc::new(FontFamily::SansSerif, 16.0, FontStyle::Normal);
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK.mix(0.3))
        .label_font(legend_font.color(&BLACK))
        .position(SeriesLabelPosition::UpperRight)
        .draw()?;

    root.present()?;
    Ok(())
}
