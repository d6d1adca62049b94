use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{Datelike, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use serde::Serialize;
use tokio::task::JoinSet;

mod alerts;
mod analysis;
mod channel;
mod compare;
mod config;
mod error;
mod incidence;
mod loader;
mod models;
mod normalize;
mod report;
mod stats;
mod summary;
mod trend;

use analysis::{analyze_unit, ChannelAnalysis};
use config::ChannelConfig;
use models::{CaseObservation, EPI_WEEKS};

#[derive(Parser)]
#[command(name = "endemic-channel")]
#[command(about = "Endemic channel early warning for weekly disease surveillance", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the endemic channel and flag alert weeks
    Channel {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Check baseline coverage per year
    Validate {
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Export weekly analysis rows for one unit as CSV
    Export {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, default_value = "channel.csv")]
        out: PathBuf,
    },
    /// Classify units by incidence per 1,000 population
    Incidence {
        #[arg(long)]
        data: PathBuf,
        #[arg(long)]
        population: PathBuf,
        #[arg(long)]
        year: Option<i32>,
        /// Report incidence per unit and week instead of yearly totals
        #[arg(long)]
        weekly: bool,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ScopeArgs {
    /// CSV with orgunit, year, epi_week (or period) and confirmed_cases
    #[arg(long)]
    data: PathBuf,
    /// Analyse a single unit; every unit in the file otherwise
    #[arg(long)]
    unit: Option<String>,
    /// Monitoring year; defaults to the current year
    #[arg(long)]
    year: Option<i32>,
    /// Last epi-week of the monitoring year to include
    #[arg(long)]
    current_week: Option<u32>,
    #[arg(long)]
    threshold: Option<models::ThresholdPercentile>,
    #[arg(long)]
    consecutive_weeks: Option<usize>,
    #[arg(long)]
    config: Option<PathBuf>,
    /// CSV of facility,parent pairs; facilities are summed into their parent
    #[arg(long)]
    hierarchy: Option<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Markdown,
}

#[derive(Serialize)]
#[serde(untagged)]
enum UnitOutcome {
    Analysis(Box<ChannelAnalysis>),
    Failed { unit: String, error: String },
}

fn resolve_config(path: Option<&Path>) -> anyhow::Result<ChannelConfig> {
    match path {
        Some(path) => ChannelConfig::load(path),
        None => Ok(ChannelConfig::default()),
    }
}

impl ScopeArgs {
    fn config(&self) -> anyhow::Result<ChannelConfig> {
        let mut config = resolve_config(self.config.as_deref())?;
        if let Some(threshold) = self.threshold {
            config.threshold_percentile = threshold;
        }
        if let Some(weeks) = self.consecutive_weeks {
            config = config.with_consecutive_weeks(weeks);
        }
        config.validate()?;
        Ok(config)
    }

    fn year_and_week(&self) -> (i32, u32) {
        let today = Utc::now().date_naive();
        let year = self.year.unwrap_or_else(|| today.year());
        let week = self.current_week.unwrap_or(if year == today.year() {
            normalize::epi_week_of(today)
        } else {
            EPI_WEEKS
        });
        (year, week)
    }

    fn load_units(&self) -> anyhow::Result<BTreeMap<String, Vec<CaseObservation>>> {
        let rows = loader::load_observations(&self.data)?;
        let mut units = match &self.hierarchy {
            Some(path) => normalize::aggregate_to_parent(&rows, &loader::load_hierarchy(path)?),
            None => loader::group_by_unit(&rows),
        };
        if let Some(unit) = &self.unit {
            units.retain(|name, _| name == unit);
            if units.is_empty() {
                anyhow::bail!("unit {unit} not found in {}", self.data.display());
            }
        }
        info!("loaded {} rows across {} units", rows.len(), units.len());
        Ok(units)
    }
}

async fn analyze_units(
    units: BTreeMap<String, Vec<CaseObservation>>,
    year: i32,
    week: u32,
    config: &ChannelConfig,
) -> anyhow::Result<Vec<UnitOutcome>> {
    let mut tasks = JoinSet::new();
    for (idx, (unit, series)) in units.into_iter().enumerate() {
        let config = config.clone();
        tasks.spawn_blocking(move || {
            let (baseline, current) =
                loader::split_observations(&series, year, week, config.baseline_years);
            let outcome = match analyze_unit(&unit, year, &baseline, &current, &config) {
                Ok(result) => UnitOutcome::Analysis(Box::new(result)),
                Err(err) => {
                    warn!("{err}");
                    UnitOutcome::Failed {
                        unit,
                        error: err.to_string(),
                    }
                }
            };
            (idx, outcome)
        });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        outcomes.push(joined.context("analysis task panicked")?);
    }
    outcomes.sort_by_key(|(idx, _)| *idx);
    Ok(outcomes.into_iter().map(|(_, outcome)| outcome).collect())
}

fn emit(text: &str, out: Option<&Path>) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Output written to {}.", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Channel { scope, format, out } => {
            let config = scope.config()?;
            let (year, week) = scope.year_and_week();
            let units = scope.load_units()?;
            let outcomes = analyze_units(units, year, week, &config).await?;

            let text = match format {
                OutputFormat::Json => serde_json::to_string_pretty(&outcomes)? + "\n",
                OutputFormat::Markdown => outcomes
                    .iter()
                    .map(|outcome| match outcome {
                        UnitOutcome::Analysis(result) => report::build_report(result),
                        UnitOutcome::Failed { unit, error } => {
                            format!("# Endemic Channel Report\n{unit}: {error}\n")
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("\n"),
            };
            emit(&text, out.as_deref())?;
        }
        Commands::Validate { scope } => {
            let config = scope.config()?;
            let (year, week) = scope.year_and_week();
            for (unit, series) in scope.load_units()? {
                let (baseline, _) =
                    loader::split_observations(&series, year, week, config.baseline_years);
                if baseline.is_empty() {
                    println!("{unit}: no baseline data");
                    continue;
                }
                let validation = normalize::validate_baseline(&baseline, config.min_baseline_weeks);
                println!("{unit}: {}", validation.message);
                for (baseline_year, coverage) in &validation.coverage {
                    println!(
                        "- {} {} weeks ({:.1}%)",
                        baseline_year, coverage.weeks_present, coverage.coverage_percent
                    );
                }
            }
        }
        Commands::Export { scope, out } => {
            let config = scope.config()?;
            let (year, week) = scope.year_and_week();
            let units = scope.load_units()?;
            if units.len() != 1 {
                anyhow::bail!("export needs exactly one unit; pass --unit");
            }
            let Some((unit, series)) = units.into_iter().next() else {
                anyhow::bail!("no units found");
            };
            let (baseline, current) =
                loader::split_observations(&series, year, week, config.baseline_years);
            let result = analyze_unit(&unit, year, &baseline, &current, &config)?;
            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            report::write_analysis_csv(&result, file)?;
            println!("Exported {} weeks to {}.", result.analysis.len(), out.display());
        }
        Commands::Incidence {
            data,
            population,
            year,
            weekly,
            config,
            limit,
            format,
            out,
        } => {
            let config = resolve_config(config.as_deref())?;
            let rows = loader::load_observations(&data)?;
            let population = loader::load_population(&population)?;

            if weekly {
                let weekly_rows = incidence::calculate_weekly_incidence(
                    &loader::period_cases(&rows, year),
                    &population,
                    config.incidence_multiplier,
                );
                let text = match format {
                    OutputFormat::Json => serde_json::to_string_pretty(&weekly_rows)? + "\n",
                    OutputFormat::Markdown => weekly_rows
                        .iter()
                        .map(|row| {
                            format!(
                                "- {} {}: {}\n",
                                row.unit,
                                row.period,
                                row.incidence
                                    .map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
                            )
                        })
                        .collect(),
                };
                return emit(&text, out.as_deref());
            }

            let totals = loader::case_totals(&rows, year);
            let (records, thresholds) =
                incidence::build_incidence_records(&totals, &population, config.incidence_multiplier);
            let by_unit: BTreeMap<String, Option<f64>> = records
                .iter()
                .map(|r| (r.unit.clone(), r.incidence_per_1000))
                .collect();
            let ranked = incidence::rank_orgunits_by_incidence(&by_unit);

            let text = match format {
                OutputFormat::Json => {
                    let (classes, _) = incidence::calculate_quartile_classification(&by_unit);
                    serde_json::to_string_pretty(&serde_json::json!({
                        "records": records,
                        "classes": classes,
                        "thresholds": thresholds,
                        "ranking": ranked,
                    }))? + "\n"
                }
                OutputFormat::Markdown => {
                    report::build_incidence_report(&records, &thresholds, &ranked, limit)
                }
            };
            emit(&text, out.as_deref())?;
        }
    }

    Ok(())
}
