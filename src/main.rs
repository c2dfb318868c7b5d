use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

mod aggregate;
mod config;
mod error;
mod export;
mod filter;
mod ingest;
mod kpi;
mod models;
mod report;
mod stats;

use config::Config;
use error::AnalyticsError;
use filter::{FilterSet, Filterable};
use ingest::{Ingested, COL_ORIGIN_UNIT, COL_SPECIALTY};
use models::{CareRequestRecord, WaitTimeRecord};

const WARNING_PREVIEW: usize = 5;

#[derive(Parser)]
#[command(name = "mira-queue-analytics")]
#[command(about = "Queue KPIs and wait-time evolution for care-regulation requests", long_about = None)]
struct Cli {
    /// CSV delimiter (single character or `tab`); overrides MIRA_CSV_DELIMITER
    #[arg(long, global = true, value_parser = parse_delimiter_arg)]
    delimiter: Option<u8>,
    /// Rows in the detail sample; overrides MIRA_DETAIL_ROWS
    #[arg(long, global = true)]
    detail_rows: Option<usize>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue size, scheduling delay and cancellation rate
    Kpis {
        #[arg(long)]
        csv: PathBuf,
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Monthly median and quartiles of wait time
    WaitTimes {
        #[arg(long)]
        csv: PathBuf,
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Generate a markdown report of the request queue
    Report {
        #[arg(long)]
        csv: PathBuf,
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Write the filtered requests to a CSV file
    Export {
        #[arg(long)]
        csv: PathBuf,
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Keep rows whose column is one of the values, e.g. `prioridade=P1,P2`
    #[arg(long = "filter", value_name = "COLUMN=VALUES")]
    filters: Vec<String>,
    #[arg(long)]
    specialty: Vec<String>,
    #[arg(long)]
    unit: Vec<String>,
    /// First request date to include
    #[arg(long, value_parser = filter::parse_window_date)]
    from: Option<NaiveDate>,
    /// Last request date to include
    #[arg(long, value_parser = filter::parse_window_date)]
    to: Option<NaiveDate>,
}

impl FilterArgs {
    fn to_filter_set<T: Filterable>(&self) -> Result<FilterSet, AnalyticsError> {
        let mut filters = FilterSet::new()
            .select(COL_SPECIALTY, &self.specialty)
            .select(COL_ORIGIN_UNIT, &self.unit);
        for assignment in &self.filters {
            filters = filters.select_assignment(assignment)?;
        }
        let filters = filters.with_window(self.from, self.to)?;
        filters.validate_for::<T>()?;
        if !filters.is_unrestricted() {
            log::info!("filtering on {}", filters.describe());
        }
        Ok(filters)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn parse_delimiter_arg(raw: &str) -> Result<u8, String> {
    config::parse_delimiter(raw)
        .ok_or_else(|| format!("expected a single ASCII character or `tab`, got {raw:?}"))
}

fn load_care_requests(path: &Path, config: &Config) -> anyhow::Result<Ingested<CareRequestRecord>> {
    ingest::load_care_requests(path, config.delimiter)
        .with_context(|| format!("failed to load care requests from {}", path.display()))
}

fn load_wait_times(path: &Path, config: &Config) -> anyhow::Result<Ingested<WaitTimeRecord>> {
    ingest::load_wait_times(path, config.delimiter)
        .with_context(|| format!("failed to load wait times from {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::from_env().with_overrides(cli.delimiter, cli.detail_rows);
    log::debug!("configuration: {:?}", config);

    match cli.command {
        Commands::Kpis {
            csv,
            filters,
            format,
        } => {
            let filters = filters.to_filter_set::<CareRequestRecord>()?;
            let ingested = load_care_requests(&csv, &config)?;
            let filtered = filters.apply(&ingested.records);
            let kpis = kpi::compute_kpis(&filtered);

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&kpis.payload())?);
                }
                OutputFormat::Text => {
                    if filtered.is_empty() {
                        println!("Nenhuma solicitação corresponde aos filtros selecionados.");
                    }
                    print!("{}", report::render_kpis(&kpis));
                    print!("{}", report::render_warnings(&ingested.warnings, WARNING_PREVIEW));
                }
            }
        }
        Commands::WaitTimes {
            csv,
            filters,
            format,
        } => {
            let filters = filters.to_filter_set::<WaitTimeRecord>()?;
            let ingested = load_wait_times(&csv, &config)?;
            let filtered = filters.apply(&ingested.records);
            let series = aggregate::monthly_series(&ingested.records, &filtered);

            match format {
                OutputFormat::Json => {
                    let chart = aggregate::chart_series(&series);
                    println!("{}", serde_json::to_string_pretty(&chart)?);
                }
                OutputFormat::Text => {
                    print!(
                        "{}",
                        report::render_wait_times(
                            &filters,
                            &series,
                            filtered.len(),
                            &ingested.warnings,
                            WARNING_PREVIEW,
                        )
                    );
                }
            }
        }
        Commands::Report { csv, filters, out } => {
            let filters = filters.to_filter_set::<CareRequestRecord>()?;
            let ingested = load_care_requests(&csv, &config)?;
            let filtered = filters.apply(&ingested.records);
            let report = report::build_report(
                &filters,
                &ingested.records,
                &filtered,
                &ingested.warnings,
                config.detail_rows,
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Relatório gravado em {}.", out.display());
        }
        Commands::Export { csv, filters, out } => {
            let filters = filters.to_filter_set::<CareRequestRecord>()?;
            let ingested = load_care_requests(&csv, &config)?;
            let filtered = filters.apply(&ingested.records);
            let written = export::export_care_requests(&out, &filtered, config.delimiter)
                .with_context(|| format!("failed to export to {}", out.display()))?;
            println!("{written} solicitações exportadas para {}.", out.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn shorthand_flags_become_filters() {
        let cli = Cli::parse_from([
            "mira-queue-analytics",
            "wait-times",
            "--csv",
            "espera.csv",
            "--specialty",
            "Cardiologia",
            "--unit",
            "UBS Central",
            "--from",
            "01/01/2024",
        ]);
        let Commands::WaitTimes { filters, .. } = cli.command else {
            panic!("expected wait-times");
        };
        let filters = filters.to_filter_set::<WaitTimeRecord>().unwrap();
        assert_eq!(
            filters.describe(),
            "especialidade em [Cardiologia]; unidade_solicitante em [UBS Central]; a partir de 2024-01-01"
        );
    }

    #[test]
    fn care_request_columns_are_rejected_for_wait_times() {
        let args = FilterArgs {
            filters: vec!["prioridade=P1".to_string()],
            ..FilterArgs::default()
        };
        assert!(args.to_filter_set::<WaitTimeRecord>().is_err());
        assert!(args.to_filter_set::<CareRequestRecord>().is_ok());
    }

    #[test]
    fn global_delimiter_is_parsed() {
        let cli = Cli::parse_from([
            "mira-queue-analytics",
            "kpis",
            "--csv",
            "fila.csv",
            "--delimiter",
            ";",
        ]);
        assert_eq!(cli.delimiter, Some(b';'));
    }
}
