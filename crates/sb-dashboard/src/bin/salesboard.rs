#![forbid(unsafe_code)]

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use sb_dashboard::{DashboardConfig, InvalidOverride, assemble, load_workbook, render_text};
use sb_rank::{SortOrder, View};
use sb_runtime::{RuntimeMode, init_tracing};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "salesboard")]
#[command(about = "Summarize a sales workbook into ranked dashboard panels")]
#[command(version)]
struct Cli {
    #[arg(help = "Workbook JSON file, sheet CSV file, or directory of sheet CSVs")]
    input: PathBuf,
    #[arg(long, value_name = "PATH", help = "JSON dashboard config")]
    config: Option<PathBuf>,
    #[arg(long, short, value_enum, default_value = "text", help = "Output format")]
    format: OutputFormat,
    #[arg(long, allow_negative_numbers = true, help = "Rows per ranked view")]
    limit: Option<i64>,
    #[arg(long, help = "View for every panel and the chart: top, bottom or all")]
    view: Option<View>,
    #[arg(long, help = "Sort order for every panel: asc or desc")]
    order: Option<SortOrder>,
    #[arg(long, help = "Fail when any field fell back to its default")]
    strict: bool,
    #[arg(long, value_name = "LEVEL", help = "Log level when RUST_LOG is unset")]
    log_level: Option<String>,
    #[arg(long, value_name = "DIR", help = "Also write each ranked panel as <dataset>.csv")]
    csv_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("salesboard error: {error}");
            ExitCode::from(2)
        }
    }
}

fn build_config(
    cli: &Cli,
) -> Result<(DashboardConfig, Vec<InvalidOverride>), Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => DashboardConfig::from_path(path)?,
        None => DashboardConfig::default(),
    };
    let rejected = config.apply_overrides(|key| std::env::var(key).ok());

    if let Some(limit) = cli.limit {
        config.limit = limit;
    }
    match (cli.view, cli.order) {
        (Some(view), order) => config.set_view(view, order),
        (None, Some(order)) => config.set_order(order),
        (None, None) => {}
    }
    if cli.strict {
        config.mode = RuntimeMode::Strict;
    }
    if let Some(level) = &cli.log_level {
        config.log_level.clone_from(level);
    }
    Ok((config, rejected))
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let (config, rejected) = build_config(&cli)?;
    init_tracing(&config.log_level);
    for invalid in &rejected {
        warn!(key = invalid.key, value = %invalid.value, "{invalid}");
    }

    let workbook = load_workbook(&cli.input, &config)?;
    let report = assemble(&workbook, &config)?;

    if let Some(dir) = &cli.csv_dir {
        fs::create_dir_all(dir)?;
        for panel in &report.panels {
            let path = dir.join(format!("{}.csv", panel.dataset.name()));
            fs::write(&path, panel.ranked_csv()?)?;
            info!(path = %path.display(), "wrote panel csv");
        }
    }

    match cli.format {
        OutputFormat::Text => print!("{}", render_text(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}
