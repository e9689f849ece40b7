//! CLI entry point for the market-neutrality check.
//!
//! Provides subcommands for running the whole pipeline from the network,
//! downloading the aligned dataset only, and analysing a saved dataset.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use neutrality_check::{
    config::SourceConfig,
    fetch::BasicClient,
    output::{
        append_coefficients, gzip_file, read_dataset_csv, render_correlations, render_report,
        render_summary, write_dataset_csv, write_json,
    },
    pipeline::{AnalysisReport, analyze, build_dataset, fetch_all, infer_funds},
    series::Frame,
    summary::{correlation_matrix, summarize},
};
use std::ffi::OsStr;
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "neutrality_check")]
#[command(about = "Test a hedge fund's market-neutral claim with CAPM and factor regressions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download every source, build the dataset and run all regressions
    Run {
        /// JSON source configuration (defaults are used when omitted)
        #[arg(short, long)]
        config: Option<String>,

        /// Directory for dataset.csv, report.json and coefficients.csv
        #[arg(short, long, default_value = "reports")]
        out_dir: String,

        /// Also write a gzip-compressed copy of the dataset
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Download every source and save the aligned dataset only
    Fetch {
        #[arg(short, long)]
        config: Option<String>,

        /// CSV file to write the dataset to
        #[arg(short, long, default_value = "data.csv")]
        output: String,

        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Run the regressions on a previously saved dataset
    Analyze {
        /// Dataset CSV written by `fetch` or `run`
        #[arg(value_name = "DATASET_CSV")]
        dataset: String,

        /// Fund labels and significance level come from here when given
        #[arg(short, long)]
        config: Option<String>,

        #[arg(short, long, default_value = "reports")]
        out_dir: String,
    },
    /// Print descriptive statistics and correlations of a saved dataset
    Describe {
        #[arg(value_name = "DATASET_CSV")]
        dataset: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = init_logging()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            out_dir,
            gzip,
        } => {
            let config = SourceConfig::load_or_default(config.as_deref())?;
            let frame = download_dataset(&config).await?;

            std::fs::create_dir_all(&out_dir)?;
            save_dataset(&format!("{out_dir}/dataset.csv"), &frame, gzip)?;

            let report = analyze(&frame, &config.fund_labels(), config.significance)?;
            publish(&report, &out_dir)?;
        }
        Commands::Fetch {
            config,
            output,
            gzip,
        } => {
            let config = SourceConfig::load_or_default(config.as_deref())?;
            let frame = download_dataset(&config).await?;
            save_dataset(&output, &frame, gzip)?;
        }
        Commands::Analyze {
            dataset,
            config,
            out_dir,
        } => {
            let frame = read_dataset_csv(&dataset)?;

            let (funds, significance) = match config {
                Some(path) => {
                    let config = SourceConfig::load(&path)?;
                    let funds: Vec<String> =
                        config.fund_labels().into_iter().map(str::to_string).collect();
                    (funds, config.significance)
                }
                None => (infer_funds(&frame), SourceConfig::default().significance),
            };
            if funds.is_empty() {
                bail!("no fund columns found in '{dataset}'; pass --config to name them");
            }
            info!(funds = ?funds, "Analysing saved dataset");

            let funds: Vec<&str> = funds.iter().map(String::as_str).collect();
            let report = analyze(&frame, &funds, significance)?;

            std::fs::create_dir_all(&out_dir)?;
            publish(&report, &out_dir)?;
        }
        Commands::Describe { dataset } => {
            let frame = read_dataset_csv(&dataset)?;
            let names: Vec<&str> = frame.names().collect();

            println!("{}", render_summary(&summarize(&frame, &[])));
            println!("{}", render_correlations(&correlation_matrix(&frame, &names)));
        }
    }

    Ok(())
}

const DEFAULT_LOG_FILE: &str = "logs/neutrality_check.log";

/// Human-readable events go to stderr (`RUST_LOG`, default `info`); a JSON
/// copy with span context goes to a daily file under `LOG_FILE_PATH`
/// (`RUST_LOG_JSON`, default `debug`). Keep the guard alive until exit so
/// buffered file output is flushed.
fn init_logging() -> Result<WorkerGuard> {
    let log_file = PathBuf::from(
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string()),
    );
    let dir = match log_file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let prefix = log_file
        .file_name()
        .unwrap_or(OsStr::new("neutrality_check.log"))
        .to_os_string();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating log directory '{}'", dir.display()))?;

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, prefix));

    let terminal = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(env_filter("RUST_LOG", "info")?);

    let json_file = fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_current_span(true)
        .with_span_list(true)
        .with_filter(env_filter("RUST_LOG_JSON", "debug")?);

    tracing_subscriber::registry()
        .with(terminal)
        .with(json_file)
        .init();

    Ok(guard)
}

/// Filter from `var`, always letting `default` level events through.
fn env_filter(var: &str, default: &str) -> Result<EnvFilter> {
    Ok(EnvFilter::from_env(var).add_directive(default.parse()?))
}

/// Downloads and aligns every configured source.
#[tracing::instrument(skip_all)]
async fn download_dataset(config: &SourceConfig) -> Result<Frame> {
    let client = BasicClient::new();
    let raw = fetch_all(&client, config).await?;
    build_dataset(&raw, config)
}

fn save_dataset(path: &str, frame: &Frame, gzip: bool) -> Result<()> {
    write_dataset_csv(path, frame)?;
    if gzip {
        gzip_file(path)?;
    }
    Ok(())
}

/// Prints the report and writes its JSON and coefficient artefacts.
fn publish(report: &AnalysisReport, out_dir: &str) -> Result<()> {
    println!("{}", render_report(report));
    write_json(&format!("{out_dir}/report.json"), report)?;
    append_coefficients(&format!("{out_dir}/coefficients.csv"), report)?;
    info!(out_dir, "Report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_accepts_level_defaults() {
        assert!(env_filter("NEUTRALITY_CHECK_TEST_UNSET_FILTER", "info").is_ok());
        assert!(env_filter("NEUTRALITY_CHECK_TEST_UNSET_FILTER", "debug").is_ok());
    }

    #[test]
    fn test_env_filter_rejects_malformed_default() {
        assert!(env_filter("NEUTRALITY_CHECK_TEST_UNSET_FILTER", "my_crate=notalevel").is_err());
    }
}
