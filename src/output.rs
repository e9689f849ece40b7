//! Output formatting and persistence for datasets and regression results.
//!
//! Supports text summaries for the terminal, pretty JSON, CSV dataset
//! round-trips, CSV coefficient append and gzip copies.

use anyhow::{Context, Result, bail};
use csv::WriterBuilder;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

use crate::pipeline::AnalysisReport;
use crate::regression::{NeutralityVerdict, Regression};
use crate::series::{Frame, Period};
use crate::summary::{ColumnSummary, CorrelationMatrix};

fn stars(p: f64) -> &'static str {
    match p {
        p if p < 0.001 => "***",
        p if p < 0.01 => "**",
        p if p < 0.05 => "*",
        p if p < 0.1 => ".",
        _ => "",
    }
}

fn fmt_p(p: f64) -> String {
    if p.is_nan() {
        "NA".to_string()
    } else if p < 2e-16 {
        "<2e-16".to_string()
    } else if p < 1e-4 {
        format!("{p:.2e}")
    } else {
        format!("{p:.4}")
    }
}

/// Coefficient table in the layout of a statistics package summary.
pub fn render_regression(reg: &Regression) -> String {
    let fit = &reg.fit;
    let mut out = String::new();

    let regressors: Vec<&str> = fit.coefficients[1..].iter().map(|c| c.name.as_str()).collect();
    let _ = writeln!(out, "== {} [{}]: {}", reg.fund, reg.model, reg.description);
    let _ = writeln!(out, "{} ~ {}", reg.dependent, regressors.join(" + "));
    let _ = writeln!(
        out,
        "{:<20} {:>12} {:>12} {:>9} {:>10}",
        "", "Estimate", "Std. Error", "t value", "Pr(>|t|)"
    );
    for c in &fit.coefficients {
        let _ = writeln!(
            out,
            "{:<20} {:>12.6} {:>12.6} {:>9.3} {:>10} {}",
            c.name,
            c.estimate,
            c.std_error,
            c.t_value,
            fmt_p(c.p_value),
            stars(c.p_value)
        );
    }
    let _ = writeln!(
        out,
        "Residual standard error: {:.6} on {} degrees of freedom",
        fit.residual_std_error, fit.df_residual
    );
    let _ = writeln!(
        out,
        "Multiple R-squared: {:.4}, Adjusted R-squared: {:.4}",
        fit.r_squared, fit.adj_r_squared
    );
    if let (Some(f), Some(p)) = (fit.f_statistic, fit.f_p_value) {
        let _ = writeln!(
            out,
            "F-statistic: {:.3} on {} and {} DF, p-value: {}",
            f,
            fit.coefficients.len() - 1,
            fit.df_residual,
            fmt_p(p)
        );
    }
    let _ = writeln!(out, "Observations: {}", fit.observations);
    out
}

pub fn render_summary(summaries: &[ColumnSummary]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<14} {:>5} {:>9} {:>9} {:>9} {:>9} {:>9} {:>8} {:>9}",
        "series", "n", "mean", "sd", "ann.mean", "ann.vol", "cagr", "sharpe", "max.dd"
    );
    for s in summaries {
        let sharpe = s
            .sharpe_ratio
            .map(|v| format!("{v:.2}"))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:<14} {:>5} {:>9.4} {:>9.4} {:>9.4} {:>9.4} {:>9.4} {:>8} {:>9.4}",
            s.name,
            s.observations,
            s.mean,
            s.stddev,
            s.annualized_mean,
            s.annualized_volatility,
            s.annualized_geometric,
            sharpe,
            s.max_drawdown
        );
    }
    out
}

pub fn render_correlations(matrix: &CorrelationMatrix) -> String {
    let mut out = String::new();
    let _ = write!(out, "{:<10}", "");
    for name in &matrix.names {
        let _ = write!(out, " {:>8.8}", name);
    }
    out.push('\n');
    for (name, row) in matrix.names.iter().zip(&matrix.values) {
        let _ = write!(out, "{:<10.10}", name);
        for v in row {
            match v {
                Some(v) => {
                    let _ = write!(out, " {:>8.3}", v);
                }
                None => {
                    let _ = write!(out, " {:>8}", "NA");
                }
            }
        }
        out.push('\n');
    }
    out
}

pub fn render_verdicts(verdicts: &[NeutralityVerdict], significance: f64) -> String {
    let mut out = String::new();
    for v in verdicts {
        let _ = writeln!(
            out,
            "{}: beta {:.3} (p = {}, {}), annual alpha {:.2}% (p = {}) -> {}",
            v.fund,
            v.beta,
            fmt_p(v.beta_p_value),
            v.market_model,
            v.alpha_annualized * 100.0,
            fmt_p(v.alpha_p_value),
            if v.market_neutral {
                "consistent with market neutrality"
            } else {
                "NOT market neutral"
            }
        );
        if let (Some(model), Some(p), Some(exposed)) =
            (&v.factor_model, v.factor_f_p_value, v.factor_exposed)
        {
            let _ = writeln!(
                out,
                "{}: {} joint F-test p = {} -> {}",
                v.fund,
                model,
                fmt_p(p),
                if exposed {
                    "significant factor exposure"
                } else {
                    "no significant factor exposure"
                }
            );
        }
    }
    let _ = writeln!(out, "(significance level {significance})");
    out
}

/// Full terminal report: summaries, correlations, every regression, verdicts.
pub fn render_report(report: &AnalysisReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Sample: {} to {} ({} months)\n",
        report.start, report.end, report.observations
    );
    out.push_str(&render_summary(&report.summaries));
    out.push('\n');
    out.push_str(&render_correlations(&report.correlations));
    for reg in &report.regressions {
        out.push('\n');
        out.push_str(&render_regression(reg));
    }
    out.push('\n');
    out.push_str(&render_verdicts(&report.verdicts, report.significance));
    out
}

/// Writes a value as pretty-printed JSON.
pub fn write_json(path: &str, value: &impl Serialize) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating '{path}'"))?;
    serde_json::to_writer_pretty(file, value)?;
    info!(path, "JSON written");
    Ok(())
}

/// Writes the aligned dataset with a `date` column followed by every column.
pub fn write_dataset_csv(path: &str, frame: &Frame) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("creating '{path}'"))?;

    let mut header = vec!["date".to_string()];
    header.extend(frame.names().map(str::to_string));
    writer.write_record(&header)?;

    for (period, values) in frame.rows() {
        let mut record = vec![period.to_string()];
        record.extend(values.iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;

    info!(path, months = frame.len(), "Dataset written");
    Ok(())
}

/// Reads a dataset written by [`write_dataset_csv`].
pub fn read_dataset_csv(path: &str) -> Result<Frame> {
    let mut rdr = csv::Reader::from_path(path).with_context(|| format!("opening '{path}'"))?;

    let headers = rdr.headers()?.clone();
    if headers.get(0) != Some("date") {
        bail!("'{path}' does not start with a date column");
    }
    let names: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut periods = Vec::new();
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); names.len()];

    for (row, record) in rdr.records().enumerate() {
        let record = record?;
        periods.push(Period::parse(&record[0]).with_context(|| format!("row {}", row + 2))?);
        for (i, col) in columns.iter_mut().enumerate() {
            let raw = record.get(i + 1).unwrap_or("");
            let v: f64 = raw
                .trim()
                .parse()
                .with_context(|| format!("row {} column '{}': '{raw}'", row + 2, names[i]))?;
            col.push(v);
        }
    }

    debug!(path, months = periods.len(), columns = names.len(), "Dataset read");
    Frame::from_columns(periods, names.into_iter().zip(columns).collect())
}

#[derive(Debug, Serialize)]
struct CoefficientRow<'a> {
    generated_at: String,
    fund: &'a str,
    model: &'a str,
    term: &'a str,
    estimate: f64,
    std_error: f64,
    t_value: f64,
    p_value: f64,
    r_squared: f64,
    observations: usize,
}

/// Appends one row per coefficient to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_coefficients(path: &str, report: &AnalysisReport) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, "Appending coefficient rows");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    let generated_at = report.generated_at.to_rfc3339();
    for reg in &report.regressions {
        for c in &reg.fit.coefficients {
            writer.serialize(CoefficientRow {
                generated_at: generated_at.clone(),
                fund: &reg.fund,
                model: &reg.model,
                term: &c.name,
                estimate: c.estimate,
                std_error: c.std_error,
                t_value: c.t_value,
                p_value: c.p_value,
                r_squared: reg.fit.r_squared,
                observations: reg.fit.observations,
            })?;
        }
    }
    writer.flush()?;

    Ok(())
}

/// Writes a gzip-compressed copy of `path` to `<path>.gz`.
pub fn gzip_file(path: &str) -> Result<String> {
    let contents = std::fs::read(path).with_context(|| format!("reading '{path}'"))?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&contents)?;
    let compressed = encoder.finish()?;

    let target = format!("{path}.gz");
    std::fs::write(&target, compressed).with_context(|| format!("writing '{target}'"))?;
    info!(path = %target, "Compressed copy written");
    Ok(target)
}
