//! Hedge fund return sheets.
//!
//! A CSV with one date column and one column per fund. Returns may be
//! decimals (`0.012`), percentages (`1.2%`, or bare numbers when the source
//! is configured as percent), or accounting negatives (`(0.4%)`).

use anyhow::{Context, Result, anyhow, bail};
use csv::{ReaderBuilder, Trim};
use tracing::{debug, warn};

use crate::config::{FundColumn, FundSource};
use crate::fetch::{HttpClient, load_source};
use crate::series::{Period, Series};
use crate::sources::is_missing;

/// Parses one fund return cell. `Ok(None)` for a missing value.
pub fn parse_return(raw: &str, percent: bool) -> Result<Option<f64>> {
    if is_missing(raw) {
        return Ok(None);
    }

    let mut s = raw.trim();
    let mut negative = false;
    if let Some(inner) = s.strip_prefix('(').and_then(|x| x.strip_suffix(')')) {
        negative = true;
        s = inner.trim();
    }

    let (s, pct) = match s.strip_suffix('%') {
        Some(rest) => (rest.trim(), true),
        None => (s, percent),
    };

    let mut value: f64 = s
        .replace(',', "")
        .parse()
        .map_err(|_| anyhow!("invalid return value '{raw}'"))?;

    if pct {
        value /= 100.0;
    }
    if negative {
        value = -value;
    }

    Ok(Some(value))
}

fn find_date_column(headers: &csv::StringRecord, configured: Option<&str>) -> Result<usize> {
    match configured {
        Some(name) => headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| anyhow!("date column '{name}' not found")),
        None => Ok(headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case("date"))
            .unwrap_or(0)),
    }
}

/// Parses the fund sheet into one return series per configured fund, named
/// by the fund's label.
///
/// Rows whose date cannot be read (footnotes, blank trailers) are skipped.
pub fn parse_funds(
    bytes: &[u8],
    date_column: Option<&str>,
    percent: bool,
    funds: &[FundColumn],
) -> Result<Vec<Series>> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(bytes);

    let headers = rdr.headers()?.clone();
    let date_idx = find_date_column(&headers, date_column)?;

    let indices = funds
        .iter()
        .map(|f| {
            headers.iter().position(|h| h == f.column).ok_or_else(|| {
                let available: Vec<_> = headers.iter().collect();
                anyhow!(
                    "fund column '{}' not found (available: {})",
                    f.column,
                    available.join(", ")
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut series: Vec<Series> = funds.iter().map(|f| Series::new(f.label.clone())).collect();
    let mut skipped = 0usize;

    for (row, record) in rdr.records().enumerate() {
        let record = record?;
        let Some(raw_date) = record.get(date_idx) else {
            skipped += 1;
            continue;
        };
        let period = match Period::parse(raw_date) {
            Ok(p) => p,
            Err(e) => {
                debug!(row = row + 2, error = %e, "Skipping fund row without a date");
                skipped += 1;
                continue;
            }
        };

        for (s, &idx) in series.iter_mut().zip(&indices) {
            let raw = record.get(idx).unwrap_or("");
            let value = parse_return(raw, percent)
                .with_context(|| format!("row {} column '{}'", row + 2, &headers[idx]))?;
            if let Some(v) = value {
                s.insert(period, v);
            }
        }
    }

    if skipped > 0 {
        warn!(skipped, "Fund rows skipped for unreadable dates");
    }
    for s in &series {
        if s.is_empty() {
            bail!("fund '{}' has no observations", s.name);
        }
    }

    Ok(series)
}

#[tracing::instrument(skip_all, fields(url = %source.url))]
pub async fn fetch_funds<C: HttpClient>(client: &C, source: &FundSource) -> Result<Vec<Series>> {
    let bytes = load_source(client, &source.url).await?;
    parse_funds(
        &bytes,
        source.date_column.as_deref(),
        source.percent,
        &source.columns,
    )
    .with_context(|| format!("parsing fund returns from '{}'", source.url))
}
