//! Monthly price history from the market-data chart endpoint.

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use crate::fetch::{HttpClient, is_remote, load_source};
use crate::series::{Period, Series};

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
    #[serde(default)]
    adjclose: Vec<AdjClose>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

/// Decodes a chart payload into a price-level series, preferring adjusted
/// closes. Null prices are treated as missing.
pub fn parse_chart(bytes: &[u8], name: &str) -> Result<Series> {
    let resp: ChartResponse = serde_json::from_slice(bytes).context("decoding chart payload")?;

    if let Some(err) = resp.chart.error {
        bail!(
            "chart error {}: {}",
            err.code.unwrap_or_default(),
            err.description.unwrap_or_default()
        );
    }

    let result = resp
        .chart
        .result
        .and_then(|mut r| (!r.is_empty()).then(|| r.swap_remove(0)))
        .ok_or_else(|| anyhow!("chart payload has no result"))?;

    let prices = match result.indicators.adjclose.into_iter().next() {
        Some(adj) if !adj.adjclose.is_empty() => adj.adjclose,
        _ => result
            .indicators
            .quote
            .into_iter()
            .next()
            .map(|q| q.close)
            .unwrap_or_default(),
    };

    if prices.len() != result.timestamp.len() {
        bail!(
            "chart has {} timestamps but {} prices",
            result.timestamp.len(),
            prices.len()
        );
    }

    let mut series = Series::new(name);
    for (ts, price) in result.timestamp.iter().zip(prices) {
        let (Some(price), Some(period)) = (price, Period::from_timestamp(*ts)) else {
            continue;
        };
        series.insert(period, price);
    }

    debug!(name, observations = series.len(), "Parsed chart");
    Ok(series)
}

/// Monthly chart URL for `symbol` between `start` and now (or `end`).
pub fn chart_url(base_url: &str, symbol: &str, start: Option<Period>, end: Option<Period>) -> Result<Url> {
    let mut url = Url::parse(base_url).with_context(|| format!("invalid chart base URL '{base_url}'"))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("chart base URL '{base_url}' cannot take a path"))?
        .pop_if_empty()
        .push(symbol);

    let period1 = start
        .and_then(|p| p.first_day().and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0);
    let period2 = end
        .and_then(|p| p.first_day().checked_add_months(chrono::Months::new(1)))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_else(|| Utc::now().timestamp());

    url.query_pairs_mut()
        .append_pair("interval", "1mo")
        .append_pair("period1", &period1.to_string())
        .append_pair("period2", &period2.to_string())
        .append_pair("events", "div,splits");

    Ok(url)
}

/// Fetches the monthly price series for `symbol`. A non-URL `base_url` is a
/// directory of `<symbol>.json` payloads.
#[tracing::instrument(skip(client, base_url, start, end))]
pub async fn fetch_prices<C: HttpClient>(
    client: &C,
    base_url: &str,
    symbol: &str,
    start: Option<Period>,
    end: Option<Period>,
    name: &str,
) -> Result<Series> {
    let location = if is_remote(base_url) {
        chart_url(base_url, symbol, start, end)?.to_string()
    } else {
        format!("{}/{}.json", base_url.trim_end_matches('/'), symbol)
    };

    let bytes = load_source(client, &location).await?;
    parse_chart(&bytes, name).with_context(|| format!("prices for {symbol}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2020-01-01, 2020-02-01, 2020-03-01, 2020-03-13 (intramonth last bar)
    const SAMPLE: &str = r#"{"chart":{"result":[{
        "meta":{"currency":"USD","symbol":"^GSPC"},
        "timestamp":[1577836800,1580515200,1583020800,1584057600],
        "indicators":{
            "quote":[{"close":[3225.52,2954.22,null,2711.02]}],
            "adjclose":[{"adjclose":[3225.52,2954.22,null,2711.02]}]
        }}],"error":null}}"#;

    #[test]
    fn test_parse_chart() {
        let s = parse_chart(SAMPLE.as_bytes(), "market_px").unwrap();

        assert_eq!(s.len(), 3);
        assert_eq!(s.get(Period::new(2020, 1).unwrap()), Some(3225.52));
        // null bar skipped, later bar in the same month kept
        assert_eq!(s.get(Period::new(2020, 3).unwrap()), Some(2711.02));
    }

    #[test]
    fn test_parse_chart_falls_back_to_close() {
        let body = r#"{"chart":{"result":[{"timestamp":[1577836800],
            "indicators":{"quote":[{"close":[10.0]}]}}],"error":null}}"#;
        let s = parse_chart(body.as_bytes(), "x").unwrap();
        assert_eq!(s.get(Period::new(2020, 1).unwrap()), Some(10.0));
    }

    #[test]
    fn test_parse_chart_error() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = parse_chart(body.as_bytes(), "x").unwrap_err();
        assert!(err.to_string().contains("delisted"));
    }

    #[test]
    fn test_parse_chart_length_mismatch() {
        let body = r#"{"chart":{"result":[{"timestamp":[1577836800,1580515200],
            "indicators":{"quote":[{"close":[10.0]}]}}],"error":null}}"#;
        assert!(parse_chart(body.as_bytes(), "x").is_err());
    }

    #[test]
    fn test_chart_url_encodes_symbol() {
        let url = chart_url(
            "https://query1.finance.yahoo.com/v8/finance/chart",
            "^GSPC",
            Period::new(2020, 1),
            Period::new(2020, 12),
        )
        .unwrap();

        let segments: Vec<_> = url.path_segments().unwrap().collect();
        assert_eq!(segments[segments.len() - 2], "chart");
        assert!(["^GSPC", "%5EGSPC"].contains(&segments[segments.len() - 1]));
        let q: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(q.contains(&("interval".into(), "1mo".into())));
        assert!(q.contains(&("period1".into(), "1577836800".into())));
        // 2021-01-01T00:00:00Z
        assert!(q.contains(&("period2".into(), "1609459200".into())));
    }
}
