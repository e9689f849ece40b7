//! FRED `series/observations` downloads (risk-free rate, CPI).

use anyhow::{Context, Result, bail};
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use crate::fetch::{HttpClient, is_remote, load_source};
use crate::series::{Period, Series};
use crate::sources::is_missing;

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    #[serde(default)]
    observations: Vec<Observation>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    date: String,
    value: String,
}

/// Decodes an observations payload. FRED writes missing values as `"."`.
pub fn parse_observations(bytes: &[u8], name: &str) -> Result<Series> {
    let resp: ObservationsResponse =
        serde_json::from_slice(bytes).context("decoding FRED observations")?;

    if let Some(msg) = resp.error_message {
        bail!("FRED error: {msg}");
    }

    let mut series = Series::new(name);
    let mut missing = 0usize;
    for obs in resp.observations {
        if is_missing(&obs.value) {
            missing += 1;
            continue;
        }
        let period = Period::parse(&obs.date)?;
        let value: f64 = obs
            .value
            .trim()
            .parse()
            .with_context(|| format!("invalid FRED value '{}' on {}", obs.value, obs.date))?;
        series.insert(period, value);
    }

    debug!(name, observations = series.len(), missing, "Parsed FRED series");
    Ok(series)
}

/// Request URL for a monthly series. The API key is added by the client.
pub fn observations_url(base_url: &str, series_id: &str, start: Option<Period>) -> Result<Url> {
    let mut url = Url::parse_with_params(
        base_url,
        &[
            ("series_id", series_id),
            ("file_type", "json"),
            ("frequency", "m"),
            ("aggregation_method", "avg"),
        ],
    )
    .with_context(|| format!("invalid FRED base URL '{base_url}'"))?;

    if let Some(start) = start {
        url.query_pairs_mut().append_pair(
            "observation_start",
            &start.first_day().format("%Y-%m-%d").to_string(),
        );
    }

    Ok(url)
}

/// Fetches one FRED series. A non-URL `base_url` is a directory of
/// `<series_id>.json` payloads.
#[tracing::instrument(skip(client, base_url, start))]
pub async fn fetch_series<C: HttpClient>(
    client: &C,
    base_url: &str,
    series_id: &str,
    start: Option<Period>,
    name: &str,
) -> Result<Series> {
    let location = if is_remote(base_url) {
        observations_url(base_url, series_id, start)?.to_string()
    } else {
        format!("{}/{}.json", base_url.trim_end_matches('/'), series_id)
    };

    let bytes = load_source(client, &location).await?;
    parse_observations(&bytes, name).with_context(|| format!("FRED series {series_id}"))
}
