//! fetch → clean → merge → transform → summarize → regress.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{SourceConfig, fred_api_key};
use crate::fetch::auth::{Header, UrlParam};
use crate::fetch::{HttpClient, is_remote};
use crate::regression::{NeutralityVerdict, Regression, run_models, verdicts};
use crate::series::{Frame, Period, Series};
use crate::sources::french::{FactorSet, fetch_factors};
use crate::sources::fred::fetch_series;
use crate::sources::funds::fetch_funds;
use crate::sources::market::fetch_prices;
use crate::summary::{ColumnSummary, CorrelationMatrix, correlation_matrix, summarize};
use crate::transform::{
    deflate, excess, inflation_from_index, monthly_rate_series, simple_returns,
};

/// Fewer aligned months than this still runs, with a warning.
const MIN_RECOMMENDED_MONTHS: usize = 36;

/// Everything downloaded, before any alignment.
#[derive(Debug, Clone)]
pub struct RawData {
    pub funds: Vec<Series>,
    /// Annualised, in percent.
    pub risk_free_pct: Series,
    pub cpi: Series,
    pub index_prices: Series,
    pub btc_prices: Series,
    pub eth_prices: Series,
    pub factors: FactorSet,
}

/// Downloads every source, one after another.
#[tracing::instrument(skip_all)]
pub async fn fetch_all<C: HttpClient>(client: &C, config: &SourceConfig) -> Result<RawData> {
    let start = config.start_period();
    let end = config.end_period();

    info!("Fetching fund returns");
    let funds = fetch_funds(client, &config.funds).await?;

    let fred_key = if is_remote(&config.fred.base_url) {
        fred_api_key()?
    } else {
        String::new()
    };
    let fred = UrlParam::fred(client, fred_key);

    info!(series = %config.fred.risk_free_series, "Fetching risk-free rate");
    let risk_free_pct = fetch_series(
        &fred,
        &config.fred.base_url,
        &config.fred.risk_free_series,
        start,
        "rf_pct",
    )
    .await?;

    // One extra month of CPI so the first in-window month has an inflation figure.
    let cpi_start = start.and_then(|p| {
        p.first_day()
            .checked_sub_months(chrono::Months::new(1))
            .map(Period::from_date)
    });
    info!(series = %config.fred.cpi_series, "Fetching CPI");
    let cpi = fetch_series(&fred, &config.fred.base_url, &config.fred.cpi_series, cpi_start, "cpi").await?;

    let market = Header::user_agent(client, &config.market.user_agent)?;
    let base = &config.market.base_url;

    info!(symbol = %config.market.index_symbol, "Fetching equity index");
    let index_prices = fetch_prices(&market, base, &config.market.index_symbol, cpi_start, end, "market_px").await?;

    info!(symbol = %config.market.btc_symbol, "Fetching bitcoin");
    let btc_prices = fetch_prices(&market, base, &config.market.btc_symbol, cpi_start, end, "btc_px").await?;

    info!(symbol = %config.market.eth_symbol, "Fetching ether");
    let eth_prices = fetch_prices(&market, base, &config.market.eth_symbol, cpi_start, end, "eth_px").await?;

    info!(url = %config.factors.url, "Fetching Fama-French factors");
    let factors = fetch_factors(client, &config.factors.url).await?;

    Ok(RawData {
        funds,
        risk_free_pct,
        cpi,
        index_prices,
        btc_prices,
        eth_prices,
        factors,
    })
}

/// Turns raw downloads into the aligned analysis dataset.
///
/// Prices become returns, the annual T-bill yield becomes a monthly rate,
/// CPI becomes monthly inflation, then excess and real excess returns are
/// derived and everything is inner-joined on month.
#[tracing::instrument(skip_all)]
pub fn build_dataset(raw: &RawData, config: &SourceConfig) -> Result<Frame> {
    let rf = monthly_rate_series(&raw.risk_free_pct, "rf", config.rate_convention);
    let inflation = inflation_from_index(&raw.cpi, "inflation");
    let market = simple_returns(&raw.index_prices, "market");
    let btc = simple_returns(&raw.btc_prices, "btc");
    let eth = simple_returns(&raw.eth_prices, "eth");

    let real_rf = deflate(&rf, &inflation, "rf_real");
    let real_market = deflate(&market, &inflation, "market_real");

    let mut columns: Vec<Series> = Vec::new();
    for fund in &raw.funds {
        columns.push(fund.clone());
    }
    columns.extend([rf.clone(), inflation.clone(), market.clone(), btc.clone(), eth.clone()]);
    columns.extend(raw.factors.all().into_iter().cloned());

    for fund in &raw.funds {
        columns.push(excess(fund, &rf, &format!("{}_excess", fund.name)));
    }
    columns.push(excess(&market, &rf, "market_excess"));
    columns.push(excess(&btc, &rf, "btc_excess"));
    columns.push(excess(&eth, &rf, "eth_excess"));

    for fund in &raw.funds {
        let real = deflate(fund, &inflation, "real");
        columns.push(excess(&real, &real_rf, &format!("{}_real_excess", fund.name)));
    }
    columns.push(excess(&real_market, &real_rf, "market_real_excess"));

    let (start, end) = (config.start_period(), config.end_period());
    let columns: Vec<Series> = columns.iter().map(|s| s.restrict(start, end)).collect();

    for s in &columns {
        if s.is_empty() {
            bail!("series '{}' has no observations in the requested window", s.name);
        }
    }

    let frame = Frame::inner_join(&columns).context("aligning sources")?;
    log_window(&frame);
    if let Some((start_by, end_by)) = limiting_columns(&columns) {
        info!(start_by, end_by, "Sample bounded by these columns");
    }
    Ok(frame)
}

/// Names of the columns that start last and end first, i.e. the ones that
/// bound the joined sample.
fn limiting_columns(columns: &[Series]) -> Option<(&str, &str)> {
    let start_by = columns
        .iter()
        .filter_map(|s| s.first_period().map(|p| (p, s.name.as_str())))
        .max_by_key(|(p, _)| *p)?;
    let end_by = columns
        .iter()
        .filter_map(|s| s.last_period().map(|p| (p, s.name.as_str())))
        .min_by_key(|(p, _)| *p)?;
    Some((start_by.1, end_by.1))
}

fn log_window(frame: &Frame) {
    let periods = frame.periods();
    if let (Some(first), Some(last)) = (periods.first(), periods.last()) {
        info!(
            start = %first,
            end = %last,
            months = frame.len(),
            columns = frame.names().count(),
            "Dataset aligned"
        );
    }
    if frame.len() < MIN_RECOMMENDED_MONTHS {
        warn!(months = frame.len(), "Short sample: regression inference will be weak");
    }
}

/// Fund labels in a dataset, recognised by their `<fund>_real_excess` column.
pub fn infer_funds(frame: &Frame) -> Vec<String> {
    frame
        .names()
        .filter_map(|n| n.strip_suffix("_real_excess"))
        .filter(|n| *n != "market")
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    pub start: Period,
    pub end: Period,
    pub observations: usize,
    pub significance: f64,
    pub summaries: Vec<ColumnSummary>,
    pub correlations: CorrelationMatrix,
    pub regressions: Vec<Regression>,
    pub verdicts: Vec<NeutralityVerdict>,
}

/// Columns that get descriptive statistics, after the funds.
const SUMMARY_COLUMNS: &[&str] = &["market", "btc", "eth", "rf", "inflation"];

/// Columns entering the correlation matrix, after the funds.
const CORRELATION_COLUMNS: &[&str] = &["market", "btc", "eth", "mkt_rf", "smb", "hml", "rmw", "cma"];

/// Summaries, correlations, the model set and the neutrality verdicts.
#[tracing::instrument(skip(frame), fields(months = frame.len()))]
pub fn analyze(frame: &Frame, funds: &[&str], significance: f64) -> Result<AnalysisReport> {
    let (Some(&start), Some(&end)) = (frame.periods().first(), frame.periods().last()) else {
        bail!("dataset is empty");
    };
    if funds.is_empty() {
        bail!("no funds to analyse");
    }

    let summary_cols: Vec<&str> = funds.iter().copied().chain(SUMMARY_COLUMNS.iter().copied()).collect();
    let corr_cols: Vec<&str> = funds.iter().copied().chain(CORRELATION_COLUMNS.iter().copied()).collect();

    let summaries = summarize(frame, &summary_cols);
    let correlations = correlation_matrix(frame, &corr_cols);
    let regressions = run_models(frame, funds)?;
    let verdicts = verdicts(&regressions, funds, significance);

    for v in &verdicts {
        info!(
            fund = %v.fund,
            beta = v.beta,
            beta_p_value = v.beta_p_value,
            alpha_annualized = v.alpha_annualized,
            market_neutral = v.market_neutral,
            factor_exposed = ?v.factor_exposed,
            "Neutrality verdict"
        );
    }

    Ok(AnalysisReport {
        generated_at: Utc::now(),
        start,
        end,
        observations: frame.len(),
        significance,
        summaries,
        correlations,
        regressions,
        verdicts,
    })
}
