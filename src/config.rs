//! Data-source configuration.
//!
//! Stored as a JSON file on disk; every field has a default, so an empty
//! object `{}` is a valid config:
//! ```json
//! {
//!   "funds": {
//!     "url": "https://example.com/hedge_funds.csv",
//!     "columns": [
//!       { "column": "Alpha Partners", "label": "alpha" },
//!       { "column": "Beta Capital", "label": "beta" }
//!     ]
//!   },
//!   "start": "2015-01-01",
//!   "significance": 0.05
//! }
//! ```
//!
//! Source locations that are not `http(s)` URLs are read from disk: the fund
//! and factor sources as files, the FRED and market sources as directories
//! holding `<series>.json` files.

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::series::Period;
use crate::transform::RateConvention;

pub const FRED_API_KEY_ENV: &str = "FRED_API_KEY";

/// Column names produced by the pipeline; fund labels may not reuse them.
pub const RESERVED_COLUMNS: &[&str] = &[
    "date", "rf", "inflation", "market", "btc", "eth", "mkt_rf", "smb", "hml", "rmw", "cma",
    "market_excess", "btc_excess", "eth_excess", "market_real_excess",
];

/// Suffixes appended to each fund label for its derived columns.
const FUND_SUFFIXES: &[&str] = &["_excess", "_real_excess"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundColumn {
    /// Header of the column in the downloaded CSV.
    pub column: String,
    /// Name used for the fund in the dataset and reports.
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FundSource {
    pub url: String,
    /// Defaults to a column named `date`/`Date`, else the first column.
    pub date_column: Option<String>,
    /// Values are percentages even without a `%` suffix.
    pub percent: bool,
    pub columns: Vec<FundColumn>,
}

impl Default for FundSource {
    fn default() -> Self {
        Self {
            url: "data/hedge_funds.csv".to_string(),
            date_column: None,
            percent: false,
            columns: vec![
                FundColumn {
                    column: "fund_a".to_string(),
                    label: "fund_a".to_string(),
                },
                FundColumn {
                    column: "fund_b".to_string(),
                    label: "fund_b".to_string(),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FredSource {
    pub base_url: String,
    /// Annualised yield in percent, e.g. the 3-month T-bill.
    pub risk_free_series: String,
    /// Price index used for inflation.
    pub cpi_series: String,
}

impl Default for FredSource {
    fn default() -> Self {
        Self {
            base_url: "https://api.stlouisfed.org/fred/series/observations".to_string(),
            risk_free_series: "TB3MS".to_string(),
            cpi_series: "CPIAUCSL".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSource {
    pub base_url: String,
    pub index_symbol: String,
    pub btc_symbol: String,
    pub eth_symbol: String,
    pub user_agent: String,
}

impl Default for MarketSource {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com/v8/finance/chart".to_string(),
            index_symbol: "^GSPC".to_string(),
            btc_symbol: "BTC-USD".to_string(),
            eth_symbol: "ETH-USD".to_string(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64)".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorSource {
    pub url: String,
}

impl Default for FactorSource {
    fn default() -> Self {
        Self {
            url: "https://mba.tuck.dartmouth.edu/pages/faculty/ken.french/ftp/F-F_Research_Data_5_Factors_2x3_CSV.zip"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub funds: FundSource,
    pub fred: FredSource,
    pub market: MarketSource,
    pub factors: FactorSource,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub rate_convention: RateConvention,
    pub significance: f64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            funds: FundSource::default(),
            fred: FredSource::default(),
            market: MarketSource::default(),
            factors: FactorSource::default(),
            start: None,
            end: None,
            rate_convention: RateConvention::default(),
            significance: 0.05,
        }
    }
}

impl SourceConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading config '{path}'"))?;
        let config: Self =
            serde_json::from_str(&content).with_context(|| format!("parsing config '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise the built-in defaults.
    pub fn load_or_default(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.funds.columns.is_empty() {
            bail!("at least one fund column must be configured");
        }

        let mut columns = HashSet::new();
        let mut labels = HashSet::new();
        for fund in &self.funds.columns {
            let label = fund.label.as_str();
            if label.is_empty() || label.contains(char::is_whitespace) {
                bail!("fund label '{label}' must be a non-empty word");
            }
            // `<label>_real_excess` must map back to exactly one label.
            if label.ends_with("_real") || label.ends_with("_excess") {
                bail!("fund label '{label}' may not end in '_real' or '_excess'");
            }
            let derived = FUND_SUFFIXES.iter().map(|suffix| format!("{label}{suffix}"));
            if let Some(clash) = std::iter::once(label.to_string())
                .chain(derived)
                .find(|name| RESERVED_COLUMNS.contains(&name.as_str()))
            {
                bail!("fund label '{label}' clashes with dataset column '{clash}'");
            }
            if !columns.insert(fund.column.as_str()) {
                bail!("fund column '{}' is configured twice", fund.column);
            }
            if !labels.insert(label) {
                bail!("fund label '{label}' is configured twice");
            }
        }

        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                bail!("start {start} is after end {end}");
            }
        }

        if !(self.significance > 0.0 && self.significance < 1.0) {
            bail!("significance {} must lie in (0, 1)", self.significance);
        }

        Ok(())
    }

    pub fn fund_labels(&self) -> Vec<&str> {
        self.funds.columns.iter().map(|f| f.label.as_str()).collect()
    }

    pub fn start_period(&self) -> Option<Period> {
        self.start.map(Period::from_date)
    }

    pub fn end_period(&self) -> Option<Period> {
        self.end.map(Period::from_date)
    }
}

/// Reads the FRED API key from the environment (after `.env` is loaded).
pub fn fred_api_key() -> Result<String> {
    std::env::var(FRED_API_KEY_ENV).with_context(|| format!("{FRED_API_KEY_ENV} must be set"))
}
