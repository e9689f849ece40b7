//! Fama-French factor archive.
//!
//! The data library ships each factor file as a zip holding one CSV. The CSV
//! opens with a few lines of prose, then a header row starting with a comma
//! (`,Mkt-RF,SMB,HML,RMW,CMA,RF`), then monthly `YYYYMM` rows in percent. An
//! annual block follows after a blank line; it is ignored.

use anyhow::{Context, Result, anyhow, bail};
use std::io::{Cursor, Read};
use tracing::debug;

use crate::fetch::{HttpClient, load_source};
use crate::series::{Period, Series};

/// The data library's sentinel for a missing observation.
const MISSING_SENTINELS: &[f64] = &[-99.99, -999.0];

/// Monthly factor returns as decimals. `rmw`/`cma` exist only in the
/// five-factor files.
#[derive(Debug, Clone)]
pub struct FactorSet {
    pub mkt_rf: Series,
    pub smb: Series,
    pub hml: Series,
    pub rmw: Option<Series>,
    pub cma: Option<Series>,
    pub rf: Option<Series>,
}

impl FactorSet {
    pub fn all(&self) -> Vec<&Series> {
        let mut out = vec![&self.mkt_rf, &self.smb, &self.hml];
        out.extend(self.rmw.iter());
        out.extend(self.cma.iter());
        out
    }
}

/// Returns the CSV text, unpacking it first when `bytes` is a zip archive.
pub fn extract_csv(bytes: &[u8]) -> Result<String> {
    if !bytes.starts_with(b"PK\x03\x04") {
        return Ok(String::from_utf8_lossy(bytes).into_owned());
    }

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).context("opening factor archive")?;

    let name = archive
        .file_names()
        .find(|n| n.to_ascii_lowercase().ends_with(".csv"))
        .map(str::to_string)
        .ok_or_else(|| anyhow!("factor archive contains no CSV"))?;

    let mut file = archive.by_name(&name)?;
    debug!(entry = file.name(), size = file.size(), "Extracting factor CSV");

    let mut raw = Vec::new();
    file.read_to_end(&mut raw)?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

fn is_month_key(s: &str) -> bool {
    s.len() == 6 && s.bytes().all(|b| b.is_ascii_digit())
}

/// Parses the monthly block of a factor CSV.
pub fn parse_factors(text: &str) -> Result<FactorSet> {
    let mut lines = text.lines();

    let header: Vec<String> = lines
        .by_ref()
        .find(|l| l.trim_start().starts_with(',') && l.contains("Mkt-RF"))
        .ok_or_else(|| anyhow!("factor file has no ',Mkt-RF,...' header"))?
        .split(',')
        .map(|h| h.trim().to_string())
        .collect();

    let col = |name: &str| header.iter().position(|h| h == name);
    let required = |name: &str| col(name).ok_or_else(|| anyhow!("factor file lacks column '{name}'"));

    let mkt = required("Mkt-RF")?;
    let smb = required("SMB")?;
    let hml = required("HML")?;
    let rmw = col("RMW");
    let cma = col("CMA");
    let rf = col("RF");

    let mut set = FactorSet {
        mkt_rf: Series::new("mkt_rf"),
        smb: Series::new("smb"),
        hml: Series::new("hml"),
        rmw: rmw.map(|_| Series::new("rmw")),
        cma: cma.map(|_| Series::new("cma")),
        rf: rf.map(|_| Series::new("ff_rf")),
    };

    for line in lines {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if !is_month_key(fields[0]) {
            break;
        }
        let period = Period::parse(fields[0])?;

        let value = |idx: usize| -> Result<Option<f64>> {
            let raw = fields.get(idx).copied().unwrap_or("");
            if raw.is_empty() {
                return Ok(None);
            }
            let v: f64 = raw
                .parse()
                .with_context(|| format!("invalid factor value '{raw}' in {period}"))?;
            Ok((!MISSING_SENTINELS.contains(&v)).then_some(v / 100.0))
        };

        let targets = [
            (Some(mkt), Some(&mut set.mkt_rf)),
            (Some(smb), Some(&mut set.smb)),
            (Some(hml), Some(&mut set.hml)),
            (rmw, set.rmw.as_mut()),
            (cma, set.cma.as_mut()),
            (rf, set.rf.as_mut()),
        ];
        for (idx, series) in targets {
            if let (Some(idx), Some(series)) = (idx, series) {
                if let Some(v) = value(idx)? {
                    series.insert(period, v);
                }
            }
        }
    }

    if set.mkt_rf.is_empty() {
        bail!("factor file has no monthly rows");
    }

    debug!(
        months = set.mkt_rf.len(),
        five_factor = set.rmw.is_some() && set.cma.is_some(),
        "Parsed factor file"
    );
    Ok(set)
}

#[tracing::instrument(skip(client))]
pub async fn fetch_factors<C: HttpClient>(client: &C, url: &str) -> Result<FactorSet> {
    let bytes = load_source(client, url).await?;
    let text = extract_csv(&bytes)?;
    parse_factors(&text).with_context(|| format!("parsing factors from '{url}'"))
}
