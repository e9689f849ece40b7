//! Descriptive statistics for the aligned dataset.

use serde::Serialize;

use crate::series::Frame;

pub const MONTHS_PER_YEAR: f64 = 12.0;

/// Computes the arithmetic mean of a slice of values. Returns 0.0 for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Computes the sample (n - 1) standard deviation given a pre-computed mean.
/// Returns 0.0 for fewer than two values.
pub fn stddev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;

    variance.sqrt()
}

/// Compound annual growth rate of a monthly return series.
pub fn annualized_geometric(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let growth: f64 = returns.iter().map(|r| 1.0 + r).product();
    if growth <= 0.0 {
        return -1.0;
    }
    growth.powf(MONTHS_PER_YEAR / returns.len() as f64) - 1.0
}

/// Largest peak-to-trough fall of the cumulative wealth index, as a
/// negative fraction (or 0.0 when the series never falls).
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut wealth = 1.0;
    let mut peak = 1.0;
    let mut worst = 0.0_f64;

    for r in returns {
        wealth *= 1.0 + r;
        peak = f64::max(peak, wealth);
        worst = worst.min(wealth / peak - 1.0);
    }

    worst
}

/// Pearson correlation. Returns `None` when either side has no variance.
pub fn correlation(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let (a, b) = (&a[..n], &b[..n]);
    let (ma, mb) = (mean(a), mean(b));

    let cov: f64 = a.iter().zip(b).map(|(x, y)| (x - ma) * (y - mb)).sum();
    let va: f64 = a.iter().map(|x| (x - ma).powi(2)).sum();
    let vb: f64 = b.iter().map(|y| (y - mb).powi(2)).sum();

    if va < 1e-300 || vb < 1e-300 {
        return None;
    }
    Some(cov / (va.sqrt() * vb.sqrt()))
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub observations: usize,
    pub mean: f64,
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
    pub annualized_mean: f64,
    pub annualized_volatility: f64,
    pub annualized_geometric: f64,
    /// Only present when the frame carries a `<name>_excess` column.
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown: f64,
}

impl ColumnSummary {
    pub fn from_values(name: &str, values: &[f64]) -> Self {
        let m = mean(values);
        let sd = stddev(values, m);

        ColumnSummary {
            name: name.to_string(),
            observations: values.len(),
            mean: m,
            stddev: sd,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            annualized_mean: m * MONTHS_PER_YEAR,
            annualized_volatility: sd * MONTHS_PER_YEAR.sqrt(),
            annualized_geometric: annualized_geometric(values),
            sharpe_ratio: None,
            max_drawdown: max_drawdown(values),
        }
    }

    /// Sets the annualised Sharpe ratio from the matching excess-return column.
    pub fn with_excess(mut self, excess: &[f64]) -> Self {
        let m = mean(excess);
        let vol = stddev(excess, m) * MONTHS_PER_YEAR.sqrt();
        self.sharpe_ratio = (vol > 0.0).then(|| m * MONTHS_PER_YEAR / vol);
        self
    }
}

/// Summaries for the requested columns, or every column when `columns` is empty.
pub fn summarize(frame: &Frame, columns: &[&str]) -> Vec<ColumnSummary> {
    let names: Vec<&str> = if columns.is_empty() {
        frame.names().collect()
    } else {
        columns.to_vec()
    };

    names
        .into_iter()
        .filter_map(|name| {
            let values = frame.column(name)?;
            let summary = ColumnSummary::from_values(name, values);
            Some(match frame.column(&format!("{name}_excess")) {
                Some(excess) => summary.with_excess(excess),
                None => summary,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrelationMatrix {
    pub names: Vec<String>,
    /// Row-major; `None` where a column has no variance.
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.names.iter().position(|n| n == a)?;
        let j = self.names.iter().position(|n| n == b)?;
        self.values[i][j]
    }
}

pub fn correlation_matrix(frame: &Frame, columns: &[&str]) -> CorrelationMatrix {
    let names: Vec<String> = columns
        .iter()
        .filter(|c| frame.column(c).is_some())
        .map(|c| c.to_string())
        .collect();

    let values = names
        .iter()
        .map(|a| {
            names
                .iter()
                .map(|b| correlation(frame.column(a)?, frame.column(b)?))
                .collect()
        })
        .collect();

    CorrelationMatrix { names, values }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::{Period, Series};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_mean_and_stddev() {
        let v = [0.01, 0.02, 0.03, 0.04];
        let m = mean(&v);
        assert!(approx(m, 0.025));
        // sample variance = 0.0005 / 3
        assert!(approx(stddev(&v, m), (0.0005_f64 / 3.0).sqrt()));
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(stddev(&[1.0], 1.0), 0.0);
    }

    #[test]
    fn test_annualization() {
        let v = [0.01; 12];
        let s = ColumnSummary::from_values("x", &v);

        assert!(approx(s.annualized_mean, 0.12));
        assert!(approx(s.annualized_volatility, 0.0));
        assert!(approx(s.annualized_geometric, 1.01_f64.powi(12) - 1.0));
        assert_eq!(s.max_drawdown, 0.0);
    }

    #[test]
    fn test_annualized_geometric_total_loss() {
        assert_eq!(annualized_geometric(&[0.1, -1.0]), -1.0);
    }

    #[test]
    fn test_max_drawdown() {
        // 1.0 -> 1.1 -> 0.55 -> 0.66
        let dd = max_drawdown(&[0.10, -0.50, 0.20]);
        assert!(approx(dd, -0.5));
    }

    #[test]
    fn test_correlation() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [2.0, 4.0, 6.0, 8.0];
        let c = [4.0, 3.0, 2.0, 1.0];
        assert!(approx(correlation(&a, &b).unwrap(), 1.0));
        assert!(approx(correlation(&a, &c).unwrap(), -1.0));
        assert_eq!(correlation(&a, &[1.0, 1.0, 1.0, 1.0]), None);
    }

    #[test]
    fn test_summarize_uses_excess_column_for_sharpe() {
        let p = |m| Period::new(2020, m).unwrap();
        let fund = Series::from_points("fund", [(p(1), 0.02), (p(2), 0.00), (p(3), 0.04)]);
        let excess = Series::from_points("fund_excess", [(p(1), 0.01), (p(2), -0.01), (p(3), 0.03)]);
        let frame = Frame::inner_join(&[fund, excess]).unwrap();

        let summaries = summarize(&frame, &["fund", "missing"]);
        assert_eq!(summaries.len(), 1);

        let s = &summaries[0];
        let vol = 0.02 * 12.0_f64.sqrt();
        assert!(approx(s.sharpe_ratio.unwrap(), 0.01 * 12.0 / vol));

        let all = summarize(&frame, &[]);
        assert_eq!(all.len(), 2);
        assert!(all[1].sharpe_ratio.is_none());
    }

    #[test]
    fn test_correlation_matrix() {
        let p = |m| Period::new(2020, m).unwrap();
        let a = Series::from_points("a", [(p(1), 1.0), (p(2), 2.0), (p(3), 3.0)]);
        let b = Series::from_points("b", [(p(1), 3.0), (p(2), 2.0), (p(3), 1.0)]);
        let frame = Frame::inner_join(&[a, b]).unwrap();

        let m = correlation_matrix(&frame, &["a", "b", "nope"]);
        assert_eq!(m.names, vec!["a", "b"]);
        assert!(approx(m.get("a", "a").unwrap(), 1.0));
        assert!(approx(m.get("a", "b").unwrap(), -1.0));
        assert_eq!(m.get("a", "nope"), None);
    }
}
