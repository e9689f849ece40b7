//! Return arithmetic applied between download and alignment.

use serde::{Deserialize, Serialize};

use crate::series::{Period, Series};

/// How an annualised percentage rate is spread over twelve months.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateConvention {
    /// `(1 + r)^(1/12) - 1`
    #[default]
    Compound,
    /// `r / 12`
    Simple,
}

/// Month-over-month simple returns of a price or index level.
///
/// Only consecutive calendar months are differenced, so a gap in the levels
/// produces a gap in the returns rather than a multi-month return.
pub fn simple_returns(levels: &Series, name: &str) -> Series {
    let mut out = Series::new(name);
    let mut prev: Option<(Period, f64)> = None;

    for (period, level) in levels.iter() {
        if let Some((prev_period, prev_level)) = prev {
            if is_next_month(prev_period, period) && prev_level > 0.0 {
                out.insert(period, level / prev_level - 1.0);
            }
        }
        prev = Some((period, level));
    }

    out
}

fn is_next_month(a: Period, b: Period) -> bool {
    let months = |p: Period| p.year() as i64 * 12 + p.month() as i64;
    months(b) - months(a) == 1
}

/// Converts one annualised rate quoted in percent to a monthly decimal rate.
pub fn annual_rate_to_monthly(rate_pct: f64, convention: RateConvention) -> f64 {
    let annual = rate_pct / 100.0;
    match convention {
        RateConvention::Compound => (1.0 + annual).powf(1.0 / 12.0) - 1.0,
        RateConvention::Simple => annual / 12.0,
    }
}

/// Applies [`annual_rate_to_monthly`] to every observation.
pub fn monthly_rate_series(rates_pct: &Series, name: &str, convention: RateConvention) -> Series {
    Series::from_points(
        name,
        rates_pct
            .iter()
            .map(|(p, r)| (p, annual_rate_to_monthly(r, convention))),
    )
}

/// Monthly inflation from a price index such as CPI.
pub fn inflation_from_index(index: &Series, name: &str) -> Series {
    simple_returns(index, name)
}

/// Real return: `(1 + r) / (1 + π) - 1` on the months both series cover.
pub fn deflate(nominal: &Series, inflation: &Series, name: &str) -> Series {
    combine(nominal, inflation, name, |r, pi| (1.0 + r) / (1.0 + pi) - 1.0)
}

/// Risk premium: asset return minus the risk-free rate.
pub fn excess(asset: &Series, risk_free: &Series, name: &str) -> Series {
    combine(asset, risk_free, name, |r, rf| r - rf)
}

pub fn scale(series: &Series, factor: f64, name: &str) -> Series {
    Series::from_points(name, series.iter().map(|(p, v)| (p, v * factor)))
}

fn combine(a: &Series, b: &Series, name: &str, f: impl Fn(f64, f64) -> f64) -> Series {
    Series::from_points(
        name,
        a.iter()
            .filter_map(|(p, x)| b.get(p).map(|y| (p, f(x, y)))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(year: i32, month: u32) -> Period {
        Period::new(year, month).unwrap()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_simple_returns() {
        let prices = Series::from_points("px", [(p(2020, 1), 100.0), (p(2020, 2), 110.0), (p(2020, 3), 99.0)]);
        let r = simple_returns(&prices, "r");

        assert_eq!(r.len(), 2);
        assert_eq!(r.get(p(2020, 1)), None);
        assert!(approx(r.get(p(2020, 2)).unwrap(), 0.10));
        assert!(approx(r.get(p(2020, 3)).unwrap(), -0.10));
    }

    #[test]
    fn test_simple_returns_skip_gaps_and_zero_levels() {
        let prices = Series::from_points(
            "px",
            [
                (p(2020, 1), 100.0),
                (p(2020, 3), 120.0),
                (p(2020, 4), 0.0),
                (p(2020, 5), 10.0),
            ],
        );
        let r = simple_returns(&prices, "r");

        // Feb missing: no Mar return. Apr level 0: no May return.
        assert_eq!(r.get(p(2020, 3)), None);
        assert!(approx(r.get(p(2020, 4)).unwrap(), -1.0));
        assert_eq!(r.get(p(2020, 5)), None);
    }

    #[test]
    fn test_simple_returns_across_year_boundary() {
        let prices = Series::from_points("px", [(p(2019, 12), 50.0), (p(2020, 1), 55.0)]);
        let r = simple_returns(&prices, "r");
        assert!(approx(r.get(p(2020, 1)).unwrap(), 0.10));
    }

    #[test]
    fn test_annual_rate_to_monthly() {
        let compound = annual_rate_to_monthly(12.0, RateConvention::Compound);
        assert!(approx((1.0 + compound).powi(12), 1.12));
        assert!(approx(annual_rate_to_monthly(12.0, RateConvention::Simple), 0.01));
        assert_eq!(annual_rate_to_monthly(0.0, RateConvention::Compound), 0.0);
    }

    #[test]
    fn test_deflate() {
        let nominal = Series::from_points("n", [(p(2020, 1), 0.05), (p(2020, 2), 0.01)]);
        let inflation = Series::from_points("i", [(p(2020, 1), 0.05)]);
        let real = deflate(&nominal, &inflation, "real");

        assert_eq!(real.len(), 1);
        assert!(approx(real.get(p(2020, 1)).unwrap(), 0.0));
    }

    #[test]
    fn test_excess() {
        let asset = Series::from_points("a", [(p(2020, 1), 0.03), (p(2020, 2), -0.01)]);
        let rf = Series::from_points("rf", [(p(2020, 1), 0.001), (p(2020, 2), 0.002)]);
        let ex = excess(&asset, &rf, "ex");

        assert_eq!(ex.name, "ex");
        assert!(approx(ex.get(p(2020, 1)).unwrap(), 0.029));
        assert!(approx(ex.get(p(2020, 2)).unwrap(), -0.012));
    }

    #[test]
    fn test_scale() {
        let pct = Series::from_points("pct", [(p(2020, 1), 1.5)]);
        assert!(approx(scale(&pct, 0.01, "dec").get(p(2020, 1)).unwrap(), 0.015));
    }
}
