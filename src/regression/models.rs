use serde::Serialize;
use tracing::{debug, warn};

use crate::regression::ols::{OlsFit, RegressionError, ols};
use crate::series::Frame;
use crate::summary::MONTHS_PER_YEAR;

/// Which flavour of a fund's return is regressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dependent {
    /// `<fund>_excess`
    Excess,
    /// `<fund>_real_excess`
    RealExcess,
}

impl Dependent {
    pub fn column(&self, fund: &str) -> String {
        match self {
            Dependent::Excess => format!("{fund}_excess"),
            Dependent::RealExcess => format!("{fund}_real_excess"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ModelSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub dependent: Dependent,
    pub regressors: &'static [&'static str],
}

/// The regressions run for every fund, in report order.
pub static MODELS: &[ModelSpec] = &[
    ModelSpec {
        name: "capm",
        description: "CAPM against the equity index",
        dependent: Dependent::Excess,
        regressors: &["market_excess"],
    },
    ModelSpec {
        name: "capm_ff",
        description: "CAPM against the Fama-French market factor",
        dependent: Dependent::Excess,
        regressors: &["mkt_rf"],
    },
    ModelSpec {
        name: "ff3",
        description: "Fama-French three-factor",
        dependent: Dependent::Excess,
        regressors: &["mkt_rf", "smb", "hml"],
    },
    ModelSpec {
        name: "ff5",
        description: "Fama-French five-factor",
        dependent: Dependent::Excess,
        regressors: &["mkt_rf", "smb", "hml", "rmw", "cma"],
    },
    ModelSpec {
        name: "ff5_crypto",
        description: "Fama-French five-factor plus crypto risk premia",
        dependent: Dependent::Excess,
        regressors: &["mkt_rf", "smb", "hml", "rmw", "cma", "btc_excess", "eth_excess"],
    },
    ModelSpec {
        name: "capm_real",
        description: "CAPM on inflation-adjusted returns",
        dependent: Dependent::RealExcess,
        regressors: &["market_real_excess"],
    },
];

/// Models whose F test decides the multi-factor verdict, most complete first.
const FACTOR_MODELS: &[&str] = &["ff5_crypto", "ff5", "ff3"];

/// Models whose market beta decides neutrality, preferred first.
const MARKET_MODELS: &[&str] = &["capm", "capm_ff"];

#[derive(Debug, Clone, Serialize)]
pub struct Regression {
    pub model: String,
    pub description: String,
    pub fund: String,
    pub dependent: String,
    #[serde(flatten)]
    pub fit: OlsFit,
}

impl ModelSpec {
    pub fn find(name: &str) -> Option<&'static ModelSpec> {
        MODELS.iter().find(|m| m.name == name)
    }

    /// Runs this model for one fund. `Ok(None)` when the frame lacks a column.
    pub fn run(&self, frame: &Frame, fund: &str) -> Result<Option<Regression>, RegressionError> {
        let dependent = self.dependent.column(fund);
        let Some(y) = frame.column(&dependent) else {
            return Ok(None);
        };

        let mut regressors = Vec::with_capacity(self.regressors.len());
        for name in self.regressors {
            match frame.column(name) {
                Some(values) => regressors.push(values),
                None => return Ok(None),
            }
        }

        let fit = ols(y, &regressors, self.regressors)?;
        Ok(Some(Regression {
            model: self.name.to_string(),
            description: self.description.to_string(),
            fund: fund.to_string(),
            dependent,
            fit,
        }))
    }
}

/// Runs every model in [`MODELS`] for each fund, skipping models whose
/// columns the dataset does not carry or that the sample cannot identify.
pub fn run_models(frame: &Frame, funds: &[&str]) -> Result<Vec<Regression>, RegressionError> {
    let mut out = Vec::new();
    for fund in funds {
        for spec in MODELS {
            let fitted = match spec.run(frame, fund) {
                Ok(fitted) => fitted,
                Err(e @ (RegressionError::TooFewObservations { .. } | RegressionError::SingularMatrix)) => {
                    warn!(fund, model = spec.name, error = %e, "Skipping model: cannot be fitted");
                    continue;
                }
                Err(e) => return Err(e),
            };
            match fitted {
                Some(reg) => {
                    debug!(
                        fund,
                        model = spec.name,
                        r_squared = reg.fit.r_squared,
                        n = reg.fit.observations,
                        "Regression fitted"
                    );
                    out.push(reg);
                }
                None => warn!(fund, model = spec.name, "Skipping model: dataset lacks a column"),
            }
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
pub struct NeutralityVerdict {
    pub fund: String,
    pub market_model: String,
    pub beta: f64,
    pub beta_p_value: f64,
    pub alpha_annualized: f64,
    pub alpha_p_value: f64,
    /// No significant market beta at the configured level.
    pub market_neutral: bool,
    pub factor_model: Option<String>,
    pub factor_f_p_value: Option<f64>,
    /// The factor loadings are jointly significant.
    pub factor_exposed: Option<bool>,
}

/// Tests each fund's market-neutral claim against the fitted regressions.
pub fn verdicts(regressions: &[Regression], funds: &[&str], significance: f64) -> Vec<NeutralityVerdict> {
    funds
        .iter()
        .filter_map(|fund| {
            let find = |names: &[&str]| {
                names.iter().find_map(|name| {
                    regressions
                        .iter()
                        .find(|r| r.fund == *fund && r.model == *name)
                })
            };

            let market = find(MARKET_MODELS)?;
            let beta = market.fit.coefficients.get(1)?;
            let alpha = market.fit.intercept();
            let factor = find(FACTOR_MODELS);
            let factor_f_p_value = factor.and_then(|r| r.fit.f_p_value);

            Some(NeutralityVerdict {
                fund: fund.to_string(),
                market_model: market.model.clone(),
                beta: beta.estimate,
                beta_p_value: beta.p_value,
                alpha_annualized: alpha.estimate * MONTHS_PER_YEAR,
                alpha_p_value: alpha.p_value,
                market_neutral: beta.p_value >= significance,
                factor_model: factor.map(|r| r.model.clone()),
                factor_f_p_value,
                factor_exposed: factor_f_p_value.map(|p| p < significance),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Period;

    /// Deterministic pseudo-noise in [-0.5, 0.5).
    fn noise(i: usize, salt: u64) -> f64 {
        let mut x = (i as u64 + 1).wrapping_mul(6364136223846793005).wrapping_add(salt);
        x ^= x >> 33;
        x = x.wrapping_mul(0xff51afd7ed558ccd);
        x ^= x >> 33;
        (x % 10_000) as f64 / 10_000.0 - 0.5
    }

    fn frame(beta: f64) -> Frame {
        let n = 60;
        let periods: Vec<Period> = (0..n)
            .map(|i| Period::new(2015 + (i / 12) as i32, (i % 12) as u32 + 1).unwrap())
            .collect();
        let market: Vec<f64> = (0..n).map(|i| 0.08 * noise(i, 1)).collect();
        let fund: Vec<f64> = (0..n)
            .map(|i| 0.002 + beta * market[i] + 0.01 * noise(i, 2))
            .collect();

        Frame::from_columns(
            periods,
            vec![
                ("market_excess".to_string(), market.clone()),
                ("mkt_rf".to_string(), market.iter().map(|m| m * 0.9).collect()),
                ("fund_excess".to_string(), fund),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_run_models_skips_missing_columns() {
        let regs = run_models(&frame(0.8), &["fund"]).unwrap();
        let names: Vec<_> = regs.iter().map(|r| r.model.as_str()).collect();
        assert_eq!(names, vec!["capm", "capm_ff"]);
        assert_eq!(regs[0].dependent, "fund_excess");
        assert_eq!(regs[0].fit.coefficients[1].name, "market_excess");
    }

    #[test]
    fn test_run_models_skips_unidentified_models() {
        let mut f = frame(0.8);
        let smb: Vec<f64> = (0..f.len()).map(|i| 0.02 * noise(i, 3)).collect();
        f.with_column("smb", smb.clone()).unwrap();
        f.with_column("hml", smb).unwrap();

        let regs = run_models(&f, &["fund"]).unwrap();
        let names: Vec<_> = regs.iter().map(|r| r.model.as_str()).collect();
        assert_eq!(names, vec!["capm", "capm_ff"]);
        assert_eq!(verdicts(&regs, &["fund"], 0.05).len(), 1);
    }

    #[test]
    fn test_exposed_fund_is_not_neutral() {
        let regs = run_models(&frame(0.8), &["fund"]).unwrap();
        let v = verdicts(&regs, &["fund"], 0.05);

        assert_eq!(v.len(), 1);
        assert_eq!(v[0].market_model, "capm");
        assert!((v[0].beta - 0.8).abs() < 0.1);
        assert!(!v[0].market_neutral);
        assert!(v[0].factor_model.is_none());
        assert!(v[0].factor_exposed.is_none());
    }

    #[test]
    fn test_zero_beta_fund_is_neutral() {
        let regs = run_models(&frame(0.0), &["fund"]).unwrap();
        let v = verdicts(&regs, &["fund"], 0.05);

        assert!(v[0].beta.abs() < 0.1);
        assert!(v[0].market_neutral, "p = {}", v[0].beta_p_value);
    }

    #[test]
    fn test_unknown_fund_has_no_verdict() {
        let regs = run_models(&frame(0.5), &["fund"]).unwrap();
        assert!(verdicts(&regs, &["other"], 0.05).is_empty());
    }

    #[test]
    fn test_model_table() {
        assert_eq!(MODELS.len(), 6);
        let ff5c = ModelSpec::find("ff5_crypto").unwrap();
        assert_eq!(ff5c.regressors.len(), 7);
        assert_eq!(Dependent::RealExcess.column("x"), "x_real_excess");
        assert!(ModelSpec::find("nope").is_none());
    }
}
