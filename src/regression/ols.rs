//! Ordinary least squares with classical inference.
//!
//! Solves the normal equations `β = (X'X)⁻¹ X'y` with an intercept column and
//! reports the usual coefficient table: standard errors, t statistics and
//! two-sided p-values on `n - k` degrees of freedom, plus R² and the overall
//! F test.

use ndarray::{Array1, Array2};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};
use thiserror::Error;

pub const INTERCEPT: &str = "(Intercept)";

#[derive(Error, Debug)]
pub enum RegressionError {
    #[error("dimension mismatch: expected {expected} observations, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("{observations} observations are not enough to estimate {parameters} parameters")]
    TooFewObservations {
        observations: usize,
        parameters: usize,
    },

    #[error("design matrix is singular (collinear regressors?)")]
    SingularMatrix,

    #[error("distribution error: {0}")]
    Distribution(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct Coefficient {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub t_value: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OlsFit {
    pub coefficients: Vec<Coefficient>,
    pub observations: usize,
    pub df_residual: usize,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub residual_std_error: f64,
    /// Absent when the model has no regressors besides the intercept.
    pub f_statistic: Option<f64>,
    pub f_p_value: Option<f64>,
}

impl OlsFit {
    pub fn coefficient(&self, name: &str) -> Option<&Coefficient> {
        self.coefficients.iter().find(|c| c.name == name)
    }

    pub fn intercept(&self) -> &Coefficient {
        &self.coefficients[0]
    }
}

/// Regresses `y` on the columns of `regressors` plus an intercept.
///
/// `regressors` holds one slice per explanatory variable, each the same
/// length as `y`; `names` labels them in the same order.
pub fn ols(y: &[f64], regressors: &[&[f64]], names: &[&str]) -> Result<OlsFit, RegressionError> {
    let n = y.len();
    let k = regressors.len() + 1;

    if names.len() != regressors.len() {
        return Err(RegressionError::DimensionMismatch {
            expected: regressors.len(),
            got: names.len(),
        });
    }
    if let Some(bad) = regressors.iter().find(|x| x.len() != n) {
        return Err(RegressionError::DimensionMismatch {
            expected: n,
            got: bad.len(),
        });
    }
    if n <= k {
        return Err(RegressionError::TooFewObservations {
            observations: n,
            parameters: k,
        });
    }

    let x = Array2::from_shape_fn((n, k), |(i, j)| if j == 0 { 1.0 } else { regressors[j - 1][i] });
    let y = Array1::from_vec(y.to_vec());

    let xt = x.t();
    let xtx = xt.dot(&x);
    let xty = xt.dot(&y);

    let xtx_inv = invert(&xtx)?;
    let beta = xtx_inv.dot(&xty);

    let fitted = x.dot(&beta);
    let residuals = &y - &fitted;

    let ssr: f64 = residuals.iter().map(|e| e * e).sum();
    let y_mean = y.mean().unwrap_or(0.0);
    let sst: f64 = y.iter().map(|v| (v - y_mean).powi(2)).sum();

    let df_residual = n - k;
    let sigma2 = ssr / df_residual as f64;

    let t_dist = StudentsT::new(0.0, 1.0, df_residual as f64)
        .map_err(|e| RegressionError::Distribution(e.to_string()))?;

    let coefficients = (0..k)
        .map(|j| {
            let estimate = beta[j];
            let std_error = (xtx_inv[[j, j]] * sigma2).max(0.0).sqrt();
            let (t_value, p_value) = if std_error > 0.0 {
                let t = estimate / std_error;
                (t, two_sided(&t_dist, t))
            } else {
                (f64::NAN, f64::NAN)
            };
            Coefficient {
                name: if j == 0 {
                    INTERCEPT.to_string()
                } else {
                    names[j - 1].to_string()
                },
                estimate,
                std_error,
                t_value,
                p_value,
            }
        })
        .collect();

    let r_squared = if sst > 0.0 { 1.0 - ssr / sst } else { 0.0 };
    let adj_r_squared = 1.0 - (1.0 - r_squared) * (n - 1) as f64 / df_residual as f64;

    let (f_statistic, f_p_value) = if k > 1 && ssr > 0.0 {
        let df_model = (k - 1) as f64;
        let f = ((sst - ssr) / df_model) / sigma2;
        let f_dist = FisherSnedecor::new(df_model, df_residual as f64)
            .map_err(|e| RegressionError::Distribution(e.to_string()))?;
        (Some(f), Some(1.0 - f_dist.cdf(f)))
    } else {
        (None, None)
    };

    Ok(OlsFit {
        coefficients,
        observations: n,
        df_residual,
        r_squared,
        adj_r_squared,
        residual_std_error: sigma2.sqrt(),
        f_statistic,
        f_p_value,
    })
}

fn two_sided(dist: &StudentsT, t: f64) -> f64 {
    (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0)
}

/// Gauss-Jordan inversion with partial pivoting.
fn invert(a: &Array2<f64>) -> Result<Array2<f64>, RegressionError> {
    let n = a.nrows();
    let mut m = a.clone();
    let mut inv = Array2::<f64>::eye(n);

    let scale = a.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())).max(f64::MIN_POSITIVE);
    let tolerance = scale * 1e-12;

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| m[[i, col]].abs().total_cmp(&m[[j, col]].abs()))
            .unwrap_or(col);

        if m[[pivot, col]].abs() <= tolerance {
            return Err(RegressionError::SingularMatrix);
        }

        if pivot != col {
            for j in 0..n {
                m.swap([pivot, j], [col, j]);
                inv.swap([pivot, j], [col, j]);
            }
        }

        let p = m[[col, col]];
        for j in 0..n {
            m[[col, j]] /= p;
            inv[[col, j]] /= p;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = m[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                m[[row, j]] -= factor * m[[col, j]];
                inv[[row, j]] -= factor * inv[[col, j]];
            }
        }
    }

    Ok(inv)
}

#[cfg(test)]
mod tests {
    use super::*;

    const X1: [f64; 10] = [0.01, -0.02, 0.03, 0.015, -0.005, 0.02, -0.01, 0.025, 0.0, -0.03];
    const X2: [f64; 10] = [0.002, 0.004, -0.001, 0.003, 0.0, -0.002, 0.001, 0.005, -0.003, 0.002];
    const Y: [f64; 10] = [0.004, -0.003, 0.009, 0.006, 0.001, 0.004, -0.002, 0.010, 0.000, -0.006];

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol * b.abs().max(1.0)
    }

    #[test]
    fn test_exact_line_recovered() {
        let x: Vec<f64> = (0..20).map(|i| i as f64 * 0.5).collect();
        let y: Vec<f64> = x.iter().map(|v| 1.0 + 2.0 * v).collect();

        let fit = ols(&y, &[&x], &["x"]).unwrap();

        assert!(close(fit.intercept().estimate, 1.0, 1e-9));
        assert!(close(fit.coefficient("x").unwrap().estimate, 2.0, 1e-9));
        assert!(close(fit.r_squared, 1.0, 1e-12));
    }

    #[test]
    fn test_matches_reference_fit() {
        let fit = ols(&Y, &[&X1, &X2], &["x1", "x2"]).unwrap();

        let expected = [
            (0.0009162197916420594, 0.0003062504400041719, 2.9917337967892492, 0.020176762298065865),
            (0.2627459781247785, 0.014615880005955071, 17.97674707357516, 4.072272656863163e-07),
            (0.42197207720110563, 0.11163062745946788, 3.78007440076712, 0.006891606933698391),
        ];

        assert_eq!(fit.coefficients.len(), 3);
        assert_eq!(fit.coefficients[0].name, INTERCEPT);
        assert_eq!(fit.coefficients[2].name, "x2");

        for (c, (est, se, t, p)) in fit.coefficients.iter().zip(expected) {
            assert!(close(c.estimate, est, 1e-9), "{} estimate {}", c.name, c.estimate);
            assert!((c.std_error - se).abs() < 1e-12, "{} se {}", c.name, c.std_error);
            assert!((c.t_value - t).abs() < 1e-7, "{} t {}", c.name, c.t_value);
            assert!((c.p_value - p).abs() < 1e-6, "{} p {}", c.name, c.p_value);
        }

        assert_eq!(fit.observations, 10);
        assert_eq!(fit.df_residual, 7);
        assert!((fit.r_squared - 0.9788822519638793).abs() < 1e-10);
        assert!((fit.adj_r_squared - 0.9728486096678449).abs() < 1e-10);
        assert!((fit.residual_std_error - 0.0008616493976827485).abs() < 1e-12);
        assert!((fit.f_statistic.unwrap() - 162.23736906101215).abs() < 1e-6);
        assert!(fit.f_p_value.unwrap() < 1e-5);
    }

    #[test]
    fn test_collinear_regressors_are_singular() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let x2: Vec<f64> = x.iter().map(|v| v * 3.0).collect();
        let y: Vec<f64> = x.iter().map(|v| v.sin()).collect();

        let err = ols(&y, &[&x, &x2], &["x", "x2"]).unwrap_err();
        assert!(matches!(err, RegressionError::SingularMatrix));
    }

    #[test]
    fn test_too_few_observations() {
        let err = ols(&[1.0, 2.0], &[&[1.0, 2.0]], &["x"]).unwrap_err();
        assert!(matches!(err, RegressionError::TooFewObservations { .. }));
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = ols(&[1.0, 2.0, 3.0, 4.0], &[&[1.0, 2.0]], &["x"]).unwrap_err();
        assert!(matches!(
            err,
            RegressionError::DimensionMismatch { expected: 4, got: 2 }
        ));
    }

    #[test]
    fn test_intercept_only_model() {
        let y = [1.0, 2.0, 3.0, 4.0];
        let fit = ols(&y, &[], &[]).unwrap();
        assert!(close(fit.intercept().estimate, 2.5, 1e-12));
        assert!(fit.r_squared.abs() < 1e-12);
        assert!(fit.f_statistic.is_none());
    }
}
