//! CAPM and multi-factor regressions.
//!
//! [`ols`] is the numerical core. [`models`] holds the fixed set of
//! regressions run for every fund and turns their output into a
//! market-neutral verdict.

pub mod models;
pub mod ols;

pub use models::{MODELS, ModelSpec, NeutralityVerdict, Regression, run_models, verdicts};
pub use ols::{Coefficient, OlsFit, RegressionError, ols};
