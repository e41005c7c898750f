//! Ordinary least squares through a singular value decomposition.
//!
//! Columns are scaled to unit length before the decomposition, so the
//! rank test does not depend on the units of the regressors.

use crate::stats::dist::{f_upper_p, t_two_sided_p};
use nalgebra::{DMatrix, DVector};
use thiserror::Error;

/// Smallest singular value, relative to the largest, of the column-scaled
/// design that still counts as full rank.
const RANK_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("{n} observations are not enough for {k} parameters")]
    TooFewObservations { n: usize, k: usize },

    #[error("design matrix is singular (a regressor is constant or collinear)")]
    Singular,

    #[error("dependent variable has no variance")]
    ConstantResponse,

    #[error("non-finite value in the data")]
    NonFinite,
}

/// Estimates of one OLS fit with an intercept in column 0.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearFit {
    pub coefficients: Vec<f64>,
    pub std_errors: Vec<f64>,
    pub t_values: Vec<f64>,
    pub p_values: Vec<f64>,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub f_stat: f64,
    pub f_p_value: f64,
    pub n_obs: usize,
}

/// Fit `y = X b + e`. Every row of `design` must start with the constant 1.
pub fn fit_ols(design: &[Vec<f64>], y: &[f64]) -> Result<LinearFit, FitError> {
    let n = y.len();
    let k = design.first().map_or(0, Vec::len);
    if design.len() != n || k == 0 || n <= k || design.iter().any(|row| row.len() != k) {
        return Err(FitError::TooFewObservations { n, k });
    }
    if y.iter().chain(design.iter().flatten()).any(|v| !v.is_finite()) {
        return Err(FitError::NonFinite);
    }

    let norms: Vec<f64> = (0..k)
        .map(|j| design.iter().map(|row| row[j] * row[j]).sum::<f64>().sqrt())
        .collect();
    if norms.iter().any(|s| *s == 0.0 || !s.is_finite()) {
        return Err(FitError::Singular);
    }

    let x = DMatrix::from_fn(n, k, |i, j| design[i][j]);
    let scaled = DMatrix::from_fn(n, k, |i, j| design[i][j] / norms[j]);
    let y_vec = DVector::from_column_slice(y);

    let svd = scaled.svd(true, true);
    let s = &svd.singular_values;
    if s.min() <= RANK_TOLERANCE * s.max() {
        return Err(FitError::Singular);
    }
    let (u, v_t) = match (svd.u.as_ref(), svd.v_t.as_ref()) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return Err(FitError::Singular),
    };

    // b = D^-1 V S^-1 U' y for the scaled design X D^-1.
    let uty = u.transpose() * &y_vec;
    let weighted = DVector::from_fn(k, |j, _| uty[j] / s[j]);
    let scaled_beta = v_t.transpose() * weighted;
    let coefficients: Vec<f64> = (0..k).map(|i| scaled_beta[i] / norms[i]).collect();

    // diag((X'X)^-1) = diag(D^-1 V S^-2 V' D^-1)
    let inverse_diag: Vec<f64> = (0..k)
        .map(|i| {
            (0..k).map(|j| (v_t[(j, i)] / s[j]).powi(2)).sum::<f64>() / (norms[i] * norms[i])
        })
        .collect();

    let beta = DVector::from_column_slice(&coefficients);
    let residuals = &y_vec - &x * &beta;
    let ssr = residuals.norm_squared();
    let y_mean = y_vec.mean();
    let sst: f64 = y_vec.iter().map(|v| (v - y_mean).powi(2)).sum();
    if sst == 0.0 {
        return Err(FitError::ConstantResponse);
    }

    let df_resid = (n - k) as f64;
    let df_model = (k - 1) as f64;
    let sigma2 = ssr / df_resid;

    let std_errors: Vec<f64> = inverse_diag
        .iter()
        .map(|d| (sigma2 * d).max(0.0).sqrt())
        .collect();
    let t_values: Vec<f64> = coefficients
        .iter()
        .zip(&std_errors)
        .map(|(b, se)| if *se > 0.0 { b / se } else { f64::INFINITY.copysign(*b) })
        .collect();
    let p_values = t_values.iter().map(|t| t_two_sided_p(*t, df_resid)).collect();

    let r_squared = (1.0 - ssr / sst).clamp(0.0, 1.0);
    let adj_r_squared = 1.0 - (1.0 - r_squared) * (n - 1) as f64 / df_resid;
    let (f_stat, f_p_value) = if df_model > 0.0 {
        let f = ((sst - ssr).max(0.0) / df_model) / sigma2;
        (f, f_upper_p(f, df_model, df_resid))
    } else {
        (f64::NAN, f64::NAN)
    };

    Ok(LinearFit {
        coefficients,
        std_errors,
        t_values,
        p_values,
        r_squared,
        adj_r_squared,
        f_stat,
        f_p_value,
        n_obs: n,
    })
}
