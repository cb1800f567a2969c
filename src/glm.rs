//! Ordinary least squares fitting of one design matrix against many response columns at once.

use nalgebra::DMatrix;
use ndarray::{Array1, Array2, Axis};
use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};

use crate::error::{NeurostatsError, Result};

const SINGULAR_MSG: &str = "Error in solving the linear system. Perhaps the data is insufficient to fit the model?";

/// The coefficients and residuals of a least squares fit for all response columns.
#[derive(Debug, Clone)]
pub struct OlsFit {
    /// Coefficients, one row per design column and one column per response.
    pub beta: Array2<f64>,
    /// Residual sum of squares per response.
    pub rss: Array1<f64>,
    /// The inverse of `XᵗX`.
    pub xtx_inv: Array2<f64>,
    pub num_obs: usize,
}

impl OlsFit {
    /// Fit `y = X beta` via the normal equations, `beta = (XᵗX)⁻¹ Xᵗ y`, for every column of `y` simultaneously.
    ///
    /// A singular `XᵗX` is a fatal [`NeurostatsError::ModelFailure`].
    pub fn fit(x: &Array2<f64>, y: &Array2<f64>) -> Result<OlsFit> {
        if x.nrows() != y.nrows() {
            return Err(NeurostatsError::DimensionMismatch(
                String::from("rows of the design matrix"),
                y.nrows(),
                x.nrows(),
            ));
        }
        let xtx = x.t().dot(x);
        let xtx_inv = invert(&xtx)?;
        let beta = xtx_inv.dot(&x.t()).dot(y);
        let residuals = y - &x.dot(&beta);
        let rss = residuals.mapv(|r| r * r).sum_axis(Axis(0));
        Ok(OlsFit {
            beta,
            rss,
            xtx_inv,
            num_obs: x.nrows(),
        })
    }

    pub fn num_columns(&self) -> usize {
        self.beta.nrows()
    }

    /// Residual degrees of freedom, `n - columns`.
    pub fn df_resid(&self) -> usize {
        self.num_obs.saturating_sub(self.num_columns())
    }

    /// Standard errors of the coefficients of design column `col` for every response.
    pub fn std_errors(&self, col: usize) -> Array1<f64> {
        let df = self.df_resid() as f64;
        let scale = self.xtx_inv[[col, col]].max(0.0).sqrt();
        self.rss.mapv(|rss| scale * (rss / df).sqrt())
    }

    /// Coefficient of determination per response.
    pub fn r_squared(&self, y: &Array2<f64>) -> Array1<f64> {
        let n = y.nrows() as f64;
        let mean = y.sum_axis(Axis(0)) / n;
        let tss = (y - &mean).mapv(|v| v * v).sum_axis(Axis(0));
        let mut r2 = Array1::zeros(self.rss.len());
        for ((r, rss), tss) in r2.iter_mut().zip(self.rss.iter()).zip(tss.iter()) {
            *r = if *tss > 0.0 { 1.0 - rss / tss } else { 0.0 };
        }
        r2
    }
}

/// Invert a small square matrix, failing with a model error if it is (numerically) singular.
fn invert(m: &Array2<f64>) -> Result<Array2<f64>> {
    let p = m.nrows();
    let dm = DMatrix::from_fn(p, p, |i, j| m[[i, j]]);
    let inv = dm
        .clone()
        .try_inverse()
        .ok_or_else(|| NeurostatsError::ModelFailure(String::from(SINGULAR_MSG)))?;

    // LU inversion only fails on exactly zero pivots, so also check that the inverse actually inverts.
    let identity = &dm * &inv;
    let scale = dm.amax().max(1.0);
    for i in 0..p {
        for j in 0..p {
            let expected = if i == j { 1.0 } else { 0.0 };
            let v = identity[(i, j)];
            if !v.is_finite() || (v - expected).abs() > 1e-6 * scale {
                return Err(NeurostatsError::ModelFailure(String::from(SINGULAR_MSG)));
            }
        }
    }
    Ok(Array2::from_shape_fn((p, p), |(i, j)| inv[(i, j)]))
}

/// F statistics of the nested model comparison for every response.
///
/// `F = ((RSS_null - RSS_full) / (df_full - df_null)) / (RSS_full / (n - df_full - 1))`, where the `df` values are the
/// number of parameters of each model excluding the intercept. The denominator is guarded against zero.
pub fn nested_f_statistics(
    rss_full: &Array1<f64>,
    rss_null: &Array1<f64>,
    df_full: usize,
    df_null: usize,
    num_obs: usize,
) -> Array1<f64> {
    let df_num = df_full as f64 - df_null as f64;
    let df_den = num_obs as f64 - df_full as f64 - 1.0;
    let mut fstat = Array1::zeros(rss_full.len());
    for ((out, full), null) in fstat.iter_mut().zip(rss_full.iter()).zip(rss_null.iter()) {
        *out = ((null - full) / df_num) / (full / df_den + f64::EPSILON);
    }
    fstat
}

/// Upper tail probability of the F distribution, 1 for non-finite statistics.
pub fn f_survival(dist: &FisherSnedecor, f: f64) -> f64 {
    if f.is_nan() || f <= 0.0 {
        1.0
    } else if f.is_infinite() {
        0.0
    } else {
        dist.sf(f)
    }
}

/// Upper tail probability of the Student t distribution at `|t|`.
pub fn t_survival(dist: &StudentsT, t: f64) -> f64 {
    if t.is_nan() {
        1.0
    } else if t.is_infinite() {
        0.0
    } else {
        dist.sf(t.abs())
    }
}

pub fn f_distribution(df_num: usize, df_den: usize) -> Result<FisherSnedecor> {
    FisherSnedecor::new(df_num as f64, df_den as f64).map_err(|_| {
        NeurostatsError::ModelFailure(format!(
            "Invalid degrees of freedom ({}, {}) for the F distribution. Perhaps the data is insufficient to fit the model?",
            df_num, df_den
        ))
    })
}

pub fn t_distribution(df: usize) -> Result<StudentsT> {
    StudentsT::new(0.0, 1.0, df as f64).map_err(|_| {
        NeurostatsError::ModelFailure(format!(
            "Invalid degrees of freedom ({}) for the t distribution. Perhaps the data is insufficient to fit the model?",
            df
        ))
    })
}
