//! Per-location statistics of a fitted model, and their multiple comparisons correction.

use ndarray::{Array1, ArrayView1};
use ndarray_stats::QuantileExt;

use crate::error::{NeurostatsError, Result};
use crate::mult_comp::{adjust, CorrectionMethod};

/// Per-location results of a model fit. All arrays are indexed like the active locations of the dataset.
///
/// `pvalues` are signed: the sign encodes the direction of the effect. `corrvalues` is only filled for correlation
/// analyses and `pvalues_adjusted` only after correction by a [`ResultAssembler`], both are empty otherwise. The
/// arrays are read-only once the result is created.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsResult {
    pvalues: Array1<f64>,
    tvalues: Array1<f64>,
    corrvalues: Array1<f64>,
    pvalues_adjusted: Array1<f64>,
}

impl StatsResult {
    pub fn new(pvalues: Array1<f64>, tvalues: Array1<f64>) -> StatsResult {
        StatsResult {
            pvalues,
            tvalues,
            corrvalues: Array1::zeros(0),
            pvalues_adjusted: Array1::zeros(0),
        }
    }

    pub fn with_correlations(mut self, corrvalues: Array1<f64>) -> StatsResult {
        self.corrvalues = corrvalues;
        self
    }

    pub fn pvalues(&self) -> ArrayView1<f64> {
        self.pvalues.view()
    }

    pub fn tvalues(&self) -> ArrayView1<f64> {
        self.tvalues.view()
    }

    pub fn corrvalues(&self) -> ArrayView1<f64> {
        self.corrvalues.view()
    }

    pub fn pvalues_adjusted(&self) -> ArrayView1<f64> {
        self.pvalues_adjusted.view()
    }

    pub fn len(&self) -> usize {
        self.pvalues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pvalues.is_empty()
    }

    pub fn has_correlations(&self) -> bool {
        !self.corrvalues.is_empty()
    }

    pub fn is_adjusted(&self) -> bool {
        self.pvalues_adjusted.len() == self.pvalues.len() && !self.pvalues.is_empty()
    }

    /// Fill `pvalues_adjusted` by correcting the signed p-values with the given method.
    fn adjust_for_multi_comparisons(&mut self, method: CorrectionMethod) {
        let pvalues = self.pvalues.to_vec();
        self.pvalues_adjusted = Array1::from(adjust(&pvalues, method));
    }

    /// Scatter the results back onto all `location_count` locations, given the active location index of the dataset.
    ///
    /// Inactive locations get p-values of 1 and t-values and correlations of 0.
    pub fn expand(&self, active_location_index: &[usize], location_count: usize) -> Result<SpatialMaps> {
        if active_location_index.len() != self.len() {
            return Err(NeurostatsError::DimensionMismatch(
                String::from("active locations and statistics"),
                active_location_index.len(),
                self.len(),
            ));
        }
        if let Some(idx) = active_location_index.iter().find(|idx| **idx >= location_count) {
            return Err(NeurostatsError::DimensionMismatch(
                String::from("location index and geometry size"),
                location_count,
                *idx,
            ));
        }
        let scatter = |values: &Array1<f64>, fill: f64| -> Vec<f64> {
            let mut full = vec![fill; location_count];
            for (idx, v) in active_location_index.iter().zip(values.iter()) {
                full[*idx] = *v;
            }
            full
        };
        Ok(SpatialMaps {
            pvalues: scatter(&self.pvalues, 1.0),
            pvalues_adjusted: scatter(&self.pvalues_adjusted, 1.0),
            tvalues: scatter(&self.tvalues, 0.0),
            corrvalues: if self.has_correlations() {
                Some(scatter(&self.corrvalues, 0.0))
            } else {
                None
            },
        })
    }
}

/// The statistics of all locations of the reference geometry, with neutral values at inactive locations.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialMaps {
    pub pvalues: Vec<f64>,
    pub pvalues_adjusted: Vec<f64>,
    pub tvalues: Vec<f64>,
    pub corrvalues: Option<Vec<f64>>,
}

/// Owns the final [`StatsResult`] of a run after applying the multiple comparisons correction.
#[derive(Debug, Clone)]
pub struct ResultAssembler {
    result: StatsResult,
    method: CorrectionMethod,
}

impl ResultAssembler {
    /// Correct the p-values of a freshly fitted result.
    pub fn assemble(mut result: StatsResult, method: CorrectionMethod) -> ResultAssembler {
        result.adjust_for_multi_comparisons(method);
        ResultAssembler { result, method }
    }

    pub fn method(&self) -> CorrectionMethod {
        self.method
    }

    pub fn result(&self) -> &StatsResult {
        &self.result
    }

    pub fn into_result(self) -> StatsResult {
        self.result
    }

    pub fn pvalues(&self) -> ArrayView1<f64> {
        self.result.pvalues.view()
    }

    pub fn pvalues_adjusted(&self) -> ArrayView1<f64> {
        self.result.pvalues_adjusted.view()
    }

    pub fn tvalues(&self) -> ArrayView1<f64> {
        self.result.tvalues.view()
    }

    /// The correlations, if this is the result of a correlation analysis.
    pub fn corrvalues(&self) -> Option<ArrayView1<f64>> {
        if self.result.has_correlations() {
            Some(self.result.corrvalues.view())
        } else {
            None
        }
    }

    /// Position (in active location order) of the smallest adjusted p-value magnitude.
    pub fn most_significant(&self) -> Option<usize> {
        self.result.pvalues_adjusted.mapv(f64::abs).argmin_skipnan().ok()
    }

    /// Number of locations with an adjusted p-value magnitude below `alpha`.
    pub fn num_significant(&self, alpha: f64) -> usize {
        self.result
            .pvalues_adjusted
            .iter()
            .filter(|p| p.abs() < alpha)
            .count()
    }

    /// Scatter the results back onto all `location_count` locations, see [`StatsResult::expand`].
    pub fn expand(&self, active_location_index: &[usize], location_count: usize) -> Result<SpatialMaps> {
        self.result.expand(active_location_index, location_count)
    }
}
