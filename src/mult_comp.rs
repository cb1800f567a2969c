//! Multiple comparisons correction of signed p-values.
//!
//! Signed p-values encode the direction of an effect in their sign. The correction operates on the magnitudes and
//! restores the sign afterwards.

use std::str::FromStr;

use crate::error::{NeurostatsError, Result};
use crate::util::signum;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionMethod {
    /// False discovery rate control by Benjamini and Hochberg.
    BenjaminiHochberg,
}

impl Default for CorrectionMethod {
    fn default() -> CorrectionMethod {
        CorrectionMethod::BenjaminiHochberg
    }
}

impl FromStr for CorrectionMethod {
    type Err = NeurostatsError;

    fn from_str(s: &str) -> Result<CorrectionMethod> {
        match s {
            "BH" => Ok(CorrectionMethod::BenjaminiHochberg),
            other => Err(NeurostatsError::UnsupportedMethod(other.to_string())),
        }
    }
}

/// Adjust signed p-values for multiple comparisons. Output position `i` corresponds to input position `i` and has the
/// same sign.
///
/// # Examples
///
/// ```
/// use neurostats::{adjust, CorrectionMethod};
/// let adjusted = adjust(&[0.02, -0.01], CorrectionMethod::BenjaminiHochberg);
/// assert!(adjusted[0] > 0.0 && adjusted[1] < 0.0);
/// ```
pub fn adjust(pvalues: &[f64], method: CorrectionMethod) -> Vec<f64> {
    let magnitudes: Vec<f64> = pvalues.iter().map(|p| p.abs()).collect();
    let adjusted = match method {
        CorrectionMethod::BenjaminiHochberg => adjust_bh(&magnitudes),
    };
    adjusted
        .iter()
        .zip(pvalues.iter())
        .map(|(q, p)| q * signum(*p))
        .collect()
}

/// Like [`adjust`], with the method given by name. Only "BH" is supported.
pub fn adjust_by_name(pvalues: &[f64], method: &str) -> Result<Vec<f64>> {
    Ok(adjust(pvalues, method.parse()?))
}

/// Benjamini-Hochberg adjustment of unsigned p-values.
///
/// With the p-values sorted ascending, rank `k` (0-based) gets `q[k] = p[k] * m / (k + 1)`, followed by a running
/// minimum from the largest p-value down. The results are not clamped to 1.
pub fn adjust_bh(pvalues: &[f64]) -> Vec<f64> {
    let m = pvalues.len();
    let mut idx: Vec<usize> = (0..m).collect();
    idx.sort_by(|a, b| {
        pvalues[*a]
            .partial_cmp(&pvalues[*b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut adjusted = vec![0.0; m];
    let mut running_min = f64::INFINITY;
    for (rank, &i) in idx.iter().enumerate().rev() {
        let q = pvalues[i] * m as f64 / (rank + 1) as f64;
        if q < running_min {
            running_min = q;
        }
        adjusted[i] = running_min;
    }
    adjusted
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn bh_of_sorted_pvalues_matches_hand_computation() {
        let adjusted = adjust_bh(&[0.01, 0.02, 0.03, 0.5]);
        let expected = [0.04, 0.04, 0.04, 0.5];
        for (a, e) in adjusted.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *e, epsilon = 1e-12);
        }
    }

    #[test]
    fn bh_restores_the_original_order() {
        let adjusted = adjust_bh(&[0.5, 0.03, 0.01, 0.02]);
        let expected = [0.5, 0.04, 0.04, 0.04];
        for (a, e) in adjusted.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *e, epsilon = 1e-12);
        }
    }

    #[test]
    fn adjustment_preserves_signs() {
        let adjusted = adjust(&[0.02, -0.01], CorrectionMethod::BenjaminiHochberg);
        assert!(adjusted[0] > 0.0);
        assert!(adjusted[1] < 0.0);
        assert_abs_diff_eq!(adjusted[0], 0.02, epsilon = 1e-12);
        assert_abs_diff_eq!(adjusted[1], -0.02, epsilon = 1e-12);
    }

    #[test]
    fn empty_input_gives_empty_output() {
        assert!(adjust(&[], CorrectionMethod::BenjaminiHochberg).is_empty());
    }

    #[test]
    fn unknown_methods_are_rejected() {
        assert!(matches!(
            adjust_by_name(&[0.1], "bonferroni"),
            Err(NeurostatsError::UnsupportedMethod(_))
        ));
        assert!(adjust_by_name(&[0.1], "BH").is_ok());
    }

    #[test]
    fn adjusted_values_stay_in_unit_range_and_keep_rank_order() {
        // Deterministic pseudo random p-values in (0, 1].
        let mut state: u64 = 12345;
        let pvalues: Vec<f64> = (0..500)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 11) as f64 + 1.0) / (1u64 << 53) as f64
            })
            .collect();
        let adjusted = adjust_bh(&pvalues);

        for (p, q) in pvalues.iter().zip(adjusted.iter()) {
            assert!(*q >= *p - 1e-15);
            assert!(*q <= 1.0 + 1e-15);
        }
        for i in 0..pvalues.len() {
            for j in 0..pvalues.len() {
                if pvalues[i] <= pvalues[j] {
                    assert!(adjusted[i] <= adjusted[j]);
                }
            }
        }
    }
}
