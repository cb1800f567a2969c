//! Evaluation of model formulas into numeric design matrices.

use ndarray::Array2;
use std::ops::Range;

use crate::demographics::{Covariate, CovariateTable};
use crate::error::Result;
use crate::model::Formula;

/// A design matrix with an intercept in column 0, plus the columns each formula term occupies.
///
/// Numeric terms take one column. Categorical terms are treatment coded: one indicator column for every
/// level but the first (in sorted order).
#[derive(Debug, Clone, PartialEq)]
pub struct DesignMatrix {
    pub matrix: Array2<f64>,
    /// Display names of the columns, like `Intercept`, `age` or `sex[T.M]`.
    pub column_names: Vec<String>,
    pub term_columns: Vec<(String, Range<usize>)>,
}

impl DesignMatrix {
    pub fn build(formula: &Formula, covariates: &CovariateTable) -> Result<DesignMatrix> {
        let n = covariates.row_count();
        let mut columns: Vec<Vec<f64>> = vec![vec![1.0; n]];
        let mut column_names = vec![String::from("Intercept")];
        let mut term_columns = Vec::with_capacity(formula.terms().len());

        for term in formula.terms() {
            let start = columns.len();
            match covariates.require(term, "the model formula")? {
                Covariate::Numeric(values) => {
                    columns.push(values.clone());
                    column_names.push(term.clone());
                }
                categorical @ Covariate::Categorical(_) => {
                    let keys = categorical.keys();
                    for level in categorical.levels().iter().skip(1) {
                        columns.push(keys.iter().map(|k| if k == level { 1.0 } else { 0.0 }).collect());
                        column_names.push(format!("{}[T.{}]", term, level));
                    }
                }
            }
            term_columns.push((term.clone(), start..columns.len()));
        }

        let num_cols = columns.len();
        let matrix = Array2::from_shape_fn((n, num_cols), |(row, col)| columns[col][row]);
        Ok(DesignMatrix {
            matrix,
            column_names,
            term_columns,
        })
    }

    pub fn num_rows(&self) -> usize {
        self.matrix.nrows()
    }

    /// The number of columns, including the intercept.
    pub fn num_columns(&self) -> usize {
        self.matrix.ncols()
    }

    /// The number of model parameters excluding the intercept.
    pub fn num_params(&self) -> usize {
        self.num_columns() - 1
    }

    pub fn columns_of(&self, term: &str) -> Option<Range<usize>> {
        self.term_columns
            .iter()
            .find(|(name, _)| name == term)
            .map(|(_, cols)| cols.clone())
    }
}
