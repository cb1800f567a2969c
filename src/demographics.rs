//! The demographics table: one row per subject, one column per covariate.
//!
//! Rows are kept in file order. That order defines the subject order of the measurement matrix.

use csv::{ReaderBuilder, WriterBuilder};
use std::path::Path;

use crate::error::{NeurostatsError, Result};

/// The values of one covariate for all subjects.
#[derive(Debug, Clone, PartialEq)]
pub enum Covariate {
    Numeric(Vec<f64>),
    Categorical(Vec<String>),
}

impl Covariate {
    pub fn len(&self) -> usize {
        match self {
            Covariate::Numeric(v) => v.len(),
            Covariate::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Covariate::Numeric(_))
    }

    /// The value of every row as a string key, used to compare and group rows.
    pub fn keys(&self) -> Vec<String> {
        match self {
            Covariate::Numeric(v) => v.iter().map(|x| x.to_string()).collect(),
            Covariate::Categorical(v) => v.clone(),
        }
    }

    /// The distinct values in sorted order: numerically ascending for numeric covariates, lexicographic otherwise.
    pub fn levels(&self) -> Vec<String> {
        match self {
            Covariate::Numeric(v) => {
                let mut values = v.clone();
                values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                values.dedup();
                values.iter().map(|x| x.to_string()).collect()
            }
            Covariate::Categorical(v) => {
                let mut values = v.clone();
                values.sort();
                values.dedup();
                values
            }
        }
    }

    /// Parse a column of raw cells. The column is numeric if every cell is a number.
    fn from_cells(cells: Vec<String>) -> Covariate {
        let parsed: Option<Vec<f64>> = cells.iter().map(|c| c.parse::<f64>().ok()).collect();
        match parsed {
            Some(values) => Covariate::Numeric(values),
            None => Covariate::Categorical(cells),
        }
    }
}

/// Subject-indexed table of covariates.
#[derive(Debug, Clone, PartialEq)]
pub struct CovariateTable {
    names: Vec<String>,
    columns: Vec<Covariate>,
    row_count: usize,
}

impl CovariateTable {
    /// Create a table from named columns, which must all have the same length.
    pub fn from_columns(columns: Vec<(&str, Covariate)>) -> Result<CovariateTable> {
        let row_count = columns.first().map(|(_, c)| c.len()).unwrap_or(0);
        let mut table = CovariateTable {
            names: Vec::with_capacity(columns.len()),
            columns: Vec::with_capacity(columns.len()),
            row_count,
        };
        for (name, column) in columns {
            table.push_column(name, column)?;
        }
        Ok(table)
    }

    /// Read a demographics table. Files ending in ".csv" are comma separated, all others tab separated.
    ///
    /// Any empty cell makes the whole table invalid.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<CovariateTable> {
        let path = path.as_ref();
        let delimiter = match path.extension().and_then(|e| e.to_str()) {
            Some("csv") => b',',
            _ => b'\t',
        };
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(path)?;

        let missing = || NeurostatsError::MissingDemographics(path.display().to_string());

        let names: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
        if names.iter().any(|n| n.is_empty()) {
            return Err(missing());
        }
        let mut cells: Vec<Vec<String>> = vec![Vec::new(); names.len()];
        for result in rdr.records() {
            let record = result?;
            if record.len() != names.len() || record.iter().any(|c| c.is_empty() || c == "NA" || c == "NaN") {
                return Err(missing());
            }
            for (col, value) in cells.iter_mut().zip(record.iter()) {
                col.push(value.to_string());
            }
        }

        let columns = names
            .iter()
            .map(|n| n.as_str())
            .zip(cells.into_iter().map(Covariate::from_cells))
            .collect();
        CovariateTable::from_columns(columns)
    }

    /// Append a column, for instance per-ROI measurements. Numeric columns must be finite.
    pub fn push_column(&mut self, name: &str, column: Covariate) -> Result<()> {
        if self.columns.is_empty() && self.row_count == 0 {
            self.row_count = column.len();
        }
        if column.len() != self.row_count {
            return Err(NeurostatsError::DimensionMismatch(
                format!("rows of covariate '{}'", name),
                self.row_count,
                column.len(),
            ));
        }
        if let Covariate::Numeric(values) = &column {
            if let Some(row) = values.iter().position(|v| !v.is_finite()) {
                return Err(NeurostatsError::NonFiniteCovariate(name.to_string(), row));
            }
        }
        if let Some(idx) = self.names.iter().position(|n| n == name) {
            self.columns[idx] = column;
        } else {
            self.names.push(name.to_string());
            self.columns.push(column);
        }
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&Covariate> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| &self.columns[idx])
    }

    /// Look up a covariate, failing with [`NeurostatsError::MissingCovariate`] if it does not exist.
    pub fn require(&self, name: &str, context: &str) -> Result<&Covariate> {
        self.get(name)
            .ok_or_else(|| NeurostatsError::MissingCovariate(name.to_string(), context.to_string()))
    }

    /// The values of a numeric covariate.
    pub fn numeric(&self, name: &str) -> Result<&[f64]> {
        match self.require(name, "the model")? {
            Covariate::Numeric(v) => Ok(v.as_slice()),
            Covariate::Categorical(_) => Err(NeurostatsError::Config(format!(
                "The covariate '{}' is not numeric. Please recode as numeric and rerun.",
                name
            ))),
        }
    }

    /// The values of a covariate as strings, e.g. the per-subject file names.
    pub fn strings(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.require(name, "the subject information")?.keys())
    }

    /// Write the table as a comma separated file with header.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut wtr = WriterBuilder::new().from_path(path)?;
        wtr.write_record(&self.names)?;
        let keys: Vec<Vec<String>> = self
            .columns
            .iter()
            .map(|c| match c {
                Covariate::Numeric(v) => v.iter().map(|x| format!("{:.6}", x)).collect(),
                Covariate::Categorical(v) => v.clone(),
            })
            .collect();
        for row in 0..self.row_count {
            wtr.write_record(keys.iter().map(|col| col[row].as_str()))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    fn csv_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn numeric_and_categorical_columns_are_detected() {
        let file = csv_file("subjID,age,sex,file\ns01,23,M,a.curv\ns02,31.5,F,b.curv\n");
        let table = CovariateTable::from_file(file.path()).unwrap();

        assert_eq!(2, table.row_count());
        assert_eq!(&[23.0, 31.5], table.numeric("age").unwrap());
        assert!(!table.get("sex").unwrap().is_numeric());
        assert_eq!(vec!["a.curv", "b.curv"], table.strings("file").unwrap());
        assert!(table.numeric("sex").is_err());
    }

    #[test]
    fn empty_cells_are_rejected() {
        let file = csv_file("subjID,age\ns01,23\ns02,\n");
        assert!(matches!(
            CovariateTable::from_file(file.path()),
            Err(NeurostatsError::MissingDemographics(_))
        ));
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        let file = csv_file("subjID,age\ns01,20\ns02,nan\ns03,40\ns04,inf\ns05,55\n");
        assert!(matches!(
            CovariateTable::from_file(file.path()),
            Err(NeurostatsError::NonFiniteCovariate(ref name, 1)) if name == "age"
        ));

        let res = CovariateTable::from_columns(vec![("icv", Covariate::Numeric(vec![1.0, f64::INFINITY]))]);
        assert!(matches!(res, Err(NeurostatsError::NonFiniteCovariate(_, 1))));
    }

    #[test]
    fn missing_covariates_are_named() {
        let table = CovariateTable::from_columns(vec![("age", Covariate::Numeric(vec![1.0]))]).unwrap();
        match table.require("sex", "fullmodel") {
            Err(NeurostatsError::MissingCovariate(name, context)) => {
                assert_eq!("sex", name);
                assert_eq!("fullmodel", context);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn levels_are_sorted() {
        let numeric = Covariate::Numeric(vec![2.0, 1.0, 2.0, 10.0]);
        assert_eq!(vec!["1", "2", "10"], numeric.levels());
        let categorical = Covariate::Categorical(vec!["b".into(), "a".into(), "b".into()]);
        assert_eq!(vec!["a", "b"], categorical.levels());
    }

    #[test]
    fn columns_of_different_length_are_rejected() {
        let res = CovariateTable::from_columns(vec![
            ("age", Covariate::Numeric(vec![1.0, 2.0])),
            ("sex", Covariate::Categorical(vec!["M".into()])),
        ]);
        assert!(matches!(res, Err(NeurostatsError::DimensionMismatch(_, 2, 1))));
    }
}
