//! Per-region scalar measurements, read from roiwise stats files.
//!
//! A roiwise stats file is a tab separated table with one row per region. The first header cell is `ROI_ID`, the
//! other columns hold the region measures, e.g. `Mean_Thickness(mm)`.

use csv::ReaderBuilder;
use log::{debug, info};
use ndarray::{Array2, Axis};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use crate::demographics::{Covariate, CovariateTable};
use crate::error::{NeurostatsError, Result};

/// The region measures available in roiwise stats files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoiMeasure {
    GmThickness,
    GmVolume,
    Area,
    SwmFa,
    SwmMd,
    SwmRd,
    SwmAd,
}

impl RoiMeasure {
    /// The header of the column holding this measure.
    pub fn column_name(&self) -> &'static str {
        match self {
            RoiMeasure::GmThickness => "Mean_Thickness(mm)",
            RoiMeasure::GmVolume => "GM_Volume(mm^3)",
            RoiMeasure::Area => "Cortical_Area_pial(mm^2)",
            RoiMeasure::SwmFa => "swmFA",
            RoiMeasure::SwmMd => "swmMD",
            RoiMeasure::SwmRd => "swmRD",
            RoiMeasure::SwmAd => "swmAD",
        }
    }

    /// The key used for this measure in model specifications.
    pub fn key(&self) -> &'static str {
        match self {
            RoiMeasure::GmThickness => "gmthickness",
            RoiMeasure::GmVolume => "gmvolume",
            RoiMeasure::Area => "area",
            RoiMeasure::SwmFa => "swmFA",
            RoiMeasure::SwmMd => "swmMD",
            RoiMeasure::SwmRd => "swmRD",
            RoiMeasure::SwmAd => "swmAD",
        }
    }
}

impl Default for RoiMeasure {
    fn default() -> RoiMeasure {
        RoiMeasure::GmThickness
    }
}

impl FromStr for RoiMeasure {
    type Err = NeurostatsError;

    fn from_str(s: &str) -> Result<RoiMeasure> {
        match s {
            "gmthickness" => Ok(RoiMeasure::GmThickness),
            "gmvolume" => Ok(RoiMeasure::GmVolume),
            "area" => Ok(RoiMeasure::Area),
            "swmFA" => Ok(RoiMeasure::SwmFa),
            "swmMD" => Ok(RoiMeasure::SwmMd),
            "swmRD" => Ok(RoiMeasure::SwmRd),
            "swmAD" => Ok(RoiMeasure::SwmAd),
            other => Err(NeurostatsError::Config(format!(
                "Invalid roimeasure '{}'. Valid measures are gmthickness, gmvolume, area, swmFA, swmMD, swmRD, swmAD.",
                other
            ))),
        }
    }
}

impl fmt::Display for RoiMeasure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// The content of one roiwise stats file.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiStats {
    pub roi_ids: Vec<i32>,
    pub column_names: Vec<String>,
    /// One row per region, one value per column in `column_names`.
    pub values: Vec<Vec<f64>>,
}

impl RoiStats {
    /// Read a roiwise stats file. Cells that are not numbers are read as NaN.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<RoiStats> {
        let path = path.as_ref();
        let invalid = || NeurostatsError::InvalidRoiStatsFormat(path.display().to_string());

        let mut first_line = String::new();
        BufReader::new(File::open(path)?).read_line(&mut first_line)?;
        if !first_line.starts_with("ROI_ID") {
            return Err(invalid());
        }

        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(b'\t')
            .trim(csv::Trim::All)
            .from_path(path)?;
        let column_names: Vec<String> = rdr.headers()?.iter().skip(1).map(|h| h.to_string()).collect();

        let mut roi_ids = Vec::new();
        let mut values = Vec::new();
        for result in rdr.records() {
            let record = result?;
            let id: i32 = record.get(0).and_then(|c| c.parse().ok()).ok_or_else(invalid)?;
            let row: Vec<f64> = record
                .iter()
                .skip(1)
                .map(|c| c.parse().unwrap_or(f64::NAN))
                .collect();
            roi_ids.push(id);
            values.push(row);
        }
        Ok(RoiStats {
            roi_ids,
            column_names,
            values,
        })
    }

    /// The values of `measure` for the regions `ids`, in that order. All regions are returned if `ids` is empty.
    ///
    /// A requested region that is missing from the file, or has a NaN value, is an error.
    pub fn measure(&self, measure: RoiMeasure, ids: &[i32], file: &str) -> Result<Vec<f64>> {
        let col = self
            .column_names
            .iter()
            .position(|c| c == measure.column_name())
            .ok_or_else(|| NeurostatsError::InvalidRoiStatsFormat(file.to_string()))?;
        let ids: Vec<i32> = if ids.is_empty() { self.roi_ids.clone() } else { ids.to_vec() };

        let mut out = Vec::with_capacity(ids.len());
        let mut bad: Vec<String> = Vec::new();
        for id in ids.iter() {
            let value = self
                .roi_ids
                .iter()
                .position(|r| r == id)
                .and_then(|row| self.values[row].get(col).copied())
                .filter(|v| v.is_finite());
            match value {
                Some(v) => out.push(v),
                None => bad.push(id.to_string()),
            }
        }
        if !bad.is_empty() {
            return Err(NeurostatsError::MissingRoiData(bad.join(", "), file.to_string()));
        }
        Ok(out)
    }
}

/// Read the values of one measure for the given regions from a roiwise stats file.
///
/// # Examples
///
/// ```no_run
/// use neurostats::{read_roistats, RoiMeasure};
/// let thickness = read_roistats("/data/subj1.roiwise.stats.txt", &[501, 502], RoiMeasure::GmThickness).unwrap();
/// assert_eq!(2, thickness.len());
/// ```
pub fn read_roistats<P: AsRef<Path>>(path: P, ids: &[i32], measure: RoiMeasure) -> Result<Vec<f64>> {
    let path = path.as_ref();
    RoiStats::from_file(path)?.measure(measure, ids, &path.display().to_string())
}

/// Subjects x regions measurements together with the demographics of the subjects.
#[derive(Debug, Clone)]
pub struct RoiDataset {
    pub roi_ids: Vec<i32>,
    pub measure: RoiMeasure,
    /// One row per subject, one column per region in `roi_ids`.
    pub data: Array2<f64>,
    covariates: CovariateTable,
}

impl RoiDataset {
    /// Read the roiwise stats file of every subject, as named in the `fileid` column of the demographics.
    ///
    /// If `roi_ids` is empty, the regions of the first subject's file are used.
    pub fn from_files(covariates: CovariateTable, fileid: &str, roi_ids: &[i32], measure: RoiMeasure) -> Result<RoiDataset> {
        let files = covariates.strings(fileid)?;
        let mut roi_ids = roi_ids.to_vec();
        if roi_ids.is_empty() {
            if let Some(first) = files.first() {
                roi_ids = RoiStats::from_file(first)?.roi_ids;
            }
        }
        info!(
            "Reading {} of {} regions for {} subjects.",
            measure,
            roi_ids.len(),
            files.len()
        );

        let mut data = Array2::<f64>::zeros((files.len(), roi_ids.len()));
        for (mut row, file) in data.axis_iter_mut(Axis(0)).zip(files.iter()) {
            let values = read_roistats(file, &roi_ids, measure)?;
            for (dst, src) in row.iter_mut().zip(values.iter()) {
                *dst = *src;
            }
            debug!("Read {} region values from '{}'.", values.len(), file);
        }
        RoiDataset::new(data, covariates, roi_ids, measure)
    }

    pub fn new(data: Array2<f64>, covariates: CovariateTable, roi_ids: Vec<i32>, measure: RoiMeasure) -> Result<RoiDataset> {
        if data.nrows() != covariates.row_count() {
            return Err(NeurostatsError::DimensionMismatch(
                String::from("subjects in the region data and the demographics table"),
                covariates.row_count(),
                data.nrows(),
            ));
        }
        if data.ncols() != roi_ids.len() {
            return Err(NeurostatsError::DimensionMismatch(
                String::from("regions per subject"),
                roi_ids.len(),
                data.ncols(),
            ));
        }
        Ok(RoiDataset {
            roi_ids,
            measure,
            data,
            covariates,
        })
    }

    /// The name of the covariate column holding the values of region `id`.
    pub fn column_name(id: i32) -> String {
        format!("ROI_{}", id)
    }

    pub fn covariates(&self) -> &CovariateTable {
        &self.covariates
    }

    pub fn num_subjects(&self) -> usize {
        self.data.nrows()
    }

    /// The demographics with one additional `ROI_<id>` column per region.
    pub fn to_table(&self) -> Result<CovariateTable> {
        let mut table = self.covariates.clone();
        for (id, column) in self.roi_ids.iter().zip(self.data.axis_iter(Axis(1))) {
            table.push_column(&RoiDataset::column_name(*id), Covariate::Numeric(column.to_vec()))?;
        }
        Ok(table)
    }
}
