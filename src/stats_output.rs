//! Writing result maps over the full reference geometry as curv files.

use log::info;
use ndarray::Array1;
use ndarray_stats::QuantileExt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::fs_curv::write_curv;
use crate::stats_result::{ResultAssembler, SpatialMaps};
use crate::util::log10_transform;

/// Significance level used to threshold the t-value and correlation maps.
pub const ALPHA: f64 = 0.05;

/// Writes the maps of one analysis into `outdir`. All file names start with `prefix`.
#[derive(Debug, Clone)]
pub struct StatsOutput {
    outdir: PathBuf,
    prefix: String,
}

impl StatsOutput {
    pub fn new<P: AsRef<Path>>(outdir: P, prefix: &str) -> StatsOutput {
        StatsOutput {
            outdir: outdir.as_ref().to_path_buf(),
            prefix: prefix.to_string(),
        }
    }

    /// The path of the output file with the given suffix, e.g. `_atlas_log_pvalues.curv`.
    pub fn path(&self, suffix: &str) -> PathBuf {
        self.outdir.join(format!("{}{}", self.prefix, suffix))
    }

    /// Scatter the results onto all locations and write every map, returning the written paths.
    pub fn save(&self, assembled: &ResultAssembler, active_location_index: &[usize], location_count: usize) -> Result<Vec<PathBuf>> {
        let maps = assembled.expand(active_location_index, location_count)?;
        self.write_maps(&maps)
    }

    /// Write the log p-value, t-value and correlation maps plus the p-value and correlation range files.
    pub fn write_maps(&self, maps: &SpatialMaps) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.outdir)?;
        let threshold = -ALPHA.log10();
        let mut written = Vec::new();

        let log_p = log10_transform(&maps.pvalues);
        written.push(self.write_map("_atlas_log_pvalues.curv", &log_p)?);
        written.push(self.write_map("_atlas_tvalues_all.curv", &maps.tvalues)?);
        let t_unadjusted = zero_where(&maps.tvalues, &log_p, |lp| lp.abs() <= threshold);
        written.push(self.write_map("_atlas_tvalues.curv", &t_unadjusted)?);
        written.push(self.write_range("_unadjusted_pvalue_range.txt", &log_p)?);

        let log_p_adjusted = log10_transform(&maps.pvalues_adjusted);
        written.push(self.write_map("_atlas_log_pvalues_adjusted.curv", &log_p_adjusted)?);
        let t_adjusted = zero_where(&maps.tvalues, &log_p_adjusted, |lp| lp.abs() < threshold);
        written.push(self.write_map("_atlas_tvalues_adjusted.curv", &t_adjusted)?);
        written.push(self.write_range("_adjusted_pvalue_range.txt", &log_p_adjusted)?);

        if let Some(corr) = &maps.corrvalues {
            written.push(self.write_map("_corr.curv", corr)?);
            written.push(self.write_corr_range("_corr_range.txt", "Correlation", corr)?);
            let corr_adjusted = zero_where(corr, &log_p_adjusted, |lp| lp.abs() < threshold);
            written.push(self.write_map("_corr_adjusted.curv", &corr_adjusted)?);
            written.push(self.write_corr_range("_adjusted_corr_range.txt", "Adjusted Correlation", &corr_adjusted)?);
        }
        info!("Wrote {} result files to '{}'.", written.len(), self.outdir.display());
        Ok(written)
    }

    fn write_map(&self, suffix: &str, values: &[f64]) -> Result<PathBuf> {
        let path = self.path(suffix);
        let data: Vec<f32> = values.iter().map(|v| *v as f32).collect();
        write_curv(&path, &data)?;
        Ok(path)
    }

    fn write_range(&self, suffix: &str, log_pvalues: &[f64]) -> Result<PathBuf> {
        let path = self.path(suffix);
        let pex = log_pvalue_extent(log_pvalues);
        let text = format!(
            "Log P-value range: -{} to +{}\nP-value range: {} to +{}\n",
            pex,
            pex,
            -(10f64.powf(-pex)),
            10f64.powf(-pex)
        );
        fs::write(&path, text)?;
        Ok(path)
    }

    fn write_corr_range(&self, suffix: &str, label: &str, corrvalues: &[f64]) -> Result<PathBuf> {
        let path = self.path(suffix);
        let cex = corr_extent(corrvalues);
        fs::write(&path, format!("{} values range: -{} to +{}\n", label, cex, cex))?;
        Ok(path)
    }
}

/// The largest correlation magnitude, 0 if there is none.
fn corr_extent(corrvalues: &[f64]) -> f64 {
    corrvalues.iter().map(|r| r.abs()).filter(|r| !r.is_nan()).fold(0.0, f64::max)
}

/// The largest log p-value magnitude, but at least the magnitude of the significance level.
pub fn log_pvalue_extent(log_pvalues: &[f64]) -> f64 {
    let magnitudes = Array1::from(log_pvalues.iter().map(|v| v.abs()).collect::<Vec<f64>>());
    let pex = *magnitudes.max_skipnan();
    let min_extent = -ALPHA.log10();
    if pex.is_nan() || pex < min_extent {
        min_extent * 1.00001
    } else {
        pex
    }
}

fn zero_where<F: Fn(f64) -> bool>(values: &[f64], condition: &[f64], pred: F) -> Vec<f64> {
    values
        .iter()
        .zip(condition.iter())
        .map(|(v, c)| if pred(*c) { 0.0 } else { *v })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fs_curv::read_curv;
    use crate::mult_comp::CorrectionMethod;
    use crate::stats_result::StatsResult;
    use approx::assert_abs_diff_eq;
    use tempfile::tempdir;

    #[test]
    fn extent_is_at_least_the_significance_level() {
        assert_abs_diff_eq!(log_pvalue_extent(&[0.1, -0.5]), -ALPHA.log10() * 1.00001, epsilon = 1e-12);
        assert_abs_diff_eq!(log_pvalue_extent(&[0.1, -4.0, 2.0]), 4.0);
        assert_abs_diff_eq!(log_pvalue_extent(&[]), -ALPHA.log10() * 1.00001, epsilon = 1e-12);
    }

    #[test]
    fn maps_are_written_with_thresholded_tvalues() {
        let result = StatsResult::new(Array1::from(vec![0.001, -0.5]), Array1::from(vec![4.0, -0.7]))
            .with_correlations(Array1::from(vec![0.9, -0.2]));
        let assembled = ResultAssembler::assemble(result, CorrectionMethod::BenjaminiHochberg);
        let dir = tempdir().unwrap();
        let output = StatsOutput::new(dir.path(), "corr_age_atlas");
        let written = output.save(&assembled, &[0, 2], 3).unwrap();

        assert_eq!(11, written.len());
        let log_p = read_curv(output.path("_atlas_log_pvalues.curv")).unwrap();
        assert_eq!(3, log_p.data.len());
        assert_abs_diff_eq!(log_p.data[0], 3.0, epsilon = 1e-4);
        assert_abs_diff_eq!(log_p.data[1], 0.0, epsilon = 1e-4);

        let t = read_curv(output.path("_atlas_tvalues.curv")).unwrap();
        assert_eq!(vec![4.0, 0.0, 0.0], t.data);
        let t_all = read_curv(output.path("_atlas_tvalues_all.curv")).unwrap();
        assert_eq!(vec![4.0, 0.0, -0.7], t_all.data);
        let corr_adjusted = read_curv(output.path("_corr_adjusted.curv")).unwrap();
        assert_eq!(vec![0.9, 0.0, 0.0], corr_adjusted.data);

        let range = fs::read_to_string(output.path("_unadjusted_pvalue_range.txt")).unwrap();
        assert!(range.starts_with("Log P-value range: -"));
        let corr_range = fs::read_to_string(output.path("_corr_range.txt")).unwrap();
        assert_eq!("Correlation values range: -0.9 to +0.9\n", corr_range);
        let adjusted_corr_range = fs::read_to_string(output.path("_adjusted_corr_range.txt")).unwrap();
        assert_eq!("Adjusted Correlation values range: -0.9 to +0.9\n", adjusted_corr_range);
    }
}
