//! End-to-end analyses as run by the command line tool: read the model specification and data, fit, write results.

use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

use crate::dataset::{Mask, SpatialDataset};
use crate::demographics::{Covariate, CovariateTable};
use crate::error::{NeurostatsError, Result};
use crate::fs_annot::read_annot;
use crate::fs_curv::{read_curv, write_curv};
use crate::labels::LabelRegistry;
use crate::modelspec::ModelSpec;
use crate::mult_comp::{adjust_by_name, CorrectionMethod};
use crate::roi_data::RoiDataset;
use crate::roi_stats::{anova_roi, write_roi_report};
use crate::stats_engine::fit;
use crate::stats_output::{StatsOutput, ALPHA};
use crate::stats_result::ResultAssembler;

/// Read the demographics of a model specification, with the data file names resolved against the spec directory.
fn read_covariates(spec: &ModelSpec) -> Result<CovariateTable> {
    let mut covariates = CovariateTable::from_file(spec.demographics_path())?;
    let fileid = &spec.subjectinfo.fileid;
    let files: Vec<String> = covariates
        .strings(fileid)?
        .iter()
        .map(|f| spec.resolve(f).display().to_string())
        .collect();
    covariates.push_column(fileid, Covariate::Categorical(files))?;
    debug!(
        "Read {} subjects with covariates {}.",
        covariates.row_count(),
        covariates.names().join(", ")
    );
    Ok(covariates)
}

/// The label descriptions named in the specification, or an empty registry.
fn read_labels(spec: &ModelSpec) -> Result<LabelRegistry> {
    match spec.labeldesc_path() {
        Some(path) => LabelRegistry::from_file(path),
        None => Ok(LabelRegistry::default()),
    }
}

fn copy_modelspec<P: AsRef<Path>, Q: AsRef<Path>>(modelspec: P, outdir: Q) -> Result<()> {
    let modelspec = modelspec.as_ref();
    if let Some(name) = modelspec.file_name() {
        let target = outdir.as_ref().join(name);
        if target.exists() && fs::canonicalize(&target)? == fs::canonicalize(modelspec)? {
            return Ok(());
        }
        fs::copy(modelspec, target)?;
    }
    Ok(())
}

/// Run a vertex or voxel-wise analysis and write the result maps to `outdir`. Returns the written files.
pub fn run_spatial<P: AsRef<Path>, Q: AsRef<Path>>(modelspec: P, outdir: Q) -> Result<Vec<PathBuf>> {
    let outdir = outdir.as_ref();
    let spec = ModelSpec::from_file(modelspec.as_ref())?;
    let domain = spec.domain()?;
    if !domain.is_spatial() {
        return Err(NeurostatsError::Config(format!(
            "Analysis type '{}' is region-wise, please use the roi command.",
            spec.analysis.analysis_type
        )));
    }

    let covariates = read_covariates(&spec)?;
    let description = spec.describe(&covariates)?;
    info!("Model: {}", description);

    let mut dataset = SpatialDataset::from_curv_files(covariates, &spec.subjectinfo.fileid, spec.atlas_path())?;
    if let Some(ids) = &spec.subjectinfo.maskroiid {
        let annot_path = spec.atlas_labels_path().ok_or_else(|| {
            NeurostatsError::Config(String::from(
                "The maskroiid= field requires the atlaslabels= field naming the atlas parcellation.",
            ))
        })?;
        let atlas = read_annot(annot_path)?;
        let labels = match spec.labeldesc_path() {
            Some(path) => LabelRegistry::from_file(path)?,
            None => LabelRegistry::from_colortable(&atlas.colortable),
        };
        labels.validate(ids)?;
        dataset.apply_mask(&Mask::RoiIds {
            ids: ids.clone(),
            atlas: &atlas,
        })?;
    } else if let Some(mask_path) = spec.mask_path() {
        let mask = read_curv(mask_path)?;
        dataset.apply_mask(&Mask::Threshold(mask.data))?;
    }

    let result = fit(&description, &dataset)?;
    let assembled = ResultAssembler::assemble(result, CorrectionMethod::default());
    if let Some(pos) = assembled.most_significant() {
        info!(
            "{} locations significant after correction, minimum adjusted p-value {:.3e} at location {}.",
            assembled.num_significant(ALPHA),
            assembled.pvalues_adjusted()[pos].abs(),
            dataset.active_location_index()[pos]
        );
    }

    let output = StatsOutput::new(outdir, &description.output_prefix(spec.atlas_path()));
    let written = output.save(&assembled, dataset.active_location_index(), dataset.location_count())?;
    copy_modelspec(modelspec, outdir)?;
    Ok(written)
}

/// Run a region-wise ANOVA and write the report to `outdir`.
pub fn run_roi<P: AsRef<Path>, Q: AsRef<Path>>(modelspec: P, outdir: Q) -> Result<()> {
    let outdir = outdir.as_ref();
    let spec = ModelSpec::from_file(modelspec.as_ref())?;
    if spec.domain()?.is_spatial() {
        return Err(NeurostatsError::Config(format!(
            "Analysis type '{}' is not region-wise, please use the run command.",
            spec.analysis.analysis_type
        )));
    }

    let covariates = read_covariates(&spec)?;
    let description = spec.describe(&covariates)?;
    info!("Model: {}", description);

    let labels = read_labels(&spec)?;
    let roi_ids = spec.subjectinfo.roiid.clone().unwrap_or_default();
    if !labels.is_empty() {
        labels.validate(&roi_ids)?;
    }
    let data = RoiDataset::from_files(covariates, &spec.subjectinfo.fileid, &roi_ids, spec.roi_measure()?)?;

    let results = anova_roi(&description, &data, &labels)?;
    write_roi_report(&results, &data, outdir)?;
    copy_modelspec(modelspec, outdir)?;
    Ok(())
}

/// Adjust the signed p-values in `input` and write them to `output`.
///
/// Files ending in ".txt" hold whitespace separated values, all other files are read and written as curv files.
pub fn run_fdr<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q, method: &str) -> Result<()> {
    let (input, output) = (input.as_ref(), output.as_ref());
    let is_text = |p: &Path| p.extension().map(|e| e == "txt").unwrap_or(false);
    if is_text(input) != is_text(output) {
        return Err(NeurostatsError::Config(String::from(
            "Input and output files must be of the same type.",
        )));
    }

    if is_text(input) {
        let pvalues = fs::read_to_string(input)?
            .split_whitespace()
            .map(|token| {
                token.parse::<f64>().map_err(|_| {
                    NeurostatsError::Config(format!("Invalid p-value '{}' in '{}'.", token, input.display()))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        let adjusted = adjust_by_name(&pvalues, method)?;
        let text: String = adjusted.iter().map(|q| format!("{:.18e}\n", q)).collect();
        fs::write(output, text)?;
        info!("Adjusted {} p-values.", adjusted.len());
    } else {
        let curv = read_curv(input)?;
        let pvalues: Vec<f64> = curv.data.iter().map(|p| *p as f64).collect();
        let adjusted: Vec<f32> = adjust_by_name(&pvalues, method)?.iter().map(|q| *q as f32).collect();
        write_curv(output, &adjusted)?;
        info!("Adjusted {} p-values.", adjusted.len());
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use tempfile::tempdir;

    #[test]
    fn fdr_of_text_files_preserves_order_and_sign() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("p.txt");
        let output = dir.path().join("q.txt");
        fs::write(&input, "0.5 -0.03\n0.01\n0.02\n").unwrap();
        run_fdr(&input, &output, "BH").unwrap();

        let adjusted: Vec<f64> = fs::read_to_string(&output)
            .unwrap()
            .split_whitespace()
            .map(|t| t.parse().unwrap())
            .collect();
        let expected = [0.5, -0.04, 0.04, 0.04];
        assert_eq!(expected.len(), adjusted.len());
        for (a, e) in adjusted.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *e, epsilon = 1e-12);
        }
    }

    #[test]
    fn fdr_rejects_unknown_methods_and_mixed_formats() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("p.txt");
        fs::write(&input, "0.5").unwrap();
        assert!(matches!(
            run_fdr(&input, dir.path().join("q.txt"), "holm"),
            Err(NeurostatsError::UnsupportedMethod(_))
        ));
        assert!(matches!(
            run_fdr(&input, dir.path().join("q.curv"), "BH"),
            Err(NeurostatsError::Config(_))
        ));
    }

    #[test]
    fn fdr_of_curv_files() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("p.curv");
        let output = dir.path().join("q.curv");
        write_curv(&input, &[0.01, -0.02]).unwrap();
        run_fdr(&input, &output, "BH").unwrap();

        let adjusted = read_curv(&output).unwrap();
        assert_abs_diff_eq!(adjusted.data[0], 0.02, epsilon = 1e-6);
        assert_abs_diff_eq!(adjusted.data[1], -0.02, epsilon = 1e-6);
    }
}
