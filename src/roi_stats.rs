//! Region-wise nested model comparison with a textual report.

use log::info;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::design::DesignMatrix;
use crate::error::{NeurostatsError, Result};
use crate::glm::{f_distribution, f_survival, nested_f_statistics, t_distribution, t_survival, OlsFit};
use crate::labels::LabelRegistry;
use crate::model::{AnalysisKind, Formula, ModelDescription};
use crate::roi_data::RoiDataset;

#[derive(Debug, Clone, PartialEq)]
pub struct Coefficient {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub t: f64,
    /// Two-sided p-value of the t statistic.
    pub p: f64,
}

/// Summary of one least squares fit of a region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionSummary {
    pub formula: String,
    pub coefficients: Vec<Coefficient>,
    pub r_squared: f64,
    pub rss: f64,
    pub df_resid: usize,
}

/// The F-test comparing the null model against the full model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelComparison {
    pub df_diff: usize,
    pub ss_diff: f64,
    pub f: f64,
    pub p: f64,
}

/// Everything reported for one region.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiAnova {
    pub roi_id: i32,
    pub label: String,
    pub effect: String,
    pub full: RegressionSummary,
    pub null: RegressionSummary,
    pub comparison: ModelComparison,
}

/// Fit the full and null model of an ANOVA to every region of the dataset.
pub fn anova_roi(model: &ModelDescription, data: &RoiDataset, labels: &LabelRegistry) -> Result<Vec<RoiAnova>> {
    let (full, null, effect) = match &model.kind {
        AnalysisKind::Anova { full, null, effect } => (full, null, effect),
        other => {
            return Err(NeurostatsError::Config(format!(
                "Region-wise analysis requires a [model] section with test = \"anova\", found test '{}'.",
                other.test_name()
            )))
        }
    };
    model.validate(data.covariates())?;
    info!("Computing regressions for {} regions.", data.roi_ids.len());

    let x_full = DesignMatrix::build(full, data.covariates())?;
    let x_null = DesignMatrix::build(null, data.covariates())?;
    let n = data.num_subjects();
    let (df_full, df_null) = (x_full.num_params(), x_null.num_params());
    if df_full <= df_null || n <= df_full + 1 {
        return Err(NeurostatsError::ModelFailure(format!(
            "Cannot compare a full model with {} and a null model with {} parameters on {} subjects. Perhaps the data is insufficient to fit the model?",
            df_full, df_null, n
        )));
    }

    let fit_full = OlsFit::fit(&x_full.matrix, &data.data)?;
    let fit_null = OlsFit::fit(&x_null.matrix, &data.data)?;
    let full_summaries = summarize(&x_full, &fit_full, full, data)?;
    let null_summaries = summarize(&x_null, &fit_null, null, data)?;

    let fstats = nested_f_statistics(&fit_full.rss, &fit_null.rss, df_full, df_null, n);
    let dist = f_distribution(df_full - df_null, n - df_full - 1)?;

    let reports = data
        .roi_ids
        .iter()
        .zip(full_summaries.into_iter().zip(null_summaries.into_iter()))
        .enumerate()
        .map(|(j, (id, (full, null)))| RoiAnova {
            roi_id: *id,
            label: labels.display_name(*id),
            effect: effect.clone(),
            comparison: ModelComparison {
                df_diff: df_full - df_null,
                ss_diff: fit_null.rss[j] - fit_full.rss[j],
                f: fstats[j],
                p: f_survival(&dist, fstats[j]),
            },
            full,
            null,
        })
        .collect();
    Ok(reports)
}

fn summarize(design: &DesignMatrix, fit: &OlsFit, formula: &Formula, data: &RoiDataset) -> Result<Vec<RegressionSummary>> {
    let dist = t_distribution(fit.df_resid())?;
    let r_squared = fit.r_squared(&data.data);
    let std_errors: Vec<_> = (0..design.num_columns()).map(|col| fit.std_errors(col)).collect();

    let summaries = data
        .roi_ids
        .iter()
        .enumerate()
        .map(|(j, id)| {
            let coefficients = design
                .column_names
                .iter()
                .enumerate()
                .map(|(col, name)| {
                    let estimate = fit.beta[[col, j]];
                    let std_error = std_errors[col][j];
                    let t = estimate / std_error;
                    Coefficient {
                        name: name.clone(),
                        estimate,
                        std_error,
                        t,
                        p: (2.0 * t_survival(&dist, t)).min(1.0),
                    }
                })
                .collect();
            RegressionSummary {
                formula: format!("{} ~ {}", RoiDataset::column_name(*id), formula),
                coefficients,
                r_squared: r_squared[j],
                rss: fit.rss[j],
                df_resid: fit.df_resid(),
            }
        })
        .collect();
    Ok(summaries)
}

impl fmt::Display for RegressionSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.formula)?;
        writeln!(
            f,
            "  {:<24} {:>14} {:>14} {:>10} {:>10}",
            "", "Estimate", "Std. Error", "t value", "Pr(>|t|)"
        )?;
        for c in self.coefficients.iter() {
            writeln!(
                f,
                "  {:<24} {:>14.6} {:>14.6} {:>10.3} {:>10.4e}",
                c.name, c.estimate, c.std_error, c.t, c.p
            )?;
        }
        writeln!(
            f,
            "  R-squared: {:.4}, residual sum of squares: {:.6} on {} degrees of freedom",
            self.r_squared, self.rss, self.df_resid
        )
    }
}

impl fmt::Display for RoiAnova {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "ROI {} ({})", self.roi_id, self.label)?;
        writeln!(f)?;
        write!(f, "Full model: {}", self.full)?;
        writeln!(f)?;
        write!(f, "Null model: {}", self.null)?;
        writeln!(f)?;
        writeln!(f, "Main effect of {} on {}", self.effect, self.label)?;
        writeln!(
            f,
            "  {:<6} {:>14} {:>6} {:>14} {:>10} {:>10}",
            "Model", "RSS", "Df", "Sum of Sq", "F", "Pr(>F)"
        )?;
        writeln!(
            f,
            "  {:<6} {:>14.6} {:>6} {:>14} {:>10} {:>10}",
            "null", self.null.rss, self.null.df_resid, "", "", ""
        )?;
        writeln!(
            f,
            "  {:<6} {:>14.6} {:>6} {:>14.6} {:>10.4} {:>10.4e}",
            "full", self.full.rss, self.full.df_resid, self.comparison.ss_diff, self.comparison.f, self.comparison.p
        )
    }
}

/// Write `results.txt` with the report of every region and `roidata.csv` with the demographics and region values.
pub fn write_roi_report<P: AsRef<Path>>(results: &[RoiAnova], data: &RoiDataset, outdir: P) -> Result<()> {
    let outdir = outdir.as_ref();
    fs::create_dir_all(outdir)?;

    let mut text = String::new();
    for roi in results.iter() {
        text.push_str(&roi.to_string());
        text.push_str(&"-".repeat(80));
        text.push('\n');
    }
    fs::write(outdir.join("results.txt"), text)?;
    data.to_table()?.to_csv(outdir.join("roidata.csv"))?;
    info!(
        "Wrote region-wise results for {} regions to '{}'.",
        results.len(),
        outdir.display()
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::demographics::{Covariate, CovariateTable};
    use crate::model::Domain;
    use crate::roi_data::RoiMeasure;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;
    use tempfile::tempdir;

    fn dataset() -> RoiDataset {
        let age = vec![21.0, 25.0, 30.0, 34.0, 41.0, 45.0, 52.0, 58.0, 60.0, 66.0];
        let noise = [0.03, -0.02, 0.01, -0.04, 0.02, 0.0, -0.01, 0.03, -0.03, 0.01];
        let sex = Covariate::Categorical(
            ["F", "M", "F", "M", "F", "M", "F", "M", "F", "M"].iter().map(|s| s.to_string()).collect(),
        );
        let data = Array2::from_shape_fn((10, 2), |(i, j)| {
            if j == 0 {
                3.0 - 0.01 * age[i] + noise[i]
            } else {
                2.5 + noise[i]
            }
        });
        let table = CovariateTable::from_columns(vec![("age", Covariate::Numeric(age)), ("sex", sex)]).unwrap();
        RoiDataset::new(data, table, vec![501, 502], RoiMeasure::GmThickness).unwrap()
    }

    fn registry() -> LabelRegistry {
        let mut labels = LabelRegistry::default();
        labels.insert(501, "L. superior frontal gyrus");
        labels
    }

    #[test]
    fn every_region_gets_a_model_comparison() {
        let data = dataset();
        let model = ModelDescription::new(Domain::Roi, AnalysisKind::anova("age + sex", "sex").unwrap());
        let results = anova_roi(&model, &data, &registry()).unwrap();

        assert_eq!(2, results.len());
        assert_eq!("L. superior frontal gyrus", results[0].label);
        assert_eq!("502", results[1].label);
        assert!(results[0].comparison.p < 0.001);
        assert!(results[1].comparison.p > 0.05);

        let full = &results[0].full;
        assert_eq!(vec!["Intercept", "age", "sex[T.M]"], full.coefficients.iter().map(|c| c.name.as_str()).collect::<Vec<_>>());
        assert_abs_diff_eq!(full.coefficients[1].estimate, -0.01, epsilon = 1e-3);
        assert_eq!(7, full.df_resid);
        assert!(full.r_squared > 0.9);
        assert_abs_diff_eq!(
            results[0].comparison.ss_diff,
            results[0].null.rss - results[0].full.rss,
            epsilon = 1e-12
        );
    }

    #[test]
    fn only_anova_models_are_supported() {
        let model = ModelDescription::new(Domain::Roi, AnalysisKind::Correlation { variable: "age".into() });
        assert!(matches!(
            anova_roi(&model, &dataset(), &registry()),
            Err(NeurostatsError::Config(_))
        ));
    }

    #[test]
    fn reports_are_written_to_the_output_directory() {
        let data = dataset();
        let model = ModelDescription::new(Domain::Roi, AnalysisKind::anova("age + sex", "sex").unwrap());
        let results = anova_roi(&model, &data, &registry()).unwrap();
        let dir = tempdir().unwrap();
        write_roi_report(&results, &data, dir.path()).unwrap();

        let text = fs::read_to_string(dir.path().join("results.txt")).unwrap();
        assert!(text.contains("ROI 501 (L. superior frontal gyrus)"));
        assert!(text.contains("ROI_502 ~ age + sex"));
        let csv = fs::read_to_string(dir.path().join("roidata.csv")).unwrap();
        assert!(csv.starts_with("age,sex,ROI_501,ROI_502"));
    }
}
