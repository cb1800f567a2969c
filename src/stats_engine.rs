//! Mass-univariate model fitting: one statistic per active location, computed for all locations at once.

use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::dataset::SpatialDataset;
use crate::demographics::Covariate;
use crate::design::DesignMatrix;
use crate::error::{NeurostatsError, Result};
use crate::glm::{f_distribution, f_survival, nested_f_statistics, t_distribution, t_survival, OlsFit};
use crate::model::{AnalysisKind, Formula, ModelDescription};
use crate::stats_result::StatsResult;

/// Relative tolerance below which a centered sum of squares counts as zero variance.
const ZERO_VARIANCE_TOL: f64 = 1e-12;

/// Fit the model to every active location of the dataset.
///
/// Configuration and data integrity problems, like a missing covariate, a grouping covariate without exactly two
/// levels or a singular design matrix, fail the whole fit. Degenerate locations, e.g. without any variance, get a
/// p-value of 1 and a t-value of 0.
///
/// # Examples
///
/// ```no_run
/// use neurostats::{fit, AnalysisKind, CovariateTable, Domain, ModelDescription, SpatialDataset};
/// let covariates = CovariateTable::from_file("/data/demographics.csv").unwrap();
/// let data = SpatialDataset::from_curv_files(covariates, "file", "/data/atlas.curv").unwrap();
/// let model = ModelDescription::new(Domain::Surface, AnalysisKind::anova("age + sex", "sex").unwrap());
/// let result = fit(&model, &data).unwrap();
/// ```
pub fn fit(model: &ModelDescription, data: &SpatialDataset) -> Result<StatsResult> {
    model.validate(data.covariates())?;
    info!("Fitting {} at {} locations.", model, data.num_active_locations());
    debug!(
        "Dataset has {} subjects and {} of {} locations active.",
        data.num_subjects(),
        data.num_active_locations(),
        data.location_count()
    );

    let result = match &model.kind {
        AnalysisKind::Correlation { variable } => correlation(variable, data)?,
        AnalysisKind::Anova { full, null, effect } => anova(full, null, effect, data)?,
        AnalysisKind::UnpairedTTest { group } => unpaired_ttest(group, data)?,
        AnalysisKind::PairedTTest { group, pair } => paired_ttest(group, pair, data)?,
    };
    debug!(
        "Fit done, {} locations with |p| < 0.05 before correction.",
        result.pvalues().iter().filter(|p| p.abs() < 0.05).count()
    );
    Ok(result)
}

/// Attach the direction of an effect to a p-value. The magnitude is kept above zero so the sign survives.
fn signed_pvalue(p: f64, direction: f64) -> f64 {
    if p.is_nan() {
        return 1.0;
    }
    let p = p.max(f64::MIN_POSITIVE);
    if direction < 0.0 {
        -p
    } else {
        p
    }
}

fn has_no_variance(centered_ss: f64, raw_ss: f64) -> bool {
    !(centered_ss > ZERO_VARIANCE_TOL * raw_ss)
}

fn column_means(y: &ArrayView2<f64>) -> Result<Array1<f64>> {
    y.mean_axis(Axis(0))
        .ok_or_else(|| NeurostatsError::ModelFailure(String::from("Cannot fit a model to a dataset without subjects.")))
}

/// Pearson correlation of a numeric covariate with every location.
///
/// `t = r * sqrt((n - 2) / (1 - r²))` and `p = 1 - CDF(|t|)` of the t distribution with `n - 2` degrees of freedom,
/// signed by `r`.
fn correlation(variable: &str, data: &SpatialDataset) -> Result<StatsResult> {
    let n = data.num_subjects();
    let dist = t_distribution(n.saturating_sub(2))?;

    let predictor = Array1::from(data.covariates().numeric(variable)?.to_vec());
    let predictor_mean = predictor.sum() / n as f64;
    let pc = predictor.mapv(|v| v - predictor_mean);
    let ss_p = pc.dot(&pc);
    let p_degenerate = has_no_variance(ss_p, predictor.dot(&predictor));

    let y = data.measurements();
    let yc = &y - &column_means(&y)?;
    let cross = pc.dot(&yc);
    let ss_y = yc.mapv(|v| v * v).sum_axis(Axis(0));
    let raw_ss_y = y.mapv(|v| v * v).sum_axis(Axis(0));

    let df = n as f64 - 2.0;
    let m = data.num_active_locations();
    let mut pvalues = Array1::ones(m);
    let mut tvalues = Array1::zeros(m);
    let mut corrvalues = Array1::zeros(m);
    for j in 0..m {
        if p_degenerate || has_no_variance(ss_y[j], raw_ss_y[j]) {
            continue;
        }
        let r = (cross[j] / (ss_y[j] * ss_p).sqrt()).max(-1.0).min(1.0);
        let t = r * (df / (1.0 - r * r)).sqrt();
        pvalues[j] = signed_pvalue(t_survival(&dist, t), r);
        tvalues[j] = t;
        corrvalues[j] = r;
    }
    Ok(StatsResult::new(pvalues, tvalues).with_correlations(corrvalues))
}

/// Nested model F-test, signed by the coefficient of the effect of interest in the full model.
fn anova(full: &Formula, null: &Formula, effect: &str, data: &SpatialDataset) -> Result<StatsResult> {
    let covariates = data.covariates();
    let x_full = DesignMatrix::build(full, covariates)?;
    let x_null = DesignMatrix::build(null, covariates)?;
    let n = data.num_subjects();
    let df_full = x_full.num_params();
    let df_null = x_null.num_params();
    if df_full <= df_null || n <= df_full + 1 {
        return Err(NeurostatsError::ModelFailure(format!(
            "Cannot compare a full model with {} and a null model with {} parameters on {} subjects. Perhaps the data is insufficient to fit the model?",
            df_full, df_null, n
        )));
    }
    let effect_col = x_full
        .columns_of(effect)
        .map(|cols| cols.start)
        .ok_or_else(|| NeurostatsError::MissingCovariate(effect.to_string(), String::from("the fullmodel= field")))?;

    let y = data.measurements().to_owned();
    let fit_full = OlsFit::fit(&x_full.matrix, &y)?;
    let fit_null = OlsFit::fit(&x_null.matrix, &y)?;
    debug!(
        "Fitted full model ({} columns) and null model ({} columns).",
        x_full.num_columns(),
        x_null.num_columns()
    );

    let fstats = nested_f_statistics(&fit_full.rss, &fit_null.rss, df_full, df_null, n);
    let dist = f_distribution(df_full - df_null, n - df_full - 1)?;
    let beta = fit_full.beta.row(effect_col);
    let se = fit_full.std_errors(effect_col);
    let (ss_y, raw_ss_y) = sums_of_squares(&y, &column_means(&y.view())?);

    let m = data.num_active_locations();
    let mut pvalues = Array1::ones(m);
    let mut tvalues = Array1::zeros(m);
    for j in 0..m {
        if has_no_variance(ss_y[j], raw_ss_y[j]) {
            continue;
        }
        let p = f_survival(&dist, fstats[j]);
        pvalues[j] = signed_pvalue(p, beta[j] + f64::EPSILON);
        let t = beta[j] / se[j].max(f64::EPSILON);
        tvalues[j] = if t.is_nan() { 0.0 } else { t };
    }
    Ok(StatsResult::new(pvalues, tvalues))
}

/// Row indices of the subjects at each level of a covariate, levels in sorted order.
fn rows_by_level(covariate: &Covariate) -> Vec<(String, Vec<usize>)> {
    let keys = covariate.keys();
    covariate
        .levels()
        .into_iter()
        .map(|level| {
            let rows = keys
                .iter()
                .enumerate()
                .filter(|(_, k)| **k == level)
                .map(|(idx, _)| idx)
                .collect();
            (level, rows)
        })
        .collect()
}

fn two_levels(name: &str, covariate: &Covariate) -> Result<(Vec<usize>, Vec<usize>)> {
    let mut levels = rows_by_level(covariate);
    if levels.len() != 2 {
        return Err(NeurostatsError::GroupCardinality(name.to_string(), levels.len()));
    }
    let (level1, rows1) = levels.remove(1);
    let (level0, rows0) = levels.remove(0);
    debug!(
        "Levels of '{}': '{}' with {} and '{}' with {} subjects.",
        name,
        level0,
        rows0.len(),
        level1,
        rows1.len()
    );
    Ok((rows0, rows1))
}

/// Centered sum of squares and uncentered sum of squares per column.
fn sums_of_squares(y: &Array2<f64>, mean: &Array1<f64>) -> (Array1<f64>, Array1<f64>) {
    let centered = (y - mean).mapv(|v| v * v).sum_axis(Axis(0));
    let raw = y.mapv(|v| v * v).sum_axis(Axis(0));
    (centered, raw)
}

/// Student's two-sample t-test with pooled variance, `t = mean(level0) - mean(level1)` over its standard error.
fn unpaired_ttest(group: &str, data: &SpatialDataset) -> Result<StatsResult> {
    let (rows0, rows1) = two_levels(group, data.covariates().require(group, "the group= field")?)?;
    let (n0, n1) = (rows0.len(), rows1.len());
    let dist = t_distribution((n0 + n1).saturating_sub(2))?;

    let y = data.measurements();
    let y0 = y.select(Axis(0), &rows0);
    let y1 = y.select(Axis(0), &rows1);
    let mean0 = column_means(&y0.view())?;
    let mean1 = column_means(&y1.view())?;
    let (ss0, raw0) = sums_of_squares(&y0, &mean0);
    let (ss1, raw1) = sums_of_squares(&y1, &mean1);

    let df = (n0 + n1 - 2) as f64;
    let scale = 1.0 / n0 as f64 + 1.0 / n1 as f64;
    let m = data.num_active_locations();
    let mut pvalues = Array1::ones(m);
    let mut tvalues = Array1::zeros(m);
    for j in 0..m {
        let ss = ss0[j] + ss1[j];
        if has_no_variance(ss, raw0[j] + raw1[j]) {
            continue;
        }
        let t = (mean0[j] - mean1[j]) / (ss / df * scale).sqrt();
        pvalues[j] = signed_pvalue((2.0 * t_survival(&dist, t)).min(1.0), t);
        tvalues[j] = t;
    }
    Ok(StatsResult::new(pvalues, tvalues))
}

/// Paired t-test between the two levels of `pair`, on the differences `level0 - level1`.
///
/// The values of `group` must appear in the same order at both levels, so that row `i` of one level and row `i` of
/// the other belong to the same entity.
fn paired_ttest(group: &str, pair: &str, data: &SpatialDataset) -> Result<StatsResult> {
    let covariates = data.covariates();
    let group_keys = covariates.require(group, "the group= field")?.keys();
    let (rows0, rows1) = two_levels(pair, covariates.require(pair, "the pair= field")?)?;

    let keys0: Vec<&String> = rows0.iter().map(|r| &group_keys[*r]).collect();
    let keys1: Vec<&String> = rows1.iter().map(|r| &group_keys[*r]).collect();
    if keys0 != keys1 {
        return Err(NeurostatsError::PairingMismatch(group.to_string(), pair.to_string()));
    }

    let n = rows0.len();
    let dist = t_distribution(n.saturating_sub(1))?;
    let y = data.measurements();
    let diff = &y.select(Axis(0), &rows0) - &y.select(Axis(0), &rows1);
    let mean = column_means(&diff.view())?;
    let (ss, raw) = sums_of_squares(&diff, &mean);

    let m = data.num_active_locations();
    let mut pvalues = Array1::ones(m);
    let mut tvalues = Array1::zeros(m);
    for j in 0..m {
        if has_no_variance(ss[j], raw[j]) {
            continue;
        }
        let sd = (ss[j] / (n - 1) as f64).sqrt();
        let t = mean[j] / (sd / (n as f64).sqrt());
        pvalues[j] = signed_pvalue((2.0 * t_survival(&dist, t)).min(1.0), t);
        tvalues[j] = t;
    }
    Ok(StatsResult::new(pvalues, tvalues))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::demographics::CovariateTable;
    use crate::model::Domain;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::arr2;

    fn dataset(columns: Vec<(&str, Covariate)>, measurements: Array2<f64>) -> SpatialDataset {
        let table = CovariateTable::from_columns(columns).unwrap();
        let locations = measurements.ncols();
        SpatialDataset::new(measurements, table, locations).unwrap()
    }

    fn model(kind: AnalysisKind) -> ModelDescription {
        ModelDescription::new(Domain::Surface, kind)
    }

    fn categorical(values: &[&str]) -> Covariate {
        Covariate::Categorical(values.iter().map(|v| v.to_string()).collect())
    }

    #[test]
    fn perfectly_linear_locations_correlate_fully() {
        let age: Vec<f64> = (0..8).map(|v| 20.0 + v as f64).collect();
        let y = Array2::from_shape_fn((8, 2), |(i, j)| if j == 0 { 2.0 * age[i] + 1.0 } else { -age[i] });
        let data = dataset(vec![("age", Covariate::Numeric(age))], y);
        let result = fit(&model(AnalysisKind::Correlation { variable: "age".into() }), &data).unwrap();

        assert_abs_diff_eq!(result.corrvalues()[0], 1.0, epsilon = 1e-9);
        assert!(result.pvalues()[0] > 0.0 && result.pvalues()[0] < 1e-6);
        assert_abs_diff_eq!(result.corrvalues()[1], -1.0, epsilon = 1e-9);
        assert!(result.pvalues()[1] < 0.0 && result.pvalues()[1] > -1e-6);
    }

    #[test]
    fn correlation_matches_hand_computation() {
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let y = arr2(&[[2.0], [1.0], [4.0], [3.0], [5.0]]);
        let data = dataset(vec![("x", Covariate::Numeric(x))], y);
        let result = fit(&model(AnalysisKind::Correlation { variable: "x".into() }), &data).unwrap();

        // r = 8 / 10, t = 0.8 * sqrt(3 / 0.36), upper tail of t(3) at 2.309 is about 0.052.
        assert_relative_eq!(result.corrvalues()[0], 0.8, epsilon = 1e-12);
        assert_relative_eq!(result.tvalues()[0], 0.8 * (3.0f64 / 0.36).sqrt(), epsilon = 1e-9);
        assert!(result.pvalues()[0] > 0.05 && result.pvalues()[0] < 0.055);
    }

    #[test]
    fn constant_locations_are_not_significant() {
        let y = arr2(&[[3.0, 1.0], [3.0, 2.0], [3.0, 4.0], [3.0, 3.0]]);
        let data = dataset(vec![("age", Covariate::Numeric(vec![1.0, 2.0, 3.0, 4.0]))], y);
        let result = fit(&model(AnalysisKind::Correlation { variable: "age".into() }), &data).unwrap();

        assert_eq!(1.0, result.pvalues()[0]);
        assert_eq!(0.0, result.tvalues()[0]);
        assert_eq!(0.0, result.corrvalues()[0]);
        assert!(result.pvalues()[1].abs() < 1.0);
    }

    #[test]
    fn anova_detects_the_effect_of_interest() {
        let age = vec![21.0, 25.0, 30.0, 34.0, 41.0, 45.0, 52.0, 58.0, 60.0, 66.0];
        let sex = categorical(&["F", "M", "F", "M", "F", "M", "F", "M", "F", "M"]);
        let noise = [0.3, -0.2, 0.1, -0.4, 0.2, 0.0, -0.1, 0.3, -0.3, 0.1];
        let y = Array2::from_shape_fn((10, 2), |(i, j)| {
            if j == 0 {
                10.0 - 0.05 * age[i] + noise[i]
            } else {
                5.0 + noise[i]
            }
        });
        let data = dataset(vec![("age", Covariate::Numeric(age)), ("sex", sex)], y);
        let result = fit(&model(AnalysisKind::anova("age + sex", "sex").unwrap()), &data).unwrap();

        assert_eq!(2, result.len());
        assert!(result.pvalues()[0] < 0.0 && result.pvalues()[0] > -0.001);
        assert!(result.tvalues()[0] < -3.0);
        assert!(result.pvalues()[1].abs() > 0.05);
        assert!(!result.has_correlations());
    }

    #[test]
    fn anova_leaves_constant_locations_at_zero() {
        let age = vec![21.0, 25.0, 30.0, 34.0, 41.0, 45.0, 52.0, 58.0];
        let sex = categorical(&["F", "M", "F", "M", "F", "M", "F", "M"]);
        let levels = [1.0, 3.7, 0.1, 1000.3, 0.7];
        let y = Array2::from_shape_fn((8, 5), |(_, j)| levels[j]);
        let data = dataset(vec![("age", Covariate::Numeric(age)), ("sex", sex)], y);
        let result = fit(&model(AnalysisKind::anova("age + sex", "sex").unwrap()), &data).unwrap();

        for j in 0..levels.len() {
            assert_eq!(1.0, result.pvalues()[j]);
            assert_eq!(0.0, result.tvalues()[j]);
        }
    }

    #[test]
    fn singular_designs_fail_the_whole_fit() {
        let age = vec![20.0, 30.0, 40.0, 50.0, 60.0];
        let y = arr2(&[[1.0], [2.0], [2.5], [4.0], [5.5]]);
        let data = dataset(
            vec![("age", Covariate::Numeric(age.clone())), ("age_copy", Covariate::Numeric(age))],
            y,
        );
        let res = fit(&model(AnalysisKind::anova("age + age_copy", "age_copy").unwrap()), &data);
        assert!(matches!(res, Err(NeurostatsError::ModelFailure(_))));
    }

    #[test]
    fn unpaired_ttest_matches_hand_computation() {
        let y = arr2(&[[1.0, 5.0], [2.0, 5.0], [3.0, 5.0], [4.0, 5.0], [5.0, 5.0], [6.0, 5.0]]);
        let group = categorical(&["a", "a", "a", "b", "b", "b"]);
        let data = dataset(vec![("dx", group)], y);
        let result = fit(&model(AnalysisKind::UnpairedTTest { group: "dx".into() }), &data).unwrap();

        // Means 2 and 5, pooled variance 1.
        assert_relative_eq!(result.tvalues()[0], -3.0 / (2.0f64 / 3.0).sqrt(), epsilon = 1e-9);
        assert!(result.pvalues()[0] < -0.02 && result.pvalues()[0] > -0.025);
        assert_eq!(1.0, result.pvalues()[1]);
        assert_eq!(0.0, result.tvalues()[1]);
    }

    #[test]
    fn ttests_need_exactly_two_groups() {
        let y = arr2(&[[1.0], [2.0], [3.0]]);
        let data = dataset(vec![("dx", categorical(&["a", "b", "c"]))], y);
        let res = fit(&model(AnalysisKind::UnpairedTTest { group: "dx".into() }), &data);
        assert!(matches!(res, Err(NeurostatsError::GroupCardinality(_, 3))));
    }

    #[test]
    fn paired_ttest_uses_level_differences() {
        let y = arr2(&[[10.0], [12.0], [9.0], [11.0], [8.0], [11.0], [9.0], [8.0]]);
        let subject = categorical(&["s1", "s2", "s3", "s4", "s1", "s2", "s3", "s4"]);
        let visit = Covariate::Numeric(vec![1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0]);
        let data = dataset(vec![("subject", subject), ("visit", visit)], y);
        let kind = AnalysisKind::PairedTTest {
            group: "subject".into(),
            pair: "visit".into(),
        };
        let result = fit(&model(kind), &data).unwrap();

        // Differences [2, 1, 0, 3].
        let expected_t = 1.5 / ((5.0f64 / 3.0).sqrt() / 2.0);
        assert_relative_eq!(result.tvalues()[0], expected_t, epsilon = 1e-9);
        assert!(result.pvalues()[0] > 0.1 && result.pvalues()[0] < 0.11);
    }

    #[test]
    fn mismatched_pairs_are_rejected_before_fitting() {
        let y = arr2(&[[1.0], [2.0], [3.0], [4.0]]);
        let subject = categorical(&["s1", "s2", "s2", "s1"]);
        let visit = categorical(&["pre", "pre", "post", "post"]);
        let data = dataset(vec![("subject", subject), ("visit", visit)], y);
        let kind = AnalysisKind::PairedTTest {
            group: "subject".into(),
            pair: "visit".into(),
        };
        assert!(matches!(
            fit(&model(kind), &data),
            Err(NeurostatsError::PairingMismatch(ref g, ref p)) if g == "subject" && p == "visit"
        ));
    }

    #[test]
    fn pairing_levels_of_different_size_are_rejected() {
        let y = arr2(&[[1.0], [2.0], [3.0], [4.0]]);
        let subject = categorical(&["s1", "s2", "s3", "s1"]);
        let visit = categorical(&["pre", "pre", "pre", "post"]);
        let data = dataset(vec![("subject", subject), ("visit", visit)], y);
        let kind = AnalysisKind::PairedTTest {
            group: "subject".into(),
            pair: "visit".into(),
        };
        assert!(matches!(fit(&model(kind), &data), Err(NeurostatsError::PairingMismatch(_, _))));
    }

    #[test]
    fn signed_pvalues_keep_their_direction() {
        assert_eq!(-0.5, signed_pvalue(0.5, -2.0));
        assert_eq!(1.0, signed_pvalue(f64::NAN, -2.0));
        assert!(signed_pvalue(0.0, -1.0) < 0.0);
        assert!(signed_pvalue(0.0, 0.0) > 0.0);
    }
}
