//! The model specification file: which subjects, which data and which statistical design.
//!
//! A model specification is a TOML file with a `[subjectinfo]` and an `[analysis]` section, plus exactly one design
//! section: `[model]` for a nested-model ANOVA, `[measure]` for a correlation or `[hypothesis]` for a t-test.
//!
//! ```toml
//! [subjectinfo]
//! subjectid = "subjID"
//! demographics = "demographics.csv"
//! fileid = "file"
//! atlas = "atlas.left.mid.curv"
//!
//! [analysis]
//! type = "cbm"
//!
//! [model]
//! fullmodel = "age + sex"
//! nullmodel = "sex"
//! test = "anova"
//! ```

use log::warn;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::demographics::CovariateTable;
use crate::error::{NeurostatsError, Result};
use crate::model::{AnalysisKind, Domain, ModelDescription};
use crate::roi_data::RoiMeasure;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubjectInfo {
    pub subjectid: String,
    pub demographics: String,
    pub fileid: String,
    pub atlas: String,
    pub maskfile: Option<String>,
    pub maskroiid: Option<Vec<i32>>,
    /// The parcellation that `maskroiid` refers to.
    pub atlaslabels: Option<String>,
    pub roimeasure: Option<String>,
    pub roiid: Option<Vec<i32>>,
    pub labeldesc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalysisSection {
    #[serde(rename = "type")]
    pub analysis_type: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelSection {
    pub fullmodel: String,
    pub nullmodel: String,
    pub test: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MeasureSection {
    pub coeff: String,
    pub variable: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HypothesisSection {
    pub group: String,
    pub test: String,
    pub pair: Option<String>,
}

/// A parsed model specification file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelSpec {
    pub subjectinfo: SubjectInfo,
    pub analysis: AnalysisSection,
    pub model: Option<ModelSection>,
    pub measure: Option<MeasureSection>,
    pub hypothesis: Option<HypothesisSection>,
    /// Directory that relative paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl ModelSpec {
    /// Read a model specification file. Relative paths in the file are relative to its directory.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// let spec = neurostats::ModelSpec::from_file("/data/study/modelspec.toml").unwrap();
    /// println!("Analysis type: {}", spec.analysis.analysis_type);
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<ModelSpec> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(NeurostatsError::Config(format!(
                "Modelspec file '{}' does not exist.",
                path.display()
            )));
        }
        let mut spec: ModelSpec = fs::read_to_string(path)?.parse()?;
        spec.base_dir = path.parent().map(|p| p.to_path_buf()).unwrap_or_default();
        Ok(spec)
    }

    pub fn domain(&self) -> Result<Domain> {
        Domain::from_analysis_type(&self.analysis.analysis_type)
    }

    /// Resolve a path from the specification against its base directory.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir.join(p)
        }
    }

    pub fn demographics_path(&self) -> PathBuf {
        self.resolve(&self.subjectinfo.demographics)
    }

    pub fn atlas_path(&self) -> PathBuf {
        self.resolve(&self.subjectinfo.atlas)
    }

    pub fn mask_path(&self) -> Option<PathBuf> {
        self.subjectinfo.maskfile.as_ref().map(|m| self.resolve(m))
    }

    pub fn atlas_labels_path(&self) -> Option<PathBuf> {
        self.subjectinfo.atlaslabels.as_ref().map(|a| self.resolve(a))
    }

    pub fn labeldesc_path(&self) -> Option<PathBuf> {
        self.subjectinfo.labeldesc.as_ref().map(|l| self.resolve(l))
    }

    /// The region measure of a region-wise analysis.
    pub fn roi_measure(&self) -> Result<RoiMeasure> {
        match &self.subjectinfo.roimeasure {
            Some(m) => m.parse(),
            None => Err(NeurostatsError::Config(String::from(
                "The roimeasure= field in [subjectinfo] is required for region-wise analysis.",
            ))),
        }
    }

    /// The statistical design, from the single design section of the file.
    pub fn analysis_kind(&self) -> Result<AnalysisKind> {
        let sections = [self.model.is_some(), self.measure.is_some(), self.hypothesis.is_some()];
        match sections.iter().filter(|s| **s).count() {
            0 => {
                return Err(NeurostatsError::Config(String::from(
                    "The modelspec needs one statistical design: a [model], [measure] or [hypothesis] section.",
                )))
            }
            1 => {}
            _ => {
                return Err(NeurostatsError::Config(String::from(
                    "The modelspec can only contain one statistical design ([model] or [measure] or [hypothesis]).",
                )))
            }
        }

        if let Some(model) = &self.model {
            if model.test != "anova" {
                return Err(NeurostatsError::Config(format!(
                    "Invalid test '{}' in [model]. The only supported test is anova.",
                    model.test
                )));
            }
            return AnalysisKind::anova(&model.fullmodel, &model.nullmodel);
        }
        if let Some(measure) = &self.measure {
            if measure.coeff != "corr" {
                return Err(NeurostatsError::Config(format!(
                    "Invalid coeff '{}' in [measure]. The only supported coefficient is corr.",
                    measure.coeff
                )));
            }
            return Ok(AnalysisKind::Correlation {
                variable: measure.variable.clone(),
            });
        }
        match &self.hypothesis {
            Some(hypothesis) => match (hypothesis.test.as_str(), &hypothesis.pair) {
                ("unpaired_ttest", pair) => {
                    if let Some(pair) = pair {
                        warn!("Ignoring pair = '{}' for the unpaired t-test.", pair);
                    }
                    Ok(AnalysisKind::UnpairedTTest {
                        group: hypothesis.group.clone(),
                    })
                }
                ("paired_ttest", Some(pair)) => Ok(AnalysisKind::PairedTTest {
                    group: hypothesis.group.clone(),
                    pair: pair.clone(),
                }),
                ("paired_ttest", None) => Err(NeurostatsError::Config(String::from(
                    "The paired t-test requires the pair= field in [hypothesis].",
                ))),
                (other, _) => Err(NeurostatsError::Config(format!(
                    "Invalid test '{}' in [hypothesis]. Valid tests are unpaired_ttest and paired_ttest.",
                    other
                ))),
            },
            None => Err(NeurostatsError::Config(String::from("Missing statistical design section."))),
        }
    }

    /// The validated model description. Every covariate named in the specification must exist in `covariates`.
    pub fn describe(&self, covariates: &CovariateTable) -> Result<ModelDescription> {
        covariates.require(&self.subjectinfo.subjectid, "the subjectid= field")?;
        covariates.require(&self.subjectinfo.fileid, "the fileid= field")?;
        let description = ModelDescription::new(self.domain()?, self.analysis_kind()?);
        description.validate(covariates)?;
        Ok(description)
    }
}

impl FromStr for ModelSpec {
    type Err = NeurostatsError;

    fn from_str(s: &str) -> Result<ModelSpec> {
        Ok(toml::from_str(s)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::demographics::Covariate;

    const SUBJECTINFO: &str = r#"
[subjectinfo]
subjectid = "subjID"
demographics = "demographics.csv"
fileid = "file"
atlas = "/data/atlas.curv"

[analysis]
type = "cbm"
"#;

    fn spec(design: &str) -> ModelSpec {
        format!("{}{}", SUBJECTINFO, design).parse().unwrap()
    }

    fn table() -> CovariateTable {
        CovariateTable::from_columns(vec![
            ("subjID", Covariate::Categorical(vec!["s1".into(), "s2".into()])),
            ("file", Covariate::Categorical(vec!["a.curv".into(), "b.curv".into()])),
            ("age", Covariate::Numeric(vec![20.0, 30.0])),
            ("sex", Covariate::Categorical(vec!["F".into(), "M".into()])),
        ])
        .unwrap()
    }

    #[test]
    fn model_sections_become_anova_descriptions() {
        let spec = spec("[model]\nfullmodel = \"age + sex\"\nnullmodel = \"sex\"\ntest = \"anova\"\n");
        let description = spec.describe(&table()).unwrap();
        assert_eq!(Domain::Surface, description.domain);
        assert_eq!("age", description.kind.effect_name());
        assert_eq!(PathBuf::from("/data/atlas.curv"), spec.atlas_path());
    }

    #[test]
    fn measure_and_hypothesis_sections_are_parsed() {
        let corr = spec("[measure]\ncoeff = \"corr\"\nvariable = \"age\"\n");
        assert_eq!(
            AnalysisKind::Correlation { variable: "age".into() },
            corr.analysis_kind().unwrap()
        );

        let unpaired = spec("[hypothesis]\ngroup = \"sex\"\ntest = \"unpaired_ttest\"\npair = \"visit\"\n");
        assert_eq!(
            AnalysisKind::UnpairedTTest { group: "sex".into() },
            unpaired.analysis_kind().unwrap()
        );

        let paired = spec("[hypothesis]\ngroup = \"subjID\"\ntest = \"paired_ttest\"\n");
        assert!(matches!(paired.analysis_kind(), Err(NeurostatsError::Config(_))));
    }

    #[test]
    fn exactly_one_design_section_is_allowed() {
        let none = spec("");
        assert!(matches!(none.analysis_kind(), Err(NeurostatsError::Config(_))));

        let two = spec("[measure]\ncoeff = \"corr\"\nvariable = \"age\"\n[hypothesis]\ngroup = \"sex\"\ntest = \"unpaired_ttest\"\n");
        assert!(matches!(two.analysis_kind(), Err(NeurostatsError::Config(_))));
    }

    #[test]
    fn unknown_covariates_and_types_are_rejected() {
        let missing = spec("[measure]\ncoeff = \"corr\"\nvariable = \"height\"\n");
        assert!(matches!(
            missing.describe(&table()),
            Err(NeurostatsError::MissingCovariate(ref name, _)) if name == "height"
        ));

        let bad_type: ModelSpec = SUBJECTINFO.replace("cbm", "xbm").parse().unwrap();
        assert!(matches!(bad_type.domain(), Err(NeurostatsError::InvalidAnalysisKind(_))));
        assert!(matches!("not toml [".parse::<ModelSpec>(), Err(NeurostatsError::Toml(_))));
    }

    #[test]
    fn relative_paths_resolve_against_the_spec_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modelspec.toml");
        fs::write(&path, format!("{}[measure]\ncoeff = \"corr\"\nvariable = \"age\"\n", SUBJECTINFO)).unwrap();
        let spec = ModelSpec::from_file(&path).unwrap();

        assert_eq!(dir.path().join("demographics.csv"), spec.demographics_path());
        assert!(spec.mask_path().is_none());
        assert!(ModelSpec::from_file(dir.path().join("missing.toml")).is_err());
    }
}
