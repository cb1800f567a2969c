//! The validated description of a statistical model: which procedure to run and on which covariates.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::demographics::CovariateTable;
use crate::error::{NeurostatsError, Result};
use crate::util::file_stem;

/// The kind of spatial data an analysis runs on. It only affects naming, never the statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    /// Per-vertex data on a cortical surface (cortical morphometry).
    Surface,
    /// Per-voxel data in a volume (tensor, voxel or diffusion morphometry).
    Volume,
    /// Per-region scalar data.
    Roi,
}

impl Domain {
    /// Map the analysis type of a model specification to its domain.
    pub fn from_analysis_type(analysis_type: &str) -> Result<Domain> {
        match analysis_type {
            "cbm" => Ok(Domain::Surface),
            "tbm" | "vbm" | "dbm" => Ok(Domain::Volume),
            "croi" | "droi" => Ok(Domain::Roi),
            other => Err(NeurostatsError::InvalidAnalysisKind(other.to_string())),
        }
    }

    pub fn is_spatial(&self) -> bool {
        !matches!(self, Domain::Roi)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Domain::Surface => "surface",
            Domain::Volume => "volume",
            Domain::Roi => "roi",
        };
        write!(f, "{}", name)
    }
}

/// An additive model formula like `age + sex + ICV`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formula {
    terms: Vec<String>,
}

impl Formula {
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn contains(&self, term: &str) -> bool {
        self.terms.iter().any(|t| t == term)
    }
}

impl FromStr for Formula {
    type Err = NeurostatsError;

    fn from_str(s: &str) -> Result<Formula> {
        let mut terms: Vec<String> = Vec::new();
        for term in s.split('+').map(|t| t.trim()) {
            if term.is_empty() {
                return Err(NeurostatsError::Config(format!("Empty term in model formula '{}'.", s)));
            }
            if !terms.iter().any(|t| t == term) {
                terms.push(term.to_string());
            }
        }
        Ok(Formula { terms })
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.terms.join(" + "))
    }
}

/// The statistical procedure of an analysis together with the covariates it needs.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisKind {
    /// Pearson correlation of the measurements with one numeric covariate.
    Correlation { variable: String },
    /// F-test comparing nested linear models. `effect` is the single term of `full` missing from `null`.
    Anova {
        full: Formula,
        null: Formula,
        effect: String,
    },
    /// Two-sample t-test between the two groups defined by `group`.
    UnpairedTTest { group: String },
    /// Paired t-test between the two levels of `pair`, matched by the values of `group`.
    PairedTTest { group: String, pair: String },
}

impl AnalysisKind {
    /// Create a nested-model ANOVA, deriving the effect of interest.
    ///
    /// The null model must be nested in the full model, and the full model must have exactly one additional term.
    pub fn anova(full: &str, null: &str) -> Result<AnalysisKind> {
        let full: Formula = full.parse()?;
        let null: Formula = null.parse()?;
        let no_unique = || NeurostatsError::NoUniqueEffect(full.to_string(), null.to_string());

        if null.terms().iter().any(|t| !full.contains(t)) {
            return Err(no_unique());
        }
        let unique: Vec<&String> = full.terms().iter().filter(|t| !null.contains(t)).collect();
        if unique.len() != 1 {
            return Err(no_unique());
        }
        let effect = unique[0].clone();
        Ok(AnalysisKind::Anova { full, null, effect })
    }

    /// The test name used in output file names.
    pub fn test_name(&self) -> &'static str {
        match self {
            AnalysisKind::Correlation { .. } => "corr",
            AnalysisKind::Anova { .. } => "anova",
            AnalysisKind::UnpairedTTest { .. } => "unpaired_ttest",
            AnalysisKind::PairedTTest { .. } => "paired_ttest",
        }
    }

    /// The covariate the result is about.
    pub fn effect_name(&self) -> &str {
        match self {
            AnalysisKind::Correlation { variable } => variable,
            AnalysisKind::Anova { effect, .. } => effect,
            AnalysisKind::UnpairedTTest { group } => group,
            AnalysisKind::PairedTTest { pair, .. } => pair,
        }
    }
}

/// A fully specified model, ready to be fitted against a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescription {
    pub domain: Domain,
    pub kind: AnalysisKind,
}

impl ModelDescription {
    pub fn new(domain: Domain, kind: AnalysisKind) -> ModelDescription {
        ModelDescription { domain, kind }
    }

    /// Check that every covariate the model refers to exists in the table, and that numeric terms are numeric.
    pub fn validate(&self, covariates: &CovariateTable) -> Result<()> {
        match &self.kind {
            AnalysisKind::Correlation { variable } => {
                covariates.require(variable, "the variable= field")?;
                covariates.numeric(variable)?;
            }
            AnalysisKind::Anova { full, null, effect } => {
                for term in full.terms() {
                    covariates.require(term, "the fullmodel= field")?;
                }
                for term in null.terms() {
                    covariates.require(term, "the nullmodel= field")?;
                }
                if !covariates.require(effect, "the fullmodel= field")?.is_numeric() {
                    return Err(NeurostatsError::Config(format!(
                        "The variable for the main effect '{}' is not numeric. Please recode as numeric and rerun.",
                        effect
                    )));
                }
            }
            AnalysisKind::UnpairedTTest { group } => {
                covariates.require(group, "the group= field")?;
            }
            AnalysisKind::PairedTTest { group, pair } => {
                covariates.require(group, "the group= field")?;
                covariates.require(pair, "the pair= field")?;
            }
        }
        Ok(())
    }

    /// The prefix of all output files, `<test>_<effect>_<atlas name>`.
    pub fn output_prefix<P: AsRef<Path>>(&self, atlas: P) -> String {
        format!("{}_{}_{}", self.kind.test_name(), self.kind.effect_name(), file_stem(atlas))
    }
}

impl fmt::Display for ModelDescription {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            AnalysisKind::Correlation { variable } => {
                write!(f, "{} correlation with '{}'", self.domain, variable)
            }
            AnalysisKind::Anova { full, null, effect } => write!(
                f,
                "{} ANOVA of '{}' (full model: {}, null model: {})",
                self.domain, effect, full, null
            ),
            AnalysisKind::UnpairedTTest { group } => {
                write!(f, "{} unpaired t-test between the groups of '{}'", self.domain, group)
            }
            AnalysisKind::PairedTTest { group, pair } => write!(
                f,
                "{} paired t-test between the levels of '{}', paired by '{}'",
                self.domain, pair, group
            ),
        }
    }
}
