//! Mass-univariate statistics for brain morphometry data.
//!
//! For every location of a reference geometry (a surface vertex, a voxel or a region), a statistic is computed
//! across subjects: the correlation with a covariate, a nested-model ANOVA or a two-sample or paired t-test. The
//! signed p-values are then corrected for multiple comparisons with the Benjamini-Hochberg procedure.
//!
//! Per-subject data and result maps are FreeSurfer curv files, region masks come from FreeSurfer annot files.

pub mod dataset;
pub mod demographics;
pub mod design;
pub mod error;
pub mod fs_annot;
pub mod fs_curv;
pub mod glm;
pub mod labels;
pub mod model;
pub mod modelspec;
pub mod mult_comp;
pub mod roi_data;
pub mod roi_stats;
pub mod run;
pub mod stats_engine;
pub mod stats_output;
pub mod stats_result;
pub mod util;

pub use dataset::{Mask, SpatialDataset, MAX_BLOCK_SIZE};
pub use demographics::{Covariate, CovariateTable};
pub use design::DesignMatrix;
pub use error::{NeurostatsError, Result};
pub use fs_annot::{read_annot, FsAnnot, FsAnnotColortable};
pub use fs_curv::{read_curv, write_curv, CurvHeader, FsCurv};
pub use labels::LabelRegistry;
pub use model::{AnalysisKind, Domain, Formula, ModelDescription};
pub use modelspec::ModelSpec;
pub use mult_comp::{adjust, adjust_by_name, CorrectionMethod};
pub use roi_data::{read_roistats, RoiDataset, RoiMeasure, RoiStats};
pub use roi_stats::{anova_roi, write_roi_report, RoiAnova};
pub use run::{run_fdr, run_roi, run_spatial};
pub use stats_engine::fit;
pub use stats_output::StatsOutput;
pub use stats_result::{ResultAssembler, SpatialMaps, StatsResult};
pub use util::log10_transform;
