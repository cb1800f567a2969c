use quick_error::quick_error;
use std::io::Error as IOError;

quick_error! {
    /// Error type for all error variants originated by this crate.
    #[derive(Debug)]
    pub enum NeurostatsError {
        /// The model specification is malformed or incomplete.
        Config(msg: String) {
            display("Invalid model specification: {}", msg)
        }

        /// A covariate named in the model does not exist in the demographics table.
        MissingCovariate(name: String, context: String) {
            display("The covariate named '{}' specified in {} does not exist in the demographics table. Please check for typos.", name, context)
        }

        InvalidAnalysisKind(kind: String) {
            display("Invalid analysis type '{}'. Valid analysis types are vbm, tbm, cbm, dbm, croi, droi.", kind)
        }

        /// The full model does not contain exactly one term that is absent from the null model.
        NoUniqueEffect(full: String, null: String) {
            display("The full model '{}' must contain exactly one covariate that is not part of the null model '{}'.", full, null)
        }

        UnsupportedMethod(name: String) {
            display("Unsupported multiple comparisons method '{}', method has to be BH.", name)
        }

        /// Per-subject data does not match the reference geometry or the demographics table.
        DimensionMismatch(what: String, expected: usize, found: usize) {
            display("Dimension mismatch for {}: expected {}, found {}.", what, expected, found)
        }

        NonFinite(subject: usize, location: usize) {
            display("Non-finite measurement for subject row {} at location {}.", subject, location)
        }

        NonFiniteCovariate(covariate: String, row: usize) {
            display("The covariate '{}' has a non-finite value in row {}. Please check the demographics table.", covariate, row)
        }

        /// A grouping covariate does not partition the subjects into exactly two groups.
        GroupCardinality(covariate: String, found: usize) {
            display("For a 2-sample t-test, the number of distinct elements in the column '{}' must be exactly 2, found {}.", covariate, found)
        }

        PairingMismatch(group: String, pair: String) {
            display("Mismatch in pairs for data grouped by '{}' and '{}'. Please check the demographics table for missing data or duplicate entries.", group, pair)
        }

        MissingDemographics(file: String) {
            display("Some data may be missing from the demographics file '{}'. Check for empty cells, rows or trailing separators.", file)
        }

        EmptyMask(source: String) {
            display("Read zero elements from the mask {}. Any values that need to be masked must be > 0.", source)
        }

        InvalidRoiId(ids: String) {
            display("One or more ROI labels {} are not valid or do not belong to the atlas.", ids)
        }

        /// The linear system of a model could not be solved.
        ModelFailure(msg: String) {
            display("{}", msg)
        }

        InvalidCurvFormat {
            display("Invalid Curv file")
        }

        InvalidFsAnnotFormat {
            display("Invalid FreeSurfer annot file")
        }

        UnsupportedFsAnnotFormatVersion {
            display("Unsupported FreeSurfer annot file format version")
        }

        MissingRoiData(ids: String, file: String) {
            display("One or more ROIs {} in '{}' may be missing or contain NaNs.", ids, file)
        }

        InvalidRoiStatsFormat(file: String) {
            display("The file '{}' is not a valid roiwise stats file.", file)
        }

        /// I/O Error
        Io(err: IOError) {
            from()
            source(err)
        }

        Csv(err: csv::Error) {
            from()
            source(err)
        }

        Toml(err: toml::de::Error) {
            from()
            source(err)
        }
    }
}

/// Alias type for results originated from this crate.
pub type Result<T> = ::std::result::Result<T, NeurostatsError>;
