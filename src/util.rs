//! Utility functions used in all other neurostats modules.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::bufread::GzDecoder;

use crate::error::Result;

/// Check whether the file extension ends with ".gz".
pub fn is_gz_file<P>(path: P) -> bool
where
    P: AsRef<Path>,
{
    path.as_ref()
        .file_name()
        .map(|a| a.to_string_lossy().ends_with(".gz"))
        .unwrap_or(false)
}

/// Open a file for reading, transparently decompressing it if its name ends with ".gz".
pub fn open_maybe_gz<P: AsRef<Path>>(path: P) -> Result<Box<dyn Read>> {
    let gz = is_gz_file(&path);
    let file = BufReader::new(File::open(path)?);
    if gz {
        Ok(Box::new(GzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

/// The file name of `path` without directories and without all extensions, e.g. `lh.white` for `/data/lh.white.curv.gz`
/// yields `lh`. Returns an empty string if the path has no file name.
pub fn file_stem<P: AsRef<Path>>(path: P) -> String {
    let name = path
        .as_ref()
        .file_name()
        .map(|a| a.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.find('.') {
        Some(0) | None => name,
        Some(pos) => name[..pos].to_string(),
    }
}

/// Transform signed p-values to signed -log10 p-values, so that small p-values become large magnitudes.
///
/// The sign of the input is preserved in the output: `out = -sign(p) * log10(|p| + eps)`.
pub fn log10_transform(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .map(|p| -signum(*p) * (p.abs() + f64::EPSILON).log10())
        .collect()
}

/// Sign function that maps `0.0` to `0.0`, unlike `f64::signum`.
pub fn signum(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}
