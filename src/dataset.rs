//! The subjects x locations measurement matrix together with the demographics of the subjects.

use log::{debug, info};
use ndarray::{Array2, ArrayView2, Axis};
use std::path::Path;

use crate::demographics::CovariateTable;
use crate::error::{NeurostatsError, Result};
use crate::fs_annot::FsAnnot;
use crate::fs_curv::read_curv;

/// Default maximal number of locations per block for chunked output.
pub const MAX_BLOCK_SIZE: usize = 20000;

/// Selects the locations that take part in an analysis.
#[derive(Debug, Clone)]
pub enum Mask<'a> {
    /// All vertices of the given atlas regions, region by region in the given id order.
    RoiIds { ids: Vec<i32>, atlas: &'a FsAnnot },
    /// All locations with a value > 0.
    Threshold(Vec<f32>),
}

impl<'a> Mask<'a> {
    /// The selected location indices for a geometry with `location_count` locations.
    pub fn active_locations(&self, location_count: usize) -> Result<Vec<usize>> {
        match self {
            Mask::RoiIds { ids, atlas } => {
                if atlas.num_vertices() != location_count {
                    return Err(NeurostatsError::DimensionMismatch(
                        String::from("vertices of the atlas parcellation"),
                        location_count,
                        atlas.num_vertices(),
                    ));
                }
                let mut seen: Vec<i32> = Vec::with_capacity(ids.len());
                let mut invalid: Vec<String> = Vec::new();
                let mut active: Vec<usize> = Vec::new();
                for id in ids {
                    if seen.contains(id) {
                        continue;
                    }
                    seen.push(*id);
                    match atlas.region_vertices(*id) {
                        Some(verts) if !verts.is_empty() => active.extend(verts),
                        _ => invalid.push(id.to_string()),
                    }
                }
                if !invalid.is_empty() {
                    return Err(NeurostatsError::InvalidRoiId(invalid.join(", ")));
                }
                if active.is_empty() {
                    return Err(NeurostatsError::EmptyMask(String::from("ROI id list")));
                }
                Ok(active)
            }
            Mask::Threshold(values) => {
                if values.len() != location_count {
                    return Err(NeurostatsError::DimensionMismatch(
                        String::from("locations of the mask"),
                        location_count,
                        values.len(),
                    ));
                }
                let active: Vec<usize> = values
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| **v > 0.0)
                    .map(|(idx, _)| idx)
                    .collect();
                if active.is_empty() {
                    return Err(NeurostatsError::EmptyMask(String::from("image")));
                }
                Ok(active)
            }
        }
    }
}

/// Measurements of all subjects at all active locations, aligned row by row with the covariate table.
#[derive(Debug, Clone)]
pub struct SpatialDataset {
    measurements: Array2<f64>,
    covariates: CovariateTable,
    location_count: usize,
    active_location_index: Vec<usize>,
    masked: bool,
}

impl SpatialDataset {
    /// Create a dataset from an in-memory matrix with one row per subject and one column per location.
    ///
    /// The row count must match the covariate table, the column count must be `location_count`, and every value
    /// must be finite.
    pub fn new(measurements: Array2<f64>, covariates: CovariateTable, location_count: usize) -> Result<SpatialDataset> {
        let (rows, cols) = measurements.dim();
        if rows != covariates.row_count() {
            return Err(NeurostatsError::DimensionMismatch(
                String::from("subjects in the measurements and the demographics table"),
                covariates.row_count(),
                rows,
            ));
        }
        if cols != location_count {
            return Err(NeurostatsError::DimensionMismatch(
                String::from("locations per subject"),
                location_count,
                cols,
            ));
        }
        if let Some(((subject, location), _)) = measurements.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(NeurostatsError::NonFinite(subject, location));
        }
        Ok(SpatialDataset {
            measurements,
            covariates,
            location_count,
            active_location_index: (0..location_count).collect(),
            masked: false,
        })
    }

    /// Load the per-subject curv files named in the `fileid` column of the demographics table.
    ///
    /// The number of locations is defined by the atlas curv file. Every subject file must have exactly that many
    /// values.
    pub fn from_curv_files<P: AsRef<Path>>(covariates: CovariateTable, fileid: &str, atlas: P) -> Result<SpatialDataset> {
        let location_count = read_curv(atlas.as_ref())?.data.len();
        let files = covariates.strings(fileid)?;
        info!(
            "Reading data of {} subjects with {} locations each.",
            files.len(),
            location_count
        );

        let mut measurements = Array2::<f64>::zeros((files.len(), location_count));
        for (mut row, file) in measurements.axis_iter_mut(Axis(0)).zip(files.iter()) {
            let curv = read_curv(file)?;
            if curv.data.len() != location_count {
                return Err(NeurostatsError::DimensionMismatch(
                    format!("locations in file '{}' and the atlas", file),
                    location_count,
                    curv.data.len(),
                ));
            }
            for (dst, src) in row.iter_mut().zip(curv.data.iter()) {
                *dst = *src as f64;
            }
            debug!("Read {} values from '{}'.", curv.data.len(), file);
        }
        SpatialDataset::new(measurements, covariates, location_count)
    }

    /// Narrow the dataset to the locations selected by the mask. This can only be done once.
    pub fn apply_mask(&mut self, mask: &Mask) -> Result<()> {
        if self.masked {
            return Err(NeurostatsError::Config(String::from("A mask has already been applied to the dataset.")));
        }
        let active = mask.active_locations(self.location_count)?;
        self.measurements = self.measurements.select(Axis(1), &active);
        info!(
            "Masking retained {} of {} locations.",
            active.len(),
            self.location_count
        );
        self.active_location_index = active;
        self.masked = true;
        Ok(())
    }

    /// The measurements at the active locations, subjects x active locations.
    pub fn measurements(&self) -> ArrayView2<f64> {
        self.measurements.view()
    }

    pub fn covariates(&self) -> &CovariateTable {
        &self.covariates
    }

    pub fn num_subjects(&self) -> usize {
        self.measurements.nrows()
    }

    pub fn location_count(&self) -> usize {
        self.location_count
    }

    pub fn active_location_index(&self) -> &[usize] {
        &self.active_location_index
    }

    pub fn num_active_locations(&self) -> usize {
        self.active_location_index.len()
    }

    /// Split the active locations into contiguous `(start, end)` blocks of at most `max_block_size` locations.
    pub fn blocks(&self, max_block_size: usize) -> Vec<(usize, usize)> {
        let total = self.num_active_locations();
        let size = max_block_size.max(1);
        (0..total)
            .step_by(size)
            .map(|start| (start, (start + size).min(total)))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::demographics::Covariate;
    use crate::fs_annot::FsAnnotColortable;
    use ndarray::arr2;

    fn table(n: usize) -> CovariateTable {
        CovariateTable::from_columns(vec![("age", Covariate::Numeric((0..n).map(|v| v as f64).collect()))]).unwrap()
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let data = arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert!(matches!(
            SpatialDataset::new(data.clone(), table(3), 3),
            Err(NeurostatsError::DimensionMismatch(_, 3, 2))
        ));
        assert!(matches!(
            SpatialDataset::new(data, table(2), 4),
            Err(NeurostatsError::DimensionMismatch(_, 4, 3))
        ));
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let data = arr2(&[[1.0, 2.0], [f64::NAN, 5.0]]);
        assert!(matches!(
            SpatialDataset::new(data, table(2), 2),
            Err(NeurostatsError::NonFinite(1, 0))
        ));
    }

    #[test]
    fn threshold_masks_select_positive_locations_once() {
        let data = arr2(&[[1.0, 2.0, 3.0, 4.0], [5.0, 6.0, 7.0, 8.0]]);
        let mut ds = SpatialDataset::new(data, table(2), 4).unwrap();
        ds.apply_mask(&Mask::Threshold(vec![0.0, 1.0, 0.0, 255.0])).unwrap();

        assert_eq!(&[1usize, 3], ds.active_location_index());
        assert_eq!(arr2(&[[2.0, 4.0], [6.0, 8.0]]), ds.measurements());
        assert_eq!(4, ds.location_count());
        assert!(ds.apply_mask(&Mask::Threshold(vec![1.0; 4])).is_err());
    }

    #[test]
    fn empty_threshold_masks_are_rejected() {
        let mut ds = SpatialDataset::new(arr2(&[[1.0, 2.0]]), table(1), 2).unwrap();
        assert!(matches!(
            ds.apply_mask(&Mask::Threshold(vec![0.0, -1.0])),
            Err(NeurostatsError::EmptyMask(_))
        ));
    }

    #[test]
    fn roi_masks_follow_the_id_order() {
        let mut colortable = FsAnnotColortable::default();
        colortable.push(10, String::from("a"), [1, 0, 0, 0]);
        colortable.push(20, String::from("b"), [2, 0, 0, 0]);
        let atlas = FsAnnot {
            vertex_labels: vec![1, 2, 1, 2, 2],
            colortable,
        };
        let mask = Mask::RoiIds { ids: vec![20, 10], atlas: &atlas };
        assert_eq!(vec![1, 3, 4, 0, 2], mask.active_locations(5).unwrap());

        let unknown = Mask::RoiIds { ids: vec![10, 99], atlas: &atlas };
        assert!(matches!(unknown.active_locations(5), Err(NeurostatsError::InvalidRoiId(ref ids)) if ids == "99"));
        assert!(mask.active_locations(6).is_err());

        let empty = Mask::RoiIds { ids: vec![], atlas: &atlas };
        assert!(matches!(empty.active_locations(5), Err(NeurostatsError::EmptyMask(_))));
    }

    #[test]
    fn blocks_cover_all_active_locations() {
        let ds = SpatialDataset::new(Array2::zeros((1, 5)), table(1), 5).unwrap();
        assert_eq!(vec![(0, 2), (2, 4), (4, 5)], ds.blocks(2));
        assert_eq!(vec![(0, 5)], ds.blocks(MAX_BLOCK_SIZE));
    }
}
