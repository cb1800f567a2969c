//! Functions for managing FreeSurfer brain surface parcellations in annot files.
//!
//! These files assign each vertex of a brain surface mesh to exactly one brain region
//! or label. A so-called colortable contains data on the regions, including the region's
//! name, an RGB display color, and a unique identifier. In this crate they define the
//! ROI masks of a spatial analysis.

use byteordered::ByteOrdered;

use std::fmt;
use std::io::Read;
use std::path::Path;

use crate::error::{NeurostatsError, Result};
use crate::util::open_maybe_gz;

/// Read a fixed length zero-terminated byte string of the given length from the input. Embedded '\0' chars are allowed, but not added to the returned String.
fn read_fixed_length_string<S>(input: &mut S, len: usize) -> Result<String>
where
    S: Read,
{
    let mut bytes = vec![0u8; len];
    input.read_exact(&mut bytes)?;
    Ok(bytes.iter().filter(|b| **b != 0).map(|b| *b as char).collect())
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FsAnnotColortable {
    pub id: Vec<i32>, // The region id, used to select regions in masks.
    pub name: Vec<String>,
    pub r: Vec<i32>,
    pub g: Vec<i32>,
    pub b: Vec<i32>,
    pub a: Vec<i32>,
    pub label: Vec<i32>, // Computed from r,g,b,a. Used in annot.vertex_labels to identify the region.
}

impl FsAnnotColortable {
    /// Read a colortable in format version 2. The input must be at the start position of the colortable.
    pub fn from_reader<S>(input: &mut S) -> Result<FsAnnotColortable>
    where
        S: Read,
    {
        let mut input = ByteOrdered::be(input);

        let num_chars_orig_filename = input.read_i32()?;
        if num_chars_orig_filename < 0 {
            return Err(NeurostatsError::InvalidFsAnnotFormat);
        }
        let _orig_filename = read_fixed_length_string(&mut input, num_chars_orig_filename as usize)?;
        let num_entries = input.read_i32()?;
        if num_entries < 0 {
            return Err(NeurostatsError::InvalidFsAnnotFormat);
        }

        let mut ct = FsAnnotColortable::default();
        for _ in 0..num_entries {
            let id = input.read_i32()?;
            let num_chars_name = input.read_i32()?;
            if num_chars_name < 0 {
                return Err(NeurostatsError::InvalidFsAnnotFormat);
            }
            let name = read_fixed_length_string(&mut input, num_chars_name as usize)?;
            let (r, g, b, a) = (input.read_i32()?, input.read_i32()?, input.read_i32()?, input.read_i32()?);
            ct.push(id, name, [r, g, b, a]);
        }
        Ok(ct)
    }

    /// Append a region, computing its vertex label from the color.
    pub fn push(&mut self, id: i32, name: String, rgba: [i32; 4]) {
        let [r, g, b, a] = rgba;
        self.id.push(id);
        self.name.push(name);
        self.r.push(r);
        self.g.push(g);
        self.b.push(b);
        self.a.push(a);
        self.label.push(r + (g << 8) + (b << 16) + (a << 24));
    }

    /// The vertex label of the region with the given id, if any.
    pub fn label_for_id(&self, region_id: i32) -> Option<i32> {
        self.id
            .iter()
            .position(|x| *x == region_id)
            .map(|idx| self.label[idx])
    }

    pub fn num_regions(&self) -> usize {
        self.id.len()
    }
}

impl fmt::Display for FsAnnotColortable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Colortable for {} brain regions.", self.id.len())
    }
}

/// Models a FreeSurfer brain surface parcellation from an annot file. The `vertex_labels` field contains one entry per
/// mesh vertex, in order, and assigns to each vertex a brain region using the `label` field (not the `id` field!)
/// from the `colortable`.
#[derive(Debug, Clone, PartialEq)]
pub struct FsAnnot {
    pub vertex_labels: Vec<i32>,
    pub colortable: FsAnnotColortable,
}

impl FsAnnot {
    /// Read an annot file. Gzip compressed files are supported if the file name ends with ".gz".
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<FsAnnot> {
        let mut input = open_maybe_gz(path)?;
        FsAnnot::from_reader(&mut input)
    }

    pub fn from_reader<S>(input: &mut S) -> Result<FsAnnot>
    where
        S: Read,
    {
        let mut input = ByteOrdered::be(input);

        let num_vertices = input.read_i32()?;
        if num_vertices < 0 {
            return Err(NeurostatsError::InvalidFsAnnotFormat);
        }

        // The stored 0-based vertex indices are implied by the order and skipped.
        let mut vertex_labels: Vec<i32> = Vec::with_capacity(num_vertices as usize);
        for _ in 0..num_vertices {
            let _vertex_index = input.read_i32()?;
            vertex_labels.push(input.read_i32()?);
        }

        let has_colortable = input.read_i32()?;
        if has_colortable != 1 {
            return Err(NeurostatsError::UnsupportedFsAnnotFormatVersion);
        }

        // A negative entry count encodes the file format version. We only support version 2.
        let format_version = input.read_i32()?;
        if format_version != -2 {
            return Err(NeurostatsError::UnsupportedFsAnnotFormatVersion);
        }
        let _max_region_id = input.read_i32()?;
        let colortable = FsAnnotColortable::from_reader(&mut input)?;

        Ok(FsAnnot {
            vertex_labels,
            colortable,
        })
    }

    pub fn num_vertices(&self) -> usize {
        self.vertex_labels.len()
    }

    /// Get the indices of all vertices assigned to the region with the given colortable id, in ascending order.
    ///
    /// Returns `None` if the id is not part of the colortable. A region without any vertices yields an empty vector.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// let annot = neurostats::read_annot("/path/to/subjects_dir/subject1/label/lh.aparc.annot").unwrap();
    /// let bankssts = annot.region_vertices(1).unwrap();
    /// ```
    pub fn region_vertices(&self, region_id: i32) -> Option<Vec<usize>> {
        let region_label = self.colortable.label_for_id(region_id)?;
        Some(
            self.vertex_labels
                .iter()
                .enumerate()
                .filter(|(_, vlabel)| **vlabel == region_label)
                .map(|(idx, _)| idx)
                .collect(),
        )
    }
}

impl fmt::Display for FsAnnot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Surface parcellation assigning {} vertices to {} brain regions.",
            self.vertex_labels.len(),
            self.colortable.num_regions()
        )
    }
}

/// Read a brain parcellation from a FreeSurfer annot file.
pub fn read_annot<P: AsRef<Path>>(path: P) -> Result<FsAnnot> {
    FsAnnot::from_file(path)
}
