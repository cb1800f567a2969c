//! Functions for managing FreeSurfer per-vertex data in binary 'curv' files.
//!
//! These files store 1 scalar value (typically a morphological descriptor, like cortical thickness at that point)
//! for each vertex of the respective brain surface mesh. They are used for the per-subject measurement maps,
//! for the atlas geometry, for threshold masks and for the statistical result maps.

use byteordered::ByteOrdered;
use flate2::write::GzEncoder;
use flate2::Compression;

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use crate::error::{NeurostatsError, Result};
use crate::util::{is_gz_file, open_maybe_gz};

pub const CURV_MAGIC: [u8; 3] = [255; 3];

#[derive(Debug, Clone, PartialEq)]
pub struct CurvHeader {
    pub curv_magic: [u8; 3],
    pub num_vertices: i32,
    pub num_faces: i32,
    pub num_values_per_vertex: i32,
}

impl Default for CurvHeader {
    fn default() -> CurvHeader {
        CurvHeader {
            curv_magic: CURV_MAGIC,
            num_vertices: 0,
            num_faces: 0,
            num_values_per_vertex: 1,
        }
    }
}

impl CurvHeader {
    /// Read a Curv header from the given byte stream.
    /// It is assumed that the input is currently at the start of the
    /// Curv header.
    pub fn from_reader<S>(input: &mut S) -> Result<CurvHeader>
    where
        S: Read,
    {
        let mut hdr = CurvHeader::default();
        let mut input = ByteOrdered::be(input);

        for v in &mut hdr.curv_magic {
            *v = input.read_u8()?;
        }
        if hdr.curv_magic != CURV_MAGIC {
            return Err(NeurostatsError::InvalidCurvFormat);
        }

        hdr.num_vertices = input.read_i32()?;
        hdr.num_faces = input.read_i32()?;
        hdr.num_values_per_vertex = input.read_i32()?;

        if hdr.num_vertices < 0 || hdr.num_values_per_vertex != 1 {
            return Err(NeurostatsError::InvalidCurvFormat);
        }
        Ok(hdr)
    }
}

/// Per-vertex data from a FreeSurfer curv file.
#[derive(Debug, Clone, PartialEq)]
pub struct FsCurv {
    pub header: CurvHeader,
    pub data: Vec<f32>,
}

impl FsCurv {
    /// Create a curv struct for the given per-vertex values, with an empty face count.
    pub fn from_values(data: Vec<f32>) -> FsCurv {
        let header = CurvHeader {
            num_vertices: data.len() as i32,
            ..CurvHeader::default()
        };
        FsCurv { header, data }
    }

    /// Read a curv file.
    /// If the file's name ends with ".gz", the file is assumed to need GZip decoding. This is not typically the case
    /// for FreeSurfer Curv files, but very handy (and it helps us to reduce the size of our test data).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<FsCurv> {
        let mut input = open_maybe_gz(path)?;
        FsCurv::from_reader(&mut input)
    }

    pub fn from_reader<S>(input: &mut S) -> Result<FsCurv>
    where
        S: Read,
    {
        let header = CurvHeader::from_reader(input)?;
        let mut input = ByteOrdered::be(input);

        let mut data: Vec<f32> = Vec::with_capacity(header.num_vertices as usize);
        for _ in 0..header.num_vertices {
            data.push(input.read_f32()?);
        }
        Ok(FsCurv { header, data })
    }

    /// Write the curv data in FreeSurfer binary format. Gzip compression is used if the file name ends with ".gz".
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let gz = is_gz_file(&path);
        let mut file = BufWriter::new(File::create(path)?);
        if gz {
            let mut enc = GzEncoder::new(file, Compression::default());
            self.to_writer(&mut enc)?;
            enc.finish()?;
        } else {
            self.to_writer(&mut file)?;
            file.flush()?;
        }
        Ok(())
    }

    pub fn to_writer<W>(&self, output: &mut W) -> Result<()>
    where
        W: Write,
    {
        let mut output = ByteOrdered::be(output);
        for v in self.header.curv_magic.iter() {
            output.write_u8(*v)?;
        }
        output.write_i32(self.data.len() as i32)?;
        output.write_i32(self.header.num_faces)?;
        output.write_i32(1)?;
        for v in self.data.iter() {
            output.write_f32(*v)?;
        }
        Ok(())
    }
}

/// Read per-vertex data from a FreeSurfer curv file.
///
/// # Examples
///
/// ```no_run
/// let curv = neurostats::read_curv("/path/to/subjects_dir/subject1/surf/lh.thickness").unwrap();
/// println!("Read {} thickness values.", curv.data.len());
/// ```
pub fn read_curv<P: AsRef<Path>>(path: P) -> Result<FsCurv> {
    FsCurv::from_file(path)
}

/// Write per-vertex values to a FreeSurfer curv file.
pub fn write_curv<P: AsRef<Path>>(path: P, data: &[f32]) -> Result<()> {
    FsCurv::from_values(data.to_vec()).to_file(path)
}
