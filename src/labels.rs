//! Registry of anatomical label descriptions.
//!
//! A [`LabelRegistry`] maps integer ROI ids to human readable region names. It is loaded once at the start of a run,
//! either from a label description table or from the colortable of an atlas parcellation, and then passed by
//! reference to everything that validates ROI ids or reports region names.

use csv::ReaderBuilder;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{NeurostatsError, Result};
use crate::fs_annot::FsAnnotColortable;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LabelRegistry {
    names: BTreeMap<i32, String>,
}

impl LabelRegistry {
    /// Read a label description table with the two columns `id` and `name`. Lines starting with '#' are ignored.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<LabelRegistry> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_path(path.as_ref())?;

        let mut names = BTreeMap::new();
        for result in rdr.records() {
            let record = result?;
            let id = record
                .get(0)
                .and_then(|v| v.parse::<i32>().ok())
                .ok_or_else(|| {
                    NeurostatsError::Config(format!(
                        "Invalid label id in label description file '{}'.",
                        path.as_ref().display()
                    ))
                })?;
            let name = record.get(1).unwrap_or("").to_string();
            names.insert(id, name);
        }
        Ok(LabelRegistry { names })
    }

    /// Build a registry from the regions of an atlas colortable.
    pub fn from_colortable(colortable: &FsAnnotColortable) -> LabelRegistry {
        let names = colortable
            .id
            .iter()
            .cloned()
            .zip(colortable.name.iter().cloned())
            .collect();
        LabelRegistry { names }
    }

    pub fn insert(&mut self, id: i32, name: &str) {
        self.names.insert(id, name.to_string());
    }

    pub fn name(&self, id: i32) -> Option<&str> {
        self.names.get(&id).map(|s| s.as_str())
    }

    /// The region name, or the id as a string for unknown ids.
    pub fn display_name(&self, id: i32) -> String {
        self.name(id)
            .map(|s| s.to_string())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn contains(&self, id: i32) -> bool {
        self.names.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Check that all ids are known, failing with [`NeurostatsError::InvalidRoiId`] naming the offending ids.
    pub fn validate(&self, ids: &[i32]) -> Result<()> {
        let unknown: Vec<String> = ids
            .iter()
            .filter(|id| !self.contains(**id))
            .map(|id| id.to_string())
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(NeurostatsError::InvalidRoiId(unknown.join(", ")))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn label_descriptions_can_be_read_from_csv() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id,name\n# comment\n120, superior frontal gyrus\n501,insula").unwrap();

        let registry = LabelRegistry::from_file(file.path()).unwrap();
        assert_eq!(2, registry.len());
        assert_eq!(Some("superior frontal gyrus"), registry.name(120));
        assert_eq!("501", LabelRegistry::default().display_name(501));
    }

    #[test]
    fn unknown_ids_fail_validation() {
        let mut ct = FsAnnotColortable::default();
        ct.push(0, String::from("unknown"), [25, 5, 25, 0]);
        ct.push(1, String::from("bankssts"), [25, 100, 40, 0]);
        let registry = LabelRegistry::from_colortable(&ct);

        assert!(registry.validate(&[0, 1]).is_ok());
        match registry.validate(&[1, 42]) {
            Err(NeurostatsError::InvalidRoiId(ids)) => assert_eq!("42", ids),
            other => panic!("unexpected result {:?}", other),
        }
    }
}
