//! Optional reference sequences
//!
//! References are not needed to encode or decode quality values. When provided,
//! they are used to sanity check the alignments being compressed: records naming
//! an unknown reference, or extending past its end, are reported with a warning.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use seq_io::fasta::{Reader, Record};
use tracing::info;

use crate::error::{FastaError, Result};

/// Name and length of one reference sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub name: Vec<u8>,
    pub len: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceSet {
    references: Vec<Reference>,
    by_name: HashMap<Vec<u8>, usize>,
}
impl ReferenceSet {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut set = Self::default();
        set.extend_from_path(path)?;
        Ok(set)
    }

    /// Adds every sequence of a FASTA file
    pub fn extend_from_path<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let added = self.extend_from_reader(File::open(path)?)?;
        info!("Found {added} new reference(s) in {}", path.display());
        Ok(())
    }

    /// Adds every sequence read from `reader`, returning how many new names were added
    ///
    /// The name of a sequence is the first token of its header. A sequence named like
    /// an existing one replaces it.
    pub fn extend_from_reader<R: Read>(&mut self, reader: R) -> Result<usize> {
        let mut reader = Reader::new(reader);
        let mut added = 0;
        let mut num_records = 0;
        while let Some(result) = reader.next() {
            let record = result.map_err(FastaError::from)?;
            num_records += 1;

            let name = record.id_bytes();
            if name.is_empty() {
                return Err(FastaError::EmptyName(num_records).into());
            }
            let len = record.seq_lines().map(<[u8]>::len).sum();
            info!("  {} ({len} bp)", String::from_utf8_lossy(name));
            if self.insert(Reference {
                name: name.to_vec(),
                len,
            }) {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Returns whether the name was not known before
    fn insert(&mut self, reference: Reference) -> bool {
        match self.by_name.get(&reference.name) {
            Some(&idx) => {
                self.references[idx] = reference;
                false
            }
            None => {
                self.by_name
                    .insert(reference.name.clone(), self.references.len());
                self.references.push(reference);
                true
            }
        }
    }

    pub fn get(&self, name: &[u8]) -> Option<&Reference> {
        self.by_name.get(name).map(|&idx| &self.references[idx])
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reference> {
        self.references.iter()
    }
}
