//! Streaming reader for SAM text files
//!
//! Header lines (`@`) and blank lines are skipped. Only the eleven mandatory
//! fields are interpreted; optional tag fields are tolerated and ignored.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Result, SamError};
use crate::record::{AlignmentRecord, Cigar};

/// Number of mandatory fields of a SAM alignment line
const NUM_MANDATORY_FIELDS: usize = 11;

const FIELD_NAMES: [&str; NUM_MANDATORY_FIELDS] = [
    "QNAME", "FLAG", "RNAME", "POS", "MAPQ", "CIGAR", "RNEXT", "PNEXT", "TLEN", "SEQ", "QUAL",
];

pub struct SamReader<R: BufRead> {
    inner: R,
    line: Vec<u8>,
    /// 1-based number of the last line read
    line_number: usize,

    num_records: usize,
    num_mapped: usize,
}

impl SamReader<BufReader<File>> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> SamReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: Vec::new(),
            line_number: 0,
            num_records: 0,
            num_mapped: 0,
        }
    }

    /// Number of alignment records read so far
    pub fn num_records(&self) -> usize {
        self.num_records
    }

    /// Number of records read so far that take part in the pileup
    pub fn num_mapped(&self) -> usize {
        self.num_mapped
    }

    pub fn num_unmapped(&self) -> usize {
        self.num_records - self.num_mapped
    }

    /// Reads the next alignment record, `None` at end of input
    pub fn next_record(&mut self) -> Result<Option<AlignmentRecord>> {
        loop {
            self.line.clear();
            if self.inner.read_until(b'\n', &mut self.line)? == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let line = trim_line_end(&self.line);
            if line.is_empty() || line[0] == b'@' {
                continue;
            }

            let record = parse_line(line, self.line_number)?;
            self.num_records += 1;
            if record.is_mapped() {
                self.num_mapped += 1;
            }
            return Ok(Some(record));
        }
    }
}

impl<R: BufRead> Iterator for SamReader<R> {
    type Item = Result<AlignmentRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn parse_number<T: std::str::FromStr>(field: &[u8], line: usize, index: usize) -> Result<T> {
    std::str::from_utf8(field)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| {
            SamError::InvalidField {
                line,
                field: FIELD_NAMES[index],
            }
            .into()
        })
}

/// Parses one alignment line (without its line terminator)
fn parse_line(line: &[u8], line_number: usize) -> Result<AlignmentRecord> {
    let mut fields: [&[u8]; NUM_MANDATORY_FIELDS] = [&[]; NUM_MANDATORY_FIELDS];
    let mut start = 0;
    let mut num_fields = 0;
    for end in memchr::memchr_iter(b'\t', line).chain(std::iter::once(line.len())) {
        if num_fields == NUM_MANDATORY_FIELDS {
            break;
        }
        fields[num_fields] = &line[start..end];
        num_fields += 1;
        start = end + 1;
    }
    if num_fields < NUM_MANDATORY_FIELDS {
        return Err(SamError::MissingField {
            line: line_number,
            field: FIELD_NAMES[num_fields],
        }
        .into());
    }

    let flag = parse_number(fields[1], line_number, 1)?;
    let pos = parse_number(fields[3], line_number, 3)?;
    let cigar = Cigar::parse(fields[5]).ok_or_else(|| SamError::InvalidCigar {
        line: line_number,
        cigar: String::from_utf8_lossy(fields[5]).into_owned(),
    })?;

    Ok(AlignmentRecord {
        qname: fields[0].to_vec(),
        flag,
        rname: fields[2].to_vec(),
        pos,
        cigar,
        seq: fields[9].to_vec(),
        qual: fields[10].to_vec(),
    })
}
