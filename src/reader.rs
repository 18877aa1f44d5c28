//! Tab-delimited feature files.
//!
//! The first non-comment line is a header naming the columns. Recognized
//! names (case-insensitive) feed the matching [`FeatureFields`]; every other
//! column is read as a matrix value column, in file order.

use crate::error::{RecordProblem, Result, TrackError};
use crate::import::{FeatureFields, FeatureProcessor, FeatureSource};
use memmap2::Mmap;
use std::borrow::Cow;
use std::fs::File;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Sequence,
    Strand,
    Start,
    End,
    Position,
    Value,
    Name,
    CommonName,
    GeneType,
    Matrix,
}

impl Column {
    fn from_header(name: &str) -> Column {
        match name.trim().to_ascii_lowercase().as_str() {
            "sequence" | "seqid" | "seq" | "seqname" | "sequence_name" | "chr" | "chrom"
            | "chromosome" => Column::Sequence,
            "strand" => Column::Strand,
            "start" => Column::Start,
            "end" | "stop" => Column::End,
            "position" | "pos" => Column::Position,
            "value" | "score" => Column::Value,
            "name" | "id" | "canonical_name" => Column::Name,
            "common_name" | "commonname" | "common" => Column::CommonName,
            "gene_type" | "genetype" | "type" => Column::GeneType,
            _ => Column::Matrix,
        }
    }
}

/// Memory-mapped tab-delimited feature file
pub struct TabularFeatureSource {
    path: PathBuf,
    mmap: Option<Mmap>,
}

impl TabularFeatureSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        // mapping an empty file fails on some platforms
        let mmap = if file.metadata()?.len() == 0 {
            None
        } else {
            Some(unsafe { Mmap::map(&file)? })
        };
        Ok(Self { path, mmap })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn data(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    /// Names of the columns that will be read as matrix values
    pub fn matrix_columns(&self) -> Result<Vec<String>> {
        let header = match self.lines().next() {
            Some((_, line)) => header_text(line)?,
            None => return Ok(Vec::new()),
        };
        Ok(header
            .split('\t')
            .filter(|name| Column::from_header(name) == Column::Matrix)
            .map(|name| name.trim().to_string())
            .collect())
    }

    /// Non-empty, non-comment lines with their 1-based line numbers
    fn lines(&self) -> impl Iterator<Item = (u64, &[u8])> + '_ {
        let data = self.data();
        let mut start = 0;
        let mut line_no = 0u64;
        let mut ends = memchr::memchr_iter(b'\n', data).chain(std::iter::once(data.len()));
        std::iter::from_fn(move || {
            loop {
                let end = ends.next()?;
                if end < start {
                    return None;
                }
                let mut line = &data[start..end];
                start = end + 1;
                line_no += 1;
                if let Some(stripped) = line.strip_suffix(b"\r") {
                    line = stripped;
                }
                if line.is_empty() || line.starts_with(b"#") {
                    continue;
                }
                return Some((line_no, line));
            }
        })
    }
}

fn header_text(line: &[u8]) -> Result<&str> {
    std::str::from_utf8(line).map_err(|_| {
        TrackError::MalformedRecord(RecordProblem::new(
            0,
            "header",
            &String::from_utf8_lossy(line),
            "not valid UTF-8",
        ))
    })
}

impl FeatureSource for TabularFeatureSource {
    /// Unreadable lines and cells do not stop the scan. They are handed on
    /// with the bad parts replaced (lossy text, NaN cells) and reported
    /// together as `MalformedRecords` once every line has been read.
    fn process_features(&mut self, processor: &mut dyn FeatureProcessor) -> Result<()> {
        let mut lines = self.lines();
        let columns: Vec<Column> = match lines.next() {
            Some((_, header)) => header_text(header)?
                .split('\t')
                .map(Column::from_header)
                .collect(),
            None => return Ok(()),
        };
        let matrix_columns = columns.iter().filter(|c| **c == Column::Matrix).count();

        let mut problems = Vec::new();
        let mut values: Vec<f64> = Vec::with_capacity(matrix_columns);
        for (record, (_, line)) in (0u64..).zip(lines) {
            let text = String::from_utf8_lossy(line);
            if matches!(text, Cow::Owned(_)) {
                problems.push(RecordProblem::new(record, "line", &text, "not valid UTF-8"));
            }
            values.clear();

            let mut fields = FeatureFields::default();
            for (column, cell) in columns.iter().zip(text.split('\t')) {
                match column {
                    Column::Sequence => fields.sequence_name = cell,
                    Column::Strand => fields.strand = cell,
                    Column::Start => fields.start = cell,
                    Column::End => fields.end = cell,
                    Column::Position => fields.position = cell,
                    Column::Value => fields.value = cell,
                    Column::Name => fields.name = cell,
                    Column::CommonName => fields.common_name = cell,
                    Column::GeneType => fields.gene_type = cell,
                    Column::Matrix => values.push(parse_matrix_cell(cell).unwrap_or_else(|| {
                        problems.push(RecordProblem::new(record, "values", cell, "not a number"));
                        f64::NAN
                    })),
                }
            }
            // short lines still carry every matrix column
            values.resize(matrix_columns, f64::NAN);
            fields.values = &values;
            processor.process(&fields)?;
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(TrackError::MalformedRecords(problems))
        }
    }

    fn size_hint(&self) -> Option<u64> {
        let newlines = memchr::memchr_iter(b'\n', self.data()).count() as u64;
        Some(newlines.saturating_sub(1))
    }
}

/// Empty and `na` matrix cells are missing measurements
fn parse_matrix_cell(cell: &str) -> Option<f64> {
    let trimmed = cell.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("na") {
        return Some(f64::NAN);
    }
    trimmed.parse::<f64>().ok()
}
