use super::{BlockBody, Columns, FeatureRef, NamedColumns};
use crate::index::BlockKey;
use crate::{Coord, FeatureKind, GeneType, SequenceId, Strand};
use serde::{Deserialize, Serialize};
use std::fmt;

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() { None } else { Some(s) }
}

/// Quantitative value over an interval
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentColumns {
    pub starts: Vec<Coord>,
    pub ends: Vec<Coord>,
    pub values: Vec<f64>,
}

impl SegmentColumns {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            starts: Vec::with_capacity(capacity),
            ends: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, start: Coord, end: Coord, value: f64) {
        self.starts.push(start);
        self.ends.push(end);
        self.values.push(value);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentFeature {
    pub sequence: SequenceId,
    pub strand: Strand,
    pub start: Coord,
    pub end: Coord,
    pub value: f64,
}

impl fmt::Display for SegmentFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.start, self.end, self.value)
    }
}

impl Columns for SegmentColumns {
    const KIND: FeatureKind = FeatureKind::QuantitativeSegment;
    type Owned = SegmentFeature;

    fn len(&self) -> usize {
        self.starts.len()
    }

    fn start(&self, row: usize) -> Coord {
        self.starts[row]
    }

    fn end(&self, row: usize) -> Coord {
        self.ends[row]
    }

    fn owned_row(&self, key: &BlockKey, row: usize) -> SegmentFeature {
        SegmentFeature {
            sequence: key.sequence,
            strand: key.strand,
            start: self.starts[row],
            end: self.ends[row],
            value: self.values[row],
        }
    }

    fn from_body(body: BlockBody) -> Option<Self> {
        match body {
            BlockBody::Segment(columns) => Some(columns),
            _ => None,
        }
    }

    fn into_body(self) -> BlockBody {
        BlockBody::Segment(self)
    }
}

impl FeatureRef<'_, SegmentColumns> {
    pub fn value(&self) -> f64 {
        self.columns().values[self.row()]
    }
}

/// Quantitative value at a single position
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionalColumns {
    pub positions: Vec<Coord>,
    pub values: Vec<f64>,
}

impl PositionalColumns {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            positions: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, position: Coord, value: f64) {
        self.positions.push(position);
        self.values.push(value);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionalFeature {
    pub sequence: SequenceId,
    pub strand: Strand,
    pub position: Coord,
    pub value: f64,
}

impl fmt::Display for PositionalFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.position, self.position, self.value)
    }
}

impl Columns for PositionalColumns {
    const KIND: FeatureKind = FeatureKind::QuantitativePositional;
    type Owned = PositionalFeature;

    fn len(&self) -> usize {
        self.positions.len()
    }

    fn start(&self, row: usize) -> Coord {
        self.positions[row]
    }

    fn end(&self, row: usize) -> Coord {
        self.positions[row]
    }

    fn owned_row(&self, key: &BlockKey, row: usize) -> PositionalFeature {
        PositionalFeature {
            sequence: key.sequence,
            strand: key.strand,
            position: self.positions[row],
            value: self.values[row],
        }
    }

    fn from_body(body: BlockBody) -> Option<Self> {
        match body {
            BlockBody::Positional(columns) => Some(columns),
            _ => None,
        }
    }

    fn into_body(self) -> BlockBody {
        BlockBody::Positional(self)
    }
}

impl FeatureRef<'_, PositionalColumns> {
    pub fn position(&self) -> Coord {
        self.start()
    }

    pub fn value(&self) -> f64 {
        self.columns().values[self.row()]
    }
}

/// Named annotation. An empty common name means "none".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneColumns {
    pub starts: Vec<Coord>,
    pub ends: Vec<Coord>,
    pub names: Vec<String>,
    pub common_names: Vec<String>,
    pub gene_types: Vec<GeneType>,
}

impl GeneColumns {
    pub fn push(&mut self, start: Coord, end: Coord, name: &str, common_name: &str, gene_type: GeneType) {
        self.starts.push(start);
        self.ends.push(end);
        self.names.push(name.to_string());
        self.common_names.push(common_name.to_string());
        self.gene_types.push(gene_type);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneFeature {
    pub sequence: SequenceId,
    pub strand: Strand,
    pub start: Coord,
    pub end: Coord,
    pub name: String,
    pub common_name: Option<String>,
    pub gene_type: GeneType,
}

impl GeneFeature {
    pub fn label(&self) -> &str {
        self.common_name.as_deref().unwrap_or(&self.name)
    }
}

impl fmt::Display for GeneFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.start,
            self.end,
            self.name,
            self.common_name.as_deref().unwrap_or(""),
            self.gene_type
        )
    }
}

impl Columns for GeneColumns {
    const KIND: FeatureKind = FeatureKind::Gene;
    type Owned = GeneFeature;

    fn len(&self) -> usize {
        self.starts.len()
    }

    fn start(&self, row: usize) -> Coord {
        self.starts[row]
    }

    fn end(&self, row: usize) -> Coord {
        self.ends[row]
    }

    fn label(&self, row: usize) -> Option<&str> {
        non_empty(&self.common_names[row]).or(Some(self.names[row].as_str()))
    }

    fn owned_row(&self, key: &BlockKey, row: usize) -> GeneFeature {
        GeneFeature {
            sequence: key.sequence,
            strand: key.strand,
            start: self.starts[row],
            end: self.ends[row],
            name: self.names[row].clone(),
            common_name: non_empty(&self.common_names[row]).map(str::to_string),
            gene_type: self.gene_types[row],
        }
    }

    fn from_body(body: BlockBody) -> Option<Self> {
        match body {
            BlockBody::Gene(columns) => Some(columns),
            _ => None,
        }
    }

    fn into_body(self) -> BlockBody {
        BlockBody::Gene(self)
    }
}

impl NamedColumns for GeneColumns {}

impl<'a> FeatureRef<'a, GeneColumns> {
    pub fn name(&self) -> &'a str {
        let columns: &'a GeneColumns = self.columns();
        &columns.names[self.row()]
    }

    pub fn common_name(&self) -> Option<&'a str> {
        let columns: &'a GeneColumns = self.columns();
        non_empty(&columns.common_names[self.row()])
    }

    pub fn gene_type(&self) -> GeneType {
        self.columns().gene_types[self.row()]
    }
}

/// Peptide hit with a score
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeptideColumns {
    pub starts: Vec<Coord>,
    pub ends: Vec<Coord>,
    pub names: Vec<String>,
    pub common_names: Vec<String>,
    pub scores: Vec<f64>,
}

impl PeptideColumns {
    pub fn push(&mut self, start: Coord, end: Coord, name: &str, common_name: &str, score: f64) {
        self.starts.push(start);
        self.ends.push(end);
        self.names.push(name.to_string());
        self.common_names.push(common_name.to_string());
        self.scores.push(score);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeptideFeature {
    pub sequence: SequenceId,
    pub strand: Strand,
    pub start: Coord,
    pub end: Coord,
    pub name: String,
    pub common_name: Option<String>,
    pub score: f64,
}

impl PeptideFeature {
    pub fn label(&self) -> &str {
        self.common_name.as_deref().unwrap_or(&self.name)
    }
}

impl fmt::Display for PeptideFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.start,
            self.end,
            self.name,
            self.common_name.as_deref().unwrap_or(""),
            self.score
        )
    }
}

impl Columns for PeptideColumns {
    const KIND: FeatureKind = FeatureKind::Peptide;
    type Owned = PeptideFeature;

    fn len(&self) -> usize {
        self.starts.len()
    }

    fn start(&self, row: usize) -> Coord {
        self.starts[row]
    }

    fn end(&self, row: usize) -> Coord {
        self.ends[row]
    }

    fn label(&self, row: usize) -> Option<&str> {
        non_empty(&self.common_names[row]).or(Some(self.names[row].as_str()))
    }

    fn owned_row(&self, key: &BlockKey, row: usize) -> PeptideFeature {
        PeptideFeature {
            sequence: key.sequence,
            strand: key.strand,
            start: self.starts[row],
            end: self.ends[row],
            name: self.names[row].clone(),
            common_name: non_empty(&self.common_names[row]).map(str::to_string),
            score: self.scores[row],
        }
    }

    fn from_body(body: BlockBody) -> Option<Self> {
        match body {
            BlockBody::Peptide(columns) => Some(columns),
            _ => None,
        }
    }

    fn into_body(self) -> BlockBody {
        BlockBody::Peptide(self)
    }
}

impl NamedColumns for PeptideColumns {}

impl<'a> FeatureRef<'a, PeptideColumns> {
    pub fn name(&self) -> &'a str {
        let columns: &'a PeptideColumns = self.columns();
        &columns.names[self.row()]
    }

    pub fn common_name(&self) -> Option<&'a str> {
        let columns: &'a PeptideColumns = self.columns();
        non_empty(&columns.common_names[self.row()])
    }

    pub fn score(&self) -> f64 {
        self.columns().scores[self.row()]
    }
}

/// A fixed-width vector of values per interval, stored row-major
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatrixColumns {
    pub starts: Vec<Coord>,
    pub ends: Vec<Coord>,
    pub width: usize,
    pub values: Vec<f64>,
}

impl MatrixColumns {
    pub fn with_width(width: usize) -> Self {
        Self {
            width,
            ..Self::default()
        }
    }

    /// Append one row; `values` must hold exactly `width` entries
    pub fn push(&mut self, start: Coord, end: Coord, values: &[f64]) {
        debug_assert_eq!(values.len(), self.width);
        self.starts.push(start);
        self.ends.push(end);
        self.values.extend_from_slice(values);
    }

    pub fn row_values(&self, row: usize) -> &[f64] {
        &self.values[row * self.width..(row + 1) * self.width]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatrixFeature {
    pub sequence: SequenceId,
    pub strand: Strand,
    pub start: Coord,
    pub end: Coord,
    pub values: Vec<f64>,
}

impl fmt::Display for MatrixFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.start, self.end)?;
        for value in &self.values {
            write!(f, "\t{}", value)?;
        }
        Ok(())
    }
}

impl Columns for MatrixColumns {
    const KIND: FeatureKind = FeatureKind::QuantitativeSegmentMatrix;
    type Owned = MatrixFeature;

    fn len(&self) -> usize {
        self.starts.len()
    }

    fn start(&self, row: usize) -> Coord {
        self.starts[row]
    }

    fn end(&self, row: usize) -> Coord {
        self.ends[row]
    }

    fn owned_row(&self, key: &BlockKey, row: usize) -> MatrixFeature {
        MatrixFeature {
            sequence: key.sequence,
            strand: key.strand,
            start: self.starts[row],
            end: self.ends[row],
            values: self.row_values(row).to_vec(),
        }
    }

    fn from_body(body: BlockBody) -> Option<Self> {
        match body {
            BlockBody::Matrix(columns) => Some(columns),
            _ => None,
        }
    }

    fn into_body(self) -> BlockBody {
        BlockBody::Matrix(self)
    }
}

impl<'a> FeatureRef<'a, MatrixColumns> {
    pub fn values(&self) -> &'a [f64] {
        let columns: &'a MatrixColumns = self.columns();
        columns.row_values(self.row())
    }

    pub fn width(&self) -> usize {
        self.columns().width
    }
}
