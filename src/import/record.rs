//! Raw incoming records and their staged form.

use super::{FeatureFields, FeatureProcessor, FeatureSource};
use crate::error::{RecordProblem, Result};
use crate::{Coord, FeatureKind, GeneType, SequenceId, Strand};
use std::collections::HashMap;

/// An owned raw record, for feeding an import from memory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub sequence_name: String,
    pub strand: String,
    pub start: String,
    pub end: String,
    pub position: String,
    pub value: String,
    pub name: String,
    pub common_name: String,
    pub gene_type: String,
    pub values: Vec<f64>,
}

impl RawRecord {
    pub fn interval(sequence_name: &str, strand: &str, start: Coord, end: Coord) -> Self {
        Self {
            sequence_name: sequence_name.to_string(),
            strand: strand.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            ..Default::default()
        }
    }

    pub fn point(sequence_name: &str, strand: &str, position: Coord) -> Self {
        Self {
            sequence_name: sequence_name.to_string(),
            strand: strand.to_string(),
            position: position.to_string(),
            ..Default::default()
        }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = value.to_string();
        self
    }

    pub fn with_name(mut self, name: &str, common_name: &str) -> Self {
        self.name = name.to_string();
        self.common_name = common_name.to_string();
        self
    }

    pub fn with_gene_type(mut self, gene_type: &str) -> Self {
        self.gene_type = gene_type.to_string();
        self
    }

    pub fn with_values(mut self, values: Vec<f64>) -> Self {
        self.values = values;
        self
    }

    pub fn fields(&self) -> FeatureFields<'_> {
        FeatureFields {
            sequence_name: &self.sequence_name,
            strand: &self.strand,
            start: &self.start,
            end: &self.end,
            position: &self.position,
            value: &self.value,
            name: &self.name,
            common_name: &self.common_name,
            gene_type: &self.gene_type,
            values: &self.values,
        }
    }
}

impl FeatureSource for Vec<RawRecord> {
    fn process_features(&mut self, processor: &mut dyn FeatureProcessor) -> Result<()> {
        for record in self.iter() {
            processor.process(&record.fields())?;
        }
        Ok(())
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.len() as u64)
    }
}

/// Kind-specific part of a record
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Payload {
    Value(f64),
    Gene {
        name: String,
        common_name: String,
        gene_type: GeneType,
    },
    Peptide {
        name: String,
        common_name: String,
        score: f64,
    },
    Values(Box<[f64]>),
}

/// A parsed record whose sequence name and strand are still raw, held as
/// indices into the pipeline's interned spellings
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StagedRecord {
    pub record: u64,
    pub sequence: u32,
    pub strand: u32,
    pub start: Coord,
    pub end: Coord,
    pub payload: Payload,
}

/// A record ready to be sorted and partitioned
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Row {
    pub sequence: SequenceId,
    pub strand: Strand,
    pub start: Coord,
    pub end: Coord,
    pub payload: Payload,
}

impl Row {
    pub fn sort_key(&self) -> (SequenceId, Strand, Coord, Coord) {
        (self.sequence, self.strand, self.start, self.end)
    }
}

/// Distinct spellings seen during staging
#[derive(Debug, Default)]
pub(crate) struct Interner {
    ids: HashMap<String, u32>,
    names: Vec<String>,
}

impl Interner {
    pub fn intern(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.names.len() as u32;
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

/// Parses one record's coordinates and payload for a track of `kind`.
///
/// `columns` is the matrix width; 0 means "take it from this record".
/// Every problem with the record is returned, not just the first.
pub(crate) fn parse_record(
    record: u64,
    fields: &FeatureFields<'_>,
    kind: FeatureKind,
    columns: &mut usize,
) -> std::result::Result<(Coord, Coord, Payload), Vec<RecordProblem>> {
    let mut problems = Vec::new();

    if fields.sequence_name.trim().is_empty() {
        problems.push(RecordProblem::new(record, "sequence", "", "missing sequence name"));
    }

    let (start, end) = if kind == FeatureKind::QuantitativePositional {
        let position = first_present(fields.position, fields.start);
        let position = parse_coord(record, "position", position, &mut problems);
        (position, position)
    } else {
        let start = parse_coord(
            record,
            "start",
            first_present(fields.start, fields.position),
            &mut problems,
        );
        let end = parse_coord(
            record,
            "end",
            first_present(fields.end, fields.position),
            &mut problems,
        );
        (start, end)
    };
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            problems.push(RecordProblem::new(
                record,
                "end",
                fields.end,
                format!("end precedes start {s}"),
            ));
        }
    }

    let payload = match kind {
        FeatureKind::QuantitativeSegment | FeatureKind::QuantitativePositional => {
            parse_value(record, "value", fields.value, &mut problems).map(Payload::Value)
        }
        FeatureKind::Gene => {
            required_name(record, fields, &mut problems).map(|name| Payload::Gene {
                name,
                common_name: fields.common_name.trim().to_string(),
                gene_type: GeneType::from_name(fields.gene_type),
            })
        }
        FeatureKind::Peptide => {
            let score = if fields.value.trim().is_empty() {
                Some(0.0)
            } else {
                parse_value(record, "value", fields.value, &mut problems)
            };
            let name = required_name(record, fields, &mut problems);
            match (name, score) {
                (Some(name), Some(score)) => Some(Payload::Peptide {
                    name,
                    common_name: fields.common_name.trim().to_string(),
                    score,
                }),
                _ => None,
            }
        }
        FeatureKind::QuantitativeSegmentMatrix => {
            if *columns == 0 {
                *columns = fields.values.len();
            }
            if fields.values.is_empty() || fields.values.len() != *columns {
                problems.push(RecordProblem::new(
                    record,
                    "values",
                    &fields.values.len().to_string(),
                    format!("expected {} matrix values", (*columns).max(1)),
                ));
                None
            } else {
                Some(Payload::Values(fields.values.into()))
            }
        }
    };

    match (start, end, payload) {
        (Some(start), Some(end), Some(payload)) if problems.is_empty() => Ok((start, end, payload)),
        _ => Err(problems),
    }
}

fn first_present<'a>(preferred: &'a str, fallback: &'a str) -> &'a str {
    if preferred.trim().is_empty() {
        fallback
    } else {
        preferred
    }
}

fn parse_coord(
    record: u64,
    field: &'static str,
    text: &str,
    problems: &mut Vec<RecordProblem>,
) -> Option<Coord> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        problems.push(RecordProblem::new(record, field, text, "missing coordinate"));
        return None;
    }
    match trimmed.parse::<Coord>() {
        Ok(value) => Some(value),
        Err(_) => {
            problems.push(RecordProblem::new(record, field, text, "not an integer"));
            None
        }
    }
}

fn parse_value(
    record: u64,
    field: &'static str,
    text: &str,
    problems: &mut Vec<RecordProblem>,
) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        problems.push(RecordProblem::new(record, field, text, "missing value"));
        return None;
    }
    match trimmed.parse::<f64>() {
        Ok(value) => Some(value),
        Err(_) => {
            problems.push(RecordProblem::new(record, field, text, "not a number"));
            None
        }
    }
}

fn required_name(
    record: u64,
    fields: &FeatureFields<'_>,
    problems: &mut Vec<RecordProblem>,
) -> Option<String> {
    let name = fields.name.trim();
    if name.is_empty() {
        problems.push(RecordProblem::new(record, "name", fields.name, "missing feature name"));
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(record: &RawRecord, kind: FeatureKind) -> std::result::Result<(Coord, Coord, Payload), Vec<RecordProblem>> {
        let mut columns = 0;
        parse_record(7, &record.fields(), kind, &mut columns)
    }

    #[test]
    fn test_positional_falls_back_to_start() {
        let mut record = RawRecord::interval("chr", "+", 40, 40).with_value(1.5);
        let (start, end, payload) = parse(&record, FeatureKind::QuantitativePositional).unwrap();
        assert_eq!((start, end), (40, 40));
        assert_eq!(payload, Payload::Value(1.5));

        record.position = "12".into();
        let (start, end, _) = parse(&record, FeatureKind::QuantitativePositional).unwrap();
        assert_eq!((start, end), (12, 12));
    }

    #[test]
    fn test_interval_falls_back_to_position() {
        let record = RawRecord::point("chr", "-", 99).with_name("VNG1", "");
        let (start, end, payload) = parse(&record, FeatureKind::Gene).unwrap();
        assert_eq!((start, end), (99, 99));
        assert!(matches!(payload, Payload::Gene { gene_type: GeneType::Gene, .. }));
    }

    #[test]
    fn test_collects_every_problem() {
        let mut record = RawRecord::interval("", "+", 10, 5);
        record.value = "high".into();
        let problems = parse(&record, FeatureKind::QuantitativeSegment).unwrap_err();
        let fields: Vec<&str> = problems.iter().map(|p| p.field).collect();
        assert_eq!(fields, vec!["sequence", "end", "value"]);
        assert!(problems.iter().all(|p| p.record == 7));

        let record = RawRecord::interval("chr", "+", 1, 2);
        let problems = parse(&record, FeatureKind::Peptide).unwrap_err();
        assert_eq!(problems[0].field, "name");

        let mut record = RawRecord::interval("chr", "+", 1, 2);
        record.start = "1.5".into();
        let problems = parse(&record, FeatureKind::QuantitativeSegment).unwrap_err();
        assert_eq!(problems[0].reason, "not an integer");
    }

    #[test]
    fn test_matrix_width() {
        let mut columns = 0;
        let first = RawRecord::interval("chr", "+", 1, 2).with_values(vec![1.0, 2.0, 3.0]);
        let second = RawRecord::interval("chr", "+", 3, 4).with_values(vec![1.0]);
        assert!(parse_record(0, &first.fields(), FeatureKind::QuantitativeSegmentMatrix, &mut columns).is_ok());
        assert_eq!(columns, 3);
        let problems =
            parse_record(1, &second.fields(), FeatureKind::QuantitativeSegmentMatrix, &mut columns)
                .unwrap_err();
        assert_eq!(problems[0].field, "values");
    }

    #[test]
    fn test_interner() {
        let mut names = Interner::default();
        assert_eq!(names.intern("chr"), 0);
        assert_eq!(names.intern("pNRC100"), 1);
        assert_eq!(names.intern("chr"), 0);
        assert_eq!(names.len(), 2);
        assert_eq!(names.names()[1], "pNRC100");
    }
}
