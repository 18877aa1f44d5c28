use super::record::{Payload, Row};
use crate::block::{
    BlockBody, GeneColumns, MatrixColumns, PeptideColumns, PositionalColumns, SegmentColumns,
};
use crate::error::{Result, TrackError};
use crate::{Coord, FeatureKind};

/// Number of blocks `rows` (already sorted) will be cut into, counting each
/// (sequence, strand) bucket separately
pub(crate) fn block_count(rows: &[Row], max_block_features: usize) -> usize {
    buckets(rows)
        .map(|bucket| bucket.len().div_ceil(max_block_features.max(1)))
        .sum()
}

/// Runs of rows sharing one (sequence, strand)
pub(crate) fn buckets(rows: &[Row]) -> impl Iterator<Item = &[Row]> {
    rows.chunk_by(|a, b| a.sequence == b.sequence && a.strand == b.strand)
}

/// Columnar body for one chunk of rows. Every row must carry the payload
/// staged for `kind`.
pub(crate) fn build_body(kind: FeatureKind, width: usize, rows: &[Row]) -> Result<BlockBody> {
    let body = match kind {
        FeatureKind::QuantitativeSegment => {
            let mut columns = SegmentColumns::with_capacity(rows.len());
            for row in rows {
                match &row.payload {
                    Payload::Value(value) => columns.push(row.start, row.end, *value),
                    _ => return Err(payload_mismatch(kind, row)),
                }
            }
            BlockBody::Segment(columns)
        }
        FeatureKind::QuantitativePositional => {
            let mut columns = PositionalColumns::with_capacity(rows.len());
            for row in rows {
                match &row.payload {
                    Payload::Value(value) => columns.push(row.start, *value),
                    _ => return Err(payload_mismatch(kind, row)),
                }
            }
            BlockBody::Positional(columns)
        }
        FeatureKind::Gene => {
            let mut columns = GeneColumns::default();
            for row in rows {
                match &row.payload {
                    Payload::Gene {
                        name,
                        common_name,
                        gene_type,
                    } => columns.push(row.start, row.end, name, common_name, *gene_type),
                    _ => return Err(payload_mismatch(kind, row)),
                }
            }
            BlockBody::Gene(columns)
        }
        FeatureKind::Peptide => {
            let mut columns = PeptideColumns::default();
            for row in rows {
                match &row.payload {
                    Payload::Peptide {
                        name,
                        common_name,
                        score,
                    } => columns.push(row.start, row.end, name, common_name, *score),
                    _ => return Err(payload_mismatch(kind, row)),
                }
            }
            BlockBody::Peptide(columns)
        }
        FeatureKind::QuantitativeSegmentMatrix => {
            let mut columns = MatrixColumns::with_width(width);
            for row in rows {
                match &row.payload {
                    Payload::Values(values) => columns.push(row.start, row.end, values),
                    _ => return Err(payload_mismatch(kind, row)),
                }
            }
            BlockBody::Matrix(columns)
        }
    };
    Ok(body)
}

fn payload_mismatch(kind: FeatureKind, row: &Row) -> TrackError {
    TrackError::storage(format!(
        "row {}..{} on sequence {} does not hold a {} feature",
        row.start, row.end, row.sequence, kind
    ))
}

/// `(min start, max end)` of a chunk. Start is the first row's since rows are sorted.
pub(crate) fn chunk_bounds(rows: &[Row]) -> (Coord, Coord) {
    let min_start = rows.first().map(|r| r.start).unwrap_or(0);
    let max_end = rows.iter().map(|r| r.end).max().unwrap_or(min_start);
    (min_start, max_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SequenceId, Strand};

    fn row(seq: u32, strand: Strand, start: Coord, end: Coord) -> Row {
        Row {
            sequence: SequenceId(seq),
            strand,
            start,
            end,
            payload: Payload::Value(start as f64),
        }
    }

    #[test]
    fn test_buckets_and_block_count() {
        let rows = vec![
            row(1, Strand::Forward, 1, 5),
            row(1, Strand::Forward, 2, 3),
            row(1, Strand::Forward, 4, 9),
            row(1, Strand::Reverse, 1, 2),
            row(2, Strand::None, 7, 8),
        ];
        let sizes: Vec<usize> = buckets(&rows).map(|b| b.len()).collect();
        assert_eq!(sizes, vec![3, 1, 1]);
        assert_eq!(block_count(&rows, 2), 4);
        assert_eq!(block_count(&rows, 100), 3);
        assert_eq!(block_count(&[], 100), 0);
        assert_eq!(chunk_bounds(&rows[..3]), (1, 9));
    }

    #[test]
    fn test_build_body() {
        let rows = vec![row(1, Strand::Forward, 1, 5), row(1, Strand::Forward, 2, 3)];
        let body = build_body(FeatureKind::QuantitativeSegment, 0, &rows).unwrap();
        assert_eq!(body.len(), 2);
        assert_eq!(body.bounds(), Some((1, 5)));
        assert_eq!(body.value_range(), Some((1.0, 2.0)));

        let body = build_body(FeatureKind::QuantitativePositional, 0, &rows[..1]).unwrap();
        assert_eq!(body.kind(), FeatureKind::QuantitativePositional);
        assert_eq!(body.bounds(), Some((1, 1)));
    }

    #[test]
    fn test_build_body_rejects_foreign_payload() {
        let rows = vec![row(1, Strand::Forward, 1, 5), row(1, Strand::Forward, 2, 3)];
        for kind in [
            FeatureKind::Gene,
            FeatureKind::Peptide,
            FeatureKind::QuantitativeSegmentMatrix,
        ] {
            let err = build_body(kind, 2, &rows).unwrap_err();
            assert!(err.to_string().contains(&kind.to_string()), "{err}");
        }

        let mut mixed = rows.clone();
        mixed[1].payload = Payload::Values(vec![1.0, 2.0].into_boxed_slice());
        assert!(build_body(FeatureKind::QuantitativeSegment, 0, &mixed).is_err());
    }
}
