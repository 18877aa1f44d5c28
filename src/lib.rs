use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod attributes;
pub mod block;
pub mod cache;
pub mod config;
pub mod error;
pub mod import;
pub mod index;
pub mod reader;
pub mod sequence;
pub mod store;
pub mod track;

// Re-export main types for public API
pub use attributes::Attributes;
pub use block::{
    Block, BlockBody, BlockCursor, Columns, FeatureRef, GeneColumns, GeneFeature, MatrixColumns,
    MatrixFeature, PeptideColumns, PeptideFeature, PositionalColumns, PositionalFeature,
    SegmentColumns, SegmentFeature,
};
pub use config::{ImportConfig, StoreConfig};
pub use error::{RecordProblem, Result, TrackError};
pub use import::{
    CancelToken, FeatureFields, FeatureProcessor, FeatureSource, ImportPipeline, ImportState,
    ProgressEvent, ProgressSink,
};
pub use index::{BlockIndex, BlockKey};
pub use reader::TabularFeatureSource;
pub use sequence::{Sequence, SequenceNameResolver, Topology};
pub use store::{AttributeOwner, BlockStore, Dataset, FileStore, MemoryStore, TrackMeta};
pub use track::{
    AnyTrack, FeatureCursor, FeatureFilter, GeneTrack, MatrixTrack, PeptideTrack,
    PositionalTrack, SegmentTrack, Track,
};

/// Coordinate type for sequence positions. Feature intervals are closed,
/// query windows are half-open.
pub type Coord = i64;

/// Identifier of a registered sequence (chromosome, plasmid, replicon)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceId(pub u32);

/// Identifier of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u64);

/// Identifier of a dataset (a genome plus its tracks)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DatasetId(pub u64);

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strand of a feature.
///
/// Declaration order is the sort order used when building blocks:
/// forward, then reverse, then none. `Any` only appears in queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Strand {
    Forward,
    Reverse,
    None,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized strand: {0:?}")]
pub struct ParseStrandError(pub String);

impl Strand {
    /// Strands a feature can actually be stored on, in sort order
    pub const STORED: [Strand; 3] = [Strand::Forward, Strand::Reverse, Strand::None];

    /// Whether a query on `self` should include features on `other`
    pub fn encompasses(self, other: Strand) -> bool {
        self == Strand::Any || self == other
    }

    pub fn opposite(self) -> Strand {
        match self {
            Strand::Forward => Strand::Reverse,
            Strand::Reverse => Strand::Forward,
            other => other,
        }
    }

    pub fn is_stored(self) -> bool {
        self != Strand::Any
    }

    pub fn abbreviation(self) -> &'static str {
        match self {
            Strand::Forward => "+",
            Strand::Reverse => "-",
            Strand::None => ".",
            Strand::Any => "*",
        }
    }
}

impl FromStr for Strand {
    type Err = ParseStrandError;

    /// Accepts the spellings found in common annotation formats:
    /// `+`/`for`/`forward`/`f`/`1`, `-`/`rev`/`reverse`/`r`/`-1`,
    /// empty/`.`/`none`/`0`, and `*`/`any` for queries.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        let strand = match trimmed.to_ascii_lowercase().as_str() {
            "+" | "for" | "forward" | "f" | "1" | "+1" => Strand::Forward,
            "-" | "rev" | "reverse" | "r" | "-1" => Strand::Reverse,
            "" | "." | "none" | "0" => Strand::None,
            "*" | "any" => Strand::Any,
            _ => return Err(ParseStrandError(s.to_string())),
        };
        Ok(strand)
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbreviation())
    }
}

/// The fixed kind of every feature in a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureKind {
    QuantitativeSegment,
    QuantitativePositional,
    Gene,
    Peptide,
    QuantitativeSegmentMatrix,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown feature kind: {0:?}")]
pub struct ParseKindError(pub String);

impl FeatureKind {
    pub const ALL: [FeatureKind; 5] = [
        FeatureKind::QuantitativeSegment,
        FeatureKind::QuantitativePositional,
        FeatureKind::Gene,
        FeatureKind::Peptide,
        FeatureKind::QuantitativeSegmentMatrix,
    ];

    /// Stable type name stored with track metadata
    pub fn type_name(self) -> &'static str {
        match self {
            FeatureKind::QuantitativeSegment => "quantitative.segment",
            FeatureKind::QuantitativePositional => "quantitative.positional",
            FeatureKind::Gene => "gene",
            FeatureKind::Peptide => "peptide",
            FeatureKind::QuantitativeSegmentMatrix => "quantitative.segment.matrix",
        }
    }

    /// Kinds whose features carry numeric values (and get a value range on import)
    pub fn is_quantitative(self) -> bool {
        !matches!(self, FeatureKind::Gene | FeatureKind::Peptide)
    }
}

impl FromStr for FeatureKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        FeatureKind::ALL
            .into_iter()
            .find(|kind| kind.type_name() == lower)
            .or(match lower.as_str() {
                "segment" => Some(FeatureKind::QuantitativeSegment),
                "positional" => Some(FeatureKind::QuantitativePositional),
                "matrix" => Some(FeatureKind::QuantitativeSegmentMatrix),
                _ => None,
            })
            .ok_or_else(|| ParseKindError(s.to_string()))
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Annotation type of a gene-track feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GeneType {
    #[default]
    Gene,
    Cds,
    Trna,
    Rrna,
    Rna,
    Ncrna,
    Repeat,
    Operon,
    Pfam,
    Peptide,
    Other,
}

impl GeneType {
    /// Case-insensitive lookup; unrecognized spellings are treated as plain genes
    pub fn from_name(name: &str) -> GeneType {
        match name.trim().to_ascii_lowercase().as_str() {
            "cds" => GeneType::Cds,
            "trna" => GeneType::Trna,
            "rrna" => GeneType::Rrna,
            "rna" => GeneType::Rna,
            "ncrna" => GeneType::Ncrna,
            "repeat" => GeneType::Repeat,
            "operon" => GeneType::Operon,
            "pfam" => GeneType::Pfam,
            "peptide" => GeneType::Peptide,
            "other" => GeneType::Other,
            _ => GeneType::Gene,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            GeneType::Gene => "gene",
            GeneType::Cds => "cds",
            GeneType::Trna => "trna",
            GeneType::Rrna => "rrna",
            GeneType::Rna => "rna",
            GeneType::Ncrna => "ncrna",
            GeneType::Repeat => "repeat",
            GeneType::Operon => "operon",
            GeneType::Pfam => "pfam",
            GeneType::Peptide => "peptide",
            GeneType::Other => "other",
        }
    }
}

impl fmt::Display for GeneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
