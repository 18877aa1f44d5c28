use crate::FeatureKind;
use crate::import::ImportState;
use std::fmt;
use thiserror::Error;

pub type Result<T, E = TrackError> = std::result::Result<T, E>;

/// One unusable field in one incoming record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordProblem {
    /// Zero-based position of the record in the source
    pub record: u64,
    pub field: &'static str,
    pub value: String,
    pub reason: String,
}

impl RecordProblem {
    pub fn new(record: u64, field: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self {
            record,
            field,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RecordProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "record {}: field '{}' = {:?}: {}",
            self.record, self.field, self.value, self.reason
        )
    }
}

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("unknown sequence name: {0:?}")]
    UnknownSequenceName(String),

    #[error("{} unknown sequence names: {}", .0.len(), .0.join(", "))]
    UnknownSequenceNames(Vec<String>),

    #[error("malformed record: {0}")]
    MalformedRecord(RecordProblem),

    #[error("{} malformed records, first: {}", .0.len(), first_problem(.0))]
    MalformedRecords(Vec<RecordProblem>),

    #[error("storage failure: {0}")]
    StorageFailure(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failed: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("import canceled")]
    ImportCanceled,

    #[error("invalid import transition from {from:?} to {to:?}")]
    InvalidTransition { from: ImportState, to: ImportState },

    #[error("track holds {found} features, not {expected}")]
    KindMismatch {
        expected: FeatureKind,
        found: FeatureKind,
    },

    #[error("not found: {0}")]
    NotFound(String),
}

fn first_problem(problems: &[RecordProblem]) -> String {
    problems
        .first()
        .map(|p| p.to_string())
        .unwrap_or_default()
}

impl TrackError {
    /// Errors raised by the persistent store rather than by the data being imported
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            TrackError::StorageFailure(_) | TrackError::Io(_) | TrackError::Serialization(_)
        )
    }

    pub fn storage(message: impl Into<String>) -> Self {
        TrackError::StorageFailure(message.into())
    }
}
