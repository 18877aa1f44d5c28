pub mod resolver;
pub mod roman;

use crate::attributes::Attributes;
use crate::{Coord, DatasetId, SequenceId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use resolver::SequenceNameResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Topology {
    #[default]
    Linear,
    Circular,
}

impl FromStr for Topology {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "linear" => Ok(Topology::Linear),
            "circular" => Ok(Topology::Circular),
            other => Err(format!("unknown topology: {other}")),
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::Linear => f.write_str("linear"),
            Topology::Circular => f.write_str("circular"),
        }
    }
}

/// A chromosome, plasmid or other replicon registered in a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub id: SequenceId,
    pub dataset: DatasetId,
    pub name: String,
    pub length: Coord,
    pub topology: Topology,
    pub attributes: Attributes,
}
