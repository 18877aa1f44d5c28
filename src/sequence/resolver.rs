//! Maps the many spellings of a sequence name found in external files onto
//! the sequences registered in a dataset.
//!
//! Names considered equivalent include:
//!
//! - `chr1`, `Chr1`, `chromosome1`, `chromosome-1`, `Chromosome 1`, `1`
//! - `chr4` and `IV` when the registered names use Roman numerals
//! - `plasmid A` and `A`
//!
//! `plasmid 1` never maps to `1`: a bare number denotes a chromosome.

use super::Sequence;
use super::roman;
use crate::error::{Result, TrackError};
use crate::SequenceId;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static SINGLE_CHROMOSOME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^chr(?:omosome)?[-_ ]?1?$").expect("single chromosome pattern compiles")
});

static CHROMOSOME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:chr(?:omosome)?)[-_ ]?(.*)$").expect("chromosome pattern compiles")
});

static PLASMID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i:plasmid)[-_ ]?(.*)$").expect("plasmid pattern compiles"));

static NUMBERED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?i:chr(?:omosome)?)[-_ ]?)?\d+$").expect("numbered pattern compiles")
});

// M is left out: chrM is the mitochondrion, not chromosome 1000.
static ROMAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?i:chr(?:omosome)?)[-_ ]?)?([IVXLCD]+)$").expect("roman pattern compiles")
});

// Incoming names are matched in any case; registered names only in upper case.
static ROMAN_ANY_CASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)(?:chr(?:omosome)?[-_ ]?)?([ivxlcd]+)$").expect("roman lookup pattern compiles")
});

/// Share of registered names that must be Roman numerals before numerals are decoded
const ROMAN_THRESHOLD: f64 = 0.6;

fn chromosome_stem(name: &str) -> Option<&str> {
    CHROMOSOME
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
}

fn plasmid_stem(name: &str) -> Option<&str> {
    PLASMID
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
}

/// Decoded value of a name such as `XII`, `chrIV` or `chromosome_IX`
fn roman_value(name: &str) -> Option<u32> {
    ROMAN
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| roman::parse_roman(m.as_str()))
}

/// Like [`roman_value`] but for incoming names, which may be lower case (`chrxii`)
fn roman_lookup_value(name: &str) -> Option<u32> {
    ROMAN_ANY_CASE
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| roman::parse_roman(&m.as_str().to_ascii_uppercase()))
}

fn is_integer(s: &str) -> bool {
    !s.is_empty() && s.parse::<i64>().is_ok()
}

/// Heuristic sequence name lookup built once per dataset.
///
/// Construction is deterministic: registered names are processed in sorted
/// order and the first name to claim a derived key keeps it.
#[derive(Debug, Clone)]
pub struct SequenceNameResolver {
    /// Registered names, plus trimmed lower-case forms that don't collide
    names: HashMap<String, SequenceId>,
    /// Lower-case stems of names with a `chr`/`chromosome` prefix, plus decoded numerals
    chromosomes: HashMap<String, SequenceId>,
    /// Lower-case stems of names with a `plasmid` prefix
    plasmids: HashMap<String, SequenceId>,
    single_chromosome: Option<SequenceId>,
    roman_numerals: bool,
}

impl SequenceNameResolver {
    pub fn new<I, S>(registered: I) -> Self
    where
        I: IntoIterator<Item = (S, SequenceId)>,
        S: Into<String>,
    {
        let mut registered: Vec<(String, SequenceId)> = registered
            .into_iter()
            .map(|(name, id)| (name.into(), id))
            .collect();
        registered.sort();

        let mut names = HashMap::with_capacity(registered.len() * 2);
        for (name, id) in &registered {
            names.entry(name.clone()).or_insert(*id);
        }
        for (name, id) in &registered {
            names.entry(name.trim().to_lowercase()).or_insert(*id);
        }

        let mut chromosomes = HashMap::new();
        let mut plasmids = HashMap::new();
        let mut chr_prefixed = Vec::new();
        let mut numbered = 0usize;
        let mut romans = 0usize;

        for (name, id) in &registered {
            if let Some(stem) = chromosome_stem(name) {
                chromosomes.entry(stem.to_lowercase()).or_insert(*id);
            }
            if let Some(stem) = plasmid_stem(name) {
                plasmids.entry(stem.to_lowercase()).or_insert(*id);
            }
            if name.trim().to_lowercase().starts_with("chr") {
                chr_prefixed.push(*id);
            }
            if NUMBERED.is_match(name) {
                numbered += 1;
            }
            if roman_value(name).is_some() {
                romans += 1;
            }
        }

        // Lots of ordinary names look like numerals (chrX, chrLCD), so only
        // decode them when numerals clearly dominate and nothing is numbered.
        let roman_numerals = !registered.is_empty()
            && numbered == 0
            && romans as f64 / registered.len() as f64 > ROMAN_THRESHOLD;
        if roman_numerals {
            for (name, id) in &registered {
                if let Some(value) = roman_value(name) {
                    chromosomes.entry(value.to_string()).or_insert(*id);
                }
            }
        }

        let single_chromosome = match chr_prefixed.as_slice() {
            [only] => Some(*only),
            _ => None,
        };

        Self {
            names,
            chromosomes,
            plasmids,
            single_chromosome,
            roman_numerals,
        }
    }

    pub fn from_sequences(sequences: &[Sequence]) -> Self {
        Self::new(sequences.iter().map(|s| (s.name.as_str(), s.id)))
    }

    /// Resolve a raw name, trying each heuristic in priority order
    pub fn map(&self, name: &str) -> Result<SequenceId> {
        let lower = name.trim().to_lowercase();
        self.exact(name)
            .or_else(|| self.case_insensitive(&lower))
            .or_else(|| self.single_chromosome(&lower))
            .or_else(|| self.chromosome(&lower))
            .or_else(|| self.plasmid(&lower))
            .or_else(|| self.roman_chromosome(name.trim()))
            .ok_or_else(|| TrackError::UnknownSequenceName(name.to_string()))
    }

    /// Whether Roman numeral names were detected among the registered names
    pub fn uses_roman_numerals(&self) -> bool {
        self.roman_numerals
    }

    fn exact(&self, name: &str) -> Option<SequenceId> {
        self.names.get(name).copied()
    }

    fn case_insensitive(&self, lower: &str) -> Option<SequenceId> {
        self.names.get(lower).copied()
    }

    /// With exactly one chromosome, `chr`, `chromosome` and `chromosome 1` all mean it
    fn single_chromosome(&self, lower: &str) -> Option<SequenceId> {
        self.single_chromosome
            .filter(|_| SINGLE_CHROMOSOME.is_match(lower))
    }

    fn chromosome(&self, lower: &str) -> Option<SequenceId> {
        if let Some(id) = self.chromosomes.get(lower) {
            return Some(*id);
        }
        let stem = chromosome_stem(lower)?;
        self.chromosomes
            .get(stem)
            .or_else(|| self.names.get(stem))
            .copied()
    }

    fn plasmid(&self, lower: &str) -> Option<SequenceId> {
        if let Some(id) = self.plasmids.get(lower) {
            return Some(*id);
        }
        let stem = plasmid_stem(lower)?;
        if let Some(id) = self.plasmids.get(stem) {
            return Some(*id);
        }
        if is_integer(stem) {
            return None;
        }
        self.names.get(stem).copied()
    }

    /// `chrIV`, `chromosome iv`; `chrI` also names the only chromosome
    fn roman_chromosome(&self, name: &str) -> Option<SequenceId> {
        let value = roman_lookup_value(name)?;
        let key = value.to_string();
        self.chromosomes
            .get(&key)
            .or_else(|| self.names.get(&key))
            .copied()
            .or_else(|| self.single_chromosome.filter(|_| value == 1))
    }
}
