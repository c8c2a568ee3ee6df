//! Parsed network documents and the `ObjectSet` container that carries them
//! through the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{btree_map, BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

/// Number of hex digits in a relay fingerprint.
pub const FINGERPRINT_LEN: usize = 40;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid fingerprint {value:?}: {reason}")]
pub struct FingerprintError {
    pub value: String,
    pub reason: &'static str,
}

/// 160-bit relay identity, stored as 40 upper-case hex digits.
///
/// Parsing is case-insensitive and tolerates the `$` prefix and the
/// space-separated groups used in server descriptors.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Builds a fingerprint from the raw 20-byte identity digest.
    pub fn from_digest(digest: &[u8]) -> Result<Self, FingerprintError> {
        if digest.len() != FINGERPRINT_LEN / 2 {
            return Err(FingerprintError {
                value: hex::encode(digest),
                reason: "identity digest must be 20 bytes",
            });
        }
        Ok(Self(hex::encode_upper(digest)))
    }

    /// Count of leading hex digits shared with `other`, in `[0, 40]`.
    pub fn shared_prefix(&self, other: &Fingerprint) -> u32 {
        self.0
            .bytes()
            .zip(other.0.bytes())
            .take_while(|(a, b)| a == b)
            .count() as u32
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s
            .trim()
            .trim_start_matches('$')
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();

        if digits.len() != FINGERPRINT_LEN {
            return Err(FingerprintError {
                value: s.to_string(),
                reason: "expected 40 hex digits",
            });
        }
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(FingerprintError {
                value: s.to_string(),
                reason: "non-hex character",
            });
        }

        Ok(Self(digits.to_ascii_uppercase()))
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = FingerprintError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Fingerprint> for String {
    fn from(fpr: Fingerprint) -> Self {
        fpr.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A relay's self-published server descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayDescriptor {
    pub fingerprint: Fingerprint,
    pub nickname: String,
    pub address: IpAddr,
    pub or_port: u16,
    /// 0 means the relay has no directory port.
    pub dir_port: u16,
    pub bandwidth_avg: u64,
    pub bandwidth_burst: u64,
    pub bandwidth_observed: u64,
    /// Seconds.
    pub uptime: u64,
    /// Empty when the operator published no contact line.
    pub contact: String,
    pub tor_version: String,
    pub published: Option<DateTime<Utc>>,
    /// Fingerprints this relay claims to share an operator with.
    pub family: BTreeSet<Fingerprint>,
    /// Reject clauses joined by single spaces, in document order.
    pub raw_reject: String,
    pub raw_accept: String,
}

impl RelayDescriptor {
    pub fn has_family(&self, fingerprint: &Fingerprint) -> bool {
        self.family.contains(fingerprint)
    }
}

/// One router entry of a network-status consensus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStatus {
    pub fingerprint: Fingerprint,
    pub nickname: String,
    pub address: IpAddr,
    pub or_port: u16,
    pub dir_port: u16,
    pub published: Option<DateTime<Utc>>,
    pub flags: Vec<String>,
    pub tor_version: Option<String>,
    pub bandwidth: Option<u64>,
}

/// Descriptors keyed by fingerprint.
///
/// Iteration follows fingerprint order, which keeps pairwise output
/// reproducible between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayDescriptors {
    entries: BTreeMap<Fingerprint, RelayDescriptor>,
}

impl RelayDescriptors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a descriptor, replacing any previous one with the same key.
    pub fn insert(&mut self, descriptor: RelayDescriptor) -> Option<RelayDescriptor> {
        self.entries
            .insert(descriptor.fingerprint.clone(), descriptor)
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&RelayDescriptor> {
        self.entries.get(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn fingerprints(&self) -> impl Iterator<Item = &Fingerprint> {
        self.entries.keys()
    }

    pub fn iter(&self) -> btree_map::Values<'_, Fingerprint, RelayDescriptor> {
        self.entries.values()
    }

    /// Last writer wins: entries from `other` replace entries with the same
    /// fingerprint.
    pub fn merge(&mut self, other: RelayDescriptors) {
        self.entries.extend(other.entries);
    }
}

impl FromIterator<RelayDescriptor> for RelayDescriptors {
    fn from_iter<I: IntoIterator<Item = RelayDescriptor>>(iter: I) -> Self {
        let mut descriptors = Self::new();
        for descriptor in iter {
            descriptors.insert(descriptor);
        }
        descriptors
    }
}

/// Router statuses of one or more consensus documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consensus {
    pub valid_after: Option<DateTime<Utc>>,
    statuses: BTreeMap<Fingerprint, RouterStatus>,
}

impl Consensus {
    pub fn new(valid_after: Option<DateTime<Utc>>) -> Self {
        Self {
            valid_after,
            statuses: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, status: RouterStatus) -> Option<RouterStatus> {
        self.statuses.insert(status.fingerprint.clone(), status)
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&RouterStatus> {
        self.statuses.get(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    pub fn iter(&self) -> btree_map::Values<'_, Fingerprint, RouterStatus> {
        self.statuses.values()
    }

    /// Same last-writer-wins rule as [`RelayDescriptors::merge`]; the
    /// later document's `valid_after` replaces the earlier one when present.
    pub fn merge(&mut self, other: Consensus) {
        if other.valid_after.is_some() {
            self.valid_after = other.valid_after;
        }
        self.statuses.extend(other.statuses);
    }
}

/// Parsed documents from one traversal unit, or the merge of several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectSet {
    Descriptors(RelayDescriptors),
    Consensus(Consensus),
    Mixed {
        descriptors: RelayDescriptors,
        consensus: Consensus,
    },
}

impl ObjectSet {
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of documents in the set.
    pub fn len(&self) -> usize {
        match self {
            ObjectSet::Descriptors(d) => d.len(),
            ObjectSet::Consensus(c) => c.len(),
            ObjectSet::Mixed {
                descriptors,
                consensus,
            } => descriptors.len() + consensus.len(),
        }
    }

    pub fn descriptors(&self) -> Option<&RelayDescriptors> {
        match self {
            ObjectSet::Descriptors(d) | ObjectSet::Mixed { descriptors: d, .. } => Some(d),
            ObjectSet::Consensus(_) => None,
        }
    }

    pub fn consensus(&self) -> Option<&Consensus> {
        match self {
            ObjectSet::Consensus(c) | ObjectSet::Mixed { consensus: c, .. } => Some(c),
            ObjectSet::Descriptors(_) => None,
        }
    }

    /// Merges `other` into `self`. Documents are keyed by fingerprint and the
    /// entry from `other` wins on conflict. Merging descriptors with
    /// statuses yields [`ObjectSet::Mixed`].
    pub fn merge(self, other: ObjectSet) -> ObjectSet {
        let (mut descriptors, mut consensus) = self.into_parts();
        let (other_descriptors, other_consensus) = other.into_parts();

        descriptors = match (descriptors, other_descriptors) {
            (Some(mut mine), Some(theirs)) => {
                mine.merge(theirs);
                Some(mine)
            }
            (mine, theirs) => mine.or(theirs),
        };
        consensus = match (consensus, other_consensus) {
            (Some(mut mine), Some(theirs)) => {
                mine.merge(theirs);
                Some(mine)
            }
            (mine, theirs) => mine.or(theirs),
        };

        Self::from_parts(descriptors, consensus)
    }

    fn into_parts(self) -> (Option<RelayDescriptors>, Option<Consensus>) {
        match self {
            ObjectSet::Descriptors(d) => (Some(d), None),
            ObjectSet::Consensus(c) => (None, Some(c)),
            ObjectSet::Mixed {
                descriptors,
                consensus,
            } => (Some(descriptors), Some(consensus)),
        }
    }

    fn from_parts(descriptors: Option<RelayDescriptors>, consensus: Option<Consensus>) -> Self {
        match (descriptors, consensus) {
            (Some(descriptors), Some(consensus)) => ObjectSet::Mixed {
                descriptors,
                consensus,
            },
            (None, Some(consensus)) => ObjectSet::Consensus(consensus),
            (descriptors, None) => ObjectSet::Descriptors(descriptors.unwrap_or_default()),
        }
    }
}

impl From<RelayDescriptors> for ObjectSet {
    fn from(descriptors: RelayDescriptors) -> Self {
        ObjectSet::Descriptors(descriptors)
    }
}

impl From<Consensus> for ObjectSet {
    fn from(consensus: Consensus) -> Self {
        ObjectSet::Consensus(consensus)
    }
}
