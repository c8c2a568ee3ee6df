//! Network document parsing.
//!
//! [`NetDocExtractor`] is the default [`ObjectExtractor`]. It recognises
//! server descriptor files and network-status consensus documents by their
//! first keyword line and applies an [`ObjectFilter`] while parsing.

mod consensus;
mod descriptor;

use std::collections::HashSet;
use std::io::Read;
use std::net::IpAddr;

use crate::model::{Fingerprint, ObjectSet};
use crate::traits::{ObjectExtractor, ParseError};

pub use consensus::parse_consensus;
pub use descriptor::parse_descriptors;

/// Restricts parsed documents by fingerprint, address or nickname.
///
/// An empty filter admits everything; otherwise a document is admitted when
/// any one of its fingerprint, address or nickname is listed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectFilter {
    fingerprints: HashSet<Fingerprint>,
    addresses: HashSet<IpAddr>,
    nicknames: HashSet<String>,
}

impl ObjectFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprints.insert(fingerprint);
        self
    }

    pub fn with_address(mut self, address: IpAddr) -> Self {
        self.addresses.insert(address);
        self
    }

    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nicknames.insert(nickname.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty() && self.addresses.is_empty() && self.nicknames.is_empty()
    }

    pub fn admits(&self, fingerprint: &Fingerprint, address: &IpAddr, nickname: &str) -> bool {
        self.is_empty()
            || self.fingerprints.contains(fingerprint)
            || self.addresses.contains(address)
            || self.nicknames.contains(nickname)
    }
}

/// Document type, taken from the first meaningful line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    ServerDescriptors,
    Consensus,
}

fn detect(text: &str) -> Result<DocumentKind, ParseError> {
    let first = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();

    if first.starts_with("@type server-descriptor") || first.starts_with("router ") {
        Ok(DocumentKind::ServerDescriptors)
    } else if first.starts_with("@type network-status-consensus-3")
        || first.starts_with("network-status-version 3")
    {
        Ok(DocumentKind::Consensus)
    } else {
        Err(ParseError::UnknownFormat(first.chars().take(64).collect()))
    }
}

/// Default extractor for descriptor and consensus files.
#[derive(Debug, Clone, Default)]
pub struct NetDocExtractor {
    filter: ObjectFilter,
}

impl NetDocExtractor {
    pub fn new(filter: ObjectFilter) -> Self {
        Self { filter }
    }

    pub fn filter(&self) -> &ObjectFilter {
        &self.filter
    }
}

impl ObjectExtractor for NetDocExtractor {
    fn extractor_id(&self) -> &str {
        "netdoc"
    }

    fn extract(&self, content: &mut dyn Read) -> Result<ObjectSet, ParseError> {
        let mut raw = Vec::new();
        content.read_to_end(&mut raw)?;
        let text = String::from_utf8_lossy(&raw);

        match detect(&text)? {
            DocumentKind::ServerDescriptors => {
                parse_descriptors(&text, &self.filter).map(ObjectSet::Descriptors)
            }
            DocumentKind::Consensus => {
                parse_consensus(&text, &self.filter).map(ObjectSet::Consensus)
            }
        }
    }
}

/// Splits a line into its keyword and the remainder.
pub(crate) fn split_keyword(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (line, ""),
    }
}

/// Tracks `-----BEGIN ...-----` / `-----END ...-----` object blocks.
#[derive(Debug, Default)]
pub(crate) struct BlockSkipper {
    inside: bool,
}

impl BlockSkipper {
    /// Returns true if `line` belongs to an object block and should be
    /// ignored.
    pub(crate) fn skip(&mut self, line: &str) -> bool {
        if self.inside {
            if line.starts_with("-----END") {
                self.inside = false;
            }
            return true;
        }
        if line.starts_with("-----BEGIN") {
            self.inside = true;
            return true;
        }
        false
    }
}


#[cfg(test)]
mod tests {
    use super::samples::*;
    use super::*;

    fn extract(extractor: &NetDocExtractor, text: &str) -> Result<ObjectSet, ParseError> {
        extractor.extract(&mut text.as_bytes())
    }

    #[test]
    fn test_detects_descriptor_files() {
        let extractor = NetDocExtractor::default();
        assert_eq!(extractor.extractor_id(), "netdoc");
        let set = extract(&extractor, DESCRIPTOR_A).unwrap();
        assert!(matches!(set, ObjectSet::Descriptors(_)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_detects_consensus_files() {
        let set = extract(&NetDocExtractor::default(), CONSENSUS).unwrap();
        assert!(matches!(set, ObjectSet::Consensus(_)));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let err = extract(&NetDocExtractor::default(), "hello world\n").unwrap_err();
        assert!(matches!(err, ParseError::UnknownFormat(ref first) if first == "hello world"));

        let err = extract(&NetDocExtractor::default(), "").unwrap_err();
        assert!(matches!(err, ParseError::UnknownFormat(_)));
    }

    #[test]
    fn test_filter_semantics() {
        let fpr: Fingerprint = "2C23B21BEADFB956247F6DA9736A61EDCE948413".parse().unwrap();
        let addr: IpAddr = "198.51.100.7".parse().unwrap();
        let other: IpAddr = "203.0.113.1".parse().unwrap();

        assert!(ObjectFilter::new().admits(&fpr, &addr, "alpha"));

        let by_nick = ObjectFilter::new().with_nickname("alpha");
        assert!(by_nick.admits(&fpr, &other, "alpha"));
        assert!(!by_nick.admits(&fpr, &other, "gamma"));

        let by_addr = ObjectFilter::new().with_address(addr);
        assert!(by_addr.admits(&fpr, &addr, "gamma"));
        assert!(!by_addr.admits(&fpr, &other, "gamma"));
    }

    #[test]
    fn test_filter_can_empty_a_document() {
        let extractor = NetDocExtractor::new(ObjectFilter::new().with_nickname("nobody"));
        let set = extract(&extractor, DESCRIPTOR_A).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_block_skipper() {
        let mut skipper = BlockSkipper::default();
        assert!(!skipper.skip("router a"));
        assert!(skipper.skip("-----BEGIN SIGNATURE-----"));
        assert!(skipper.skip("router inside"));
        assert!(skipper.skip("-----END SIGNATURE-----"));
        assert!(!skipper.skip("router b"));
    }
}
