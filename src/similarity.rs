//! Pairwise similarity vectors between relay descriptors.
//!
//! A [`DescriptorSimilarity`] is the raw signal for spotting relays run by
//! the same operator. [`pairwise`] enumerates every unordered descriptor
//! pair of an [`ObjectSet`] lazily, so an n-relay set yields
//! n·(n−1)/2 vectors without materializing them.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::model::{Fingerprint, ObjectSet, RelayDescriptor, RelayDescriptors};

const DEFAULT_REJECT_HEAD: &str = "0.0.0.0/8:* 169.254.0.0/16:* 127.0.0.0/8:* \
192.168.0.0/16:* 10.0.0.0/8:* 172.16.0.0/12:* ";
const DEFAULT_REJECT_TAIL: &str = ":* *:25 *:119 *:135-139 *:445 *:563 *:1214 \
*:4661-4666 *:6346-6429 *:6699 *:6881-6999";

/// Reject policy that refuses every destination.
pub const UNIVERSAL_REJECT: &str = "*:*";

/// The network's default reject list for a relay at `address`.
pub fn default_reject_policy(address: &IpAddr) -> String {
    format!("{}{}{}", DEFAULT_REJECT_HEAD, address, DEFAULT_REJECT_TAIL)
}

/// True if the descriptor's reject policy is the default template for its
/// own address or the universal reject policy. Such policies say nothing
/// about who runs the relay.
pub fn has_boilerplate_policy(descriptor: &RelayDescriptor) -> bool {
    let policy = descriptor.raw_reject.trim();
    policy == UNIVERSAL_REJECT || policy == default_reject_policy(&descriptor.address)
}

/// Difference vector between two relay descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorSimilarity {
    pub fingerprint1: Fingerprint,
    pub fingerprint2: Fingerprint,

    pub uptime_diff: u64,
    pub bandwidth_diff: u64,
    pub or_port_diff: u16,
    pub shared_fpr_prefix: u32,
    pub nickname_edit_distance: usize,

    pub same_family: bool,
    pub same_address: bool,
    pub same_contact: bool,
    pub same_version: bool,
    pub have_dir_port: bool,
    pub same_policy: bool,
}

impl DescriptorSimilarity {
    /// Column names in the order used by [`Self::values`].
    pub const COLUMNS: [&'static str; 11] = [
        "same_contact",
        "same_family",
        "same_address",
        "same_version",
        "same_policy",
        "have_dir_port",
        "uptime_diff",
        "or_port_diff",
        "bandwidth_diff",
        "shared_fpr_prefix",
        "nickname_edit_distance",
    ];

    pub fn between(a: &RelayDescriptor, b: &RelayDescriptor) -> Self {
        let same_policy = a.raw_reject.trim() == b.raw_reject.trim()
            && !has_boilerplate_policy(a)
            && !has_boilerplate_policy(b);

        Self {
            fingerprint1: a.fingerprint.clone(),
            fingerprint2: b.fingerprint.clone(),
            uptime_diff: a.uptime.abs_diff(b.uptime),
            bandwidth_diff: a.bandwidth_avg.abs_diff(b.bandwidth_avg),
            or_port_diff: a.or_port.abs_diff(b.or_port),
            shared_fpr_prefix: a.fingerprint.shared_prefix(&b.fingerprint),
            nickname_edit_distance: levenshtein(&a.nickname, &b.nickname),
            same_family: a.has_family(&b.fingerprint) && b.has_family(&a.fingerprint),
            same_address: a.address == b.address,
            same_contact: a.contact == b.contact && !a.contact.is_empty(),
            same_version: a.tor_version == b.tor_version,
            have_dir_port: a.dir_port != 0 && b.dir_port != 0,
            same_policy,
        }
    }

    /// Every dimension rendered as text, aligned with [`Self::COLUMNS`].
    pub fn values(&self) -> [String; 11] {
        [
            self.same_contact.to_string(),
            self.same_family.to_string(),
            self.same_address.to_string(),
            self.same_version.to_string(),
            self.same_policy.to_string(),
            self.have_dir_port.to_string(),
            self.uptime_diff.to_string(),
            self.or_port_diff.to_string(),
            self.bandwidth_diff.to_string(),
            self.shared_fpr_prefix.to_string(),
            self.nickname_edit_distance.to_string(),
        ]
    }
}

/// Levenshtein distance over Unicode scalar values; insertion, deletion and
/// substitution each cost 1.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Single rolling row of the edit matrix.
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            let next = (row[j + 1] + 1).min(row[j] + 1).min(diagonal + cost);
            diagonal = row[j + 1];
            row[j + 1] = next;
        }
    }

    row[b.len()]
}

/// Lazy iterator over all unordered descriptor pairs.
pub struct Pairwise<'a> {
    descriptors: Vec<&'a RelayDescriptor>,
    i: usize,
    j: usize,
}

impl<'a> Iterator for Pairwise<'a> {
    type Item = DescriptorSimilarity;

    fn next(&mut self) -> Option<Self::Item> {
        let n = self.descriptors.len();
        while self.i < n {
            if self.j < n {
                let item =
                    DescriptorSimilarity::between(self.descriptors[self.i], self.descriptors[self.j]);
                self.j += 1;
                return Some(item);
            }
            self.i += 1;
            self.j = self.i + 1;
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.descriptors.len();
        if self.i >= n {
            return (0, Some(0));
        }
        // Remainder of the current row plus every later row.
        let rest_of_row = n.saturating_sub(self.j);
        let later_rows = (n - self.i - 1) * (n - self.i).saturating_sub(2) / 2;
        let remaining = rest_of_row + later_rows;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Pairwise<'_> {}

/// Similarity vectors for every unordered descriptor pair in `set`.
///
/// Sets without descriptors yield nothing.
pub fn pairwise(set: &ObjectSet) -> Pairwise<'_> {
    match set.descriptors() {
        Some(descriptors) => pairwise_descriptors(descriptors),
        None => Pairwise {
            descriptors: Vec::new(),
            i: 0,
            j: 1,
        },
    }
}

/// Similarity vectors for every unordered pair in `descriptors`.
///
/// `fingerprint1` always belongs to the descriptor that comes first in the
/// collection's iteration order.
pub fn pairwise_descriptors(descriptors: &RelayDescriptors) -> Pairwise<'_> {
    Pairwise {
        descriptors: descriptors.iter().collect(),
        i: 0,
        j: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{descriptor, fpr, status};
    use crate::model::Consensus;
    use std::collections::HashSet;

    #[test]
    fn test_levenshtein_known_values() {
        assert_eq!(levenshtein("alice", "alice"), 0);
        assert_eq!(levenshtein("alice", "alicee"), 1);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
    }

    #[test]
    fn test_between_numeric_diffs() {
        let mut a = descriptor(fpr('A'), "relay1");
        let mut b = descriptor(fpr('B'), "relay2");
        a.uptime = 100;
        b.uptime = 350;
        a.bandwidth_avg = 5000;
        b.bandwidth_avg = 2000;
        a.or_port = 443;
        b.or_port = 9001;

        let sim = DescriptorSimilarity::between(&a, &b);
        assert_eq!(sim.uptime_diff, 250);
        assert_eq!(sim.bandwidth_diff, 3000);
        assert_eq!(sim.or_port_diff, 8558);
        assert_eq!(sim.shared_fpr_prefix, 0);
        assert_eq!(sim.nickname_edit_distance, 1);
    }

    #[test]
    fn test_family_must_be_mutual() {
        let mut a = descriptor(fpr('A'), "a");
        let mut b = descriptor(fpr('B'), "b");
        a.family.insert(fpr('B'));
        assert!(!DescriptorSimilarity::between(&a, &b).same_family);

        b.family.insert(fpr('A'));
        assert!(DescriptorSimilarity::between(&a, &b).same_family);
    }

    #[test]
    fn test_empty_contact_never_matches() {
        let mut a = descriptor(fpr('A'), "a");
        let mut b = descriptor(fpr('B'), "b");
        assert!(!DescriptorSimilarity::between(&a, &b).same_contact);

        a.contact = "ops@example.org".to_string();
        b.contact = "ops@example.org".to_string();
        assert!(DescriptorSimilarity::between(&a, &b).same_contact);
    }

    #[test]
    fn test_dir_port_needs_both() {
        let mut a = descriptor(fpr('A'), "a");
        let mut b = descriptor(fpr('B'), "b");
        a.dir_port = 80;
        assert!(!DescriptorSimilarity::between(&a, &b).have_dir_port);
        b.dir_port = 9030;
        assert!(DescriptorSimilarity::between(&a, &b).have_dir_port);
    }

    #[test]
    fn test_default_policy_is_exempt() {
        let mut a = descriptor(fpr('A'), "a");
        let mut b = descriptor(fpr('B'), "b");
        a.raw_reject = default_reject_policy(&a.address);
        b.raw_reject = a.raw_reject.clone();
        assert!(has_boilerplate_policy(&a));
        assert!(!DescriptorSimilarity::between(&a, &b).same_policy);
        assert!(!DescriptorSimilarity::between(&b, &a).same_policy);
    }

    #[test]
    fn test_default_template_of_other_address_is_still_exempt() {
        let mut a = descriptor(fpr('A'), "a");
        let mut b = descriptor(fpr('B'), "b");
        b.address = "203.0.113.9".parse().unwrap();
        a.raw_reject = default_reject_policy(&a.address);
        b.raw_reject = a.raw_reject.clone();

        // b's copy is not b's own template, but a's is, so neither order counts.
        assert!(!has_boilerplate_policy(&b));
        assert!(!DescriptorSimilarity::between(&a, &b).same_policy);
        assert!(!DescriptorSimilarity::between(&b, &a).same_policy);
    }

    #[test]
    fn test_universal_reject_is_exempt() {
        let a = descriptor(fpr('A'), "a");
        let b = descriptor(fpr('B'), "b");
        assert_eq!(a.raw_reject, UNIVERSAL_REJECT);
        assert!(!DescriptorSimilarity::between(&a, &b).same_policy);
    }

    #[test]
    fn test_custom_policy_matches() {
        let mut a = descriptor(fpr('A'), "a");
        let mut b = descriptor(fpr('B'), "b");
        a.raw_reject = "*:25 *:465 *:587".to_string();
        b.raw_reject = "*:25 *:465 *:587 ".to_string();
        assert!(DescriptorSimilarity::between(&a, &b).same_policy);

        b.raw_reject = "*:25".to_string();
        assert!(!DescriptorSimilarity::between(&a, &b).same_policy);
    }

    #[test]
    fn test_between_is_symmetric() {
        let mut a = descriptor(fpr('A'), "alice");
        let mut b = descriptor(fpr('B'), "bob");
        a.uptime = 10;
        b.uptime = 99;
        a.contact = "x".to_string();
        b.contact = "x".to_string();
        a.raw_reject = "*:22".to_string();
        b.raw_reject = "*:22".to_string();
        b.tor_version = "0.2.8.1".to_string();

        let ab = DescriptorSimilarity::between(&a, &b);
        let mut ba = DescriptorSimilarity::between(&b, &a);
        assert_eq!(ba.fingerprint1, ab.fingerprint2);
        assert_eq!(ba.fingerprint2, ab.fingerprint1);
        std::mem::swap(&mut ba.fingerprint1, &mut ba.fingerprint2);
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_pairwise_count_and_uniqueness() {
        for n in 0..7usize {
            let descs: RelayDescriptors = "ABCDEF0"
                .chars()
                .take(n)
                .map(|c| descriptor(fpr(c), "r"))
                .collect();

            let pairs = pairwise_descriptors(&descs);
            assert_eq!(pairs.len(), n * n.saturating_sub(1) / 2);

            let seen: Vec<_> = pairs.collect();
            assert_eq!(seen.len(), n * n.saturating_sub(1) / 2);

            let unique: HashSet<_> = seen
                .iter()
                .map(|s| {
                    let mut key = [s.fingerprint1.clone(), s.fingerprint2.clone()];
                    key.sort();
                    key
                })
                .collect();
            assert_eq!(unique.len(), seen.len());
            assert!(seen.iter().all(|s| s.fingerprint1 != s.fingerprint2));
        }
    }

    #[test]
    fn test_pairwise_order_is_deterministic() {
        let descs: RelayDescriptors = ['C', 'A', 'B']
            .into_iter()
            .map(|c| descriptor(fpr(c), "r"))
            .collect();

        let pairs: Vec<_> = pairwise_descriptors(&descs)
            .map(|s| (s.fingerprint1, s.fingerprint2))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (fpr('A'), fpr('B')),
                (fpr('A'), fpr('C')),
                (fpr('B'), fpr('C')),
            ]
        );
    }

    #[test]
    fn test_pairwise_over_object_sets() {
        let descs: RelayDescriptors = ['A', 'B', 'C']
            .into_iter()
            .map(|c| descriptor(fpr(c), "r"))
            .collect();
        let mut consensus = Consensus::new(None);
        consensus.insert(status(fpr('D'), "d"));

        assert_eq!(pairwise(&ObjectSet::Consensus(consensus.clone())).len(), 0);
        assert_eq!(pairwise(&ObjectSet::Consensus(consensus.clone())).count(), 0);
        assert_eq!(pairwise(&ObjectSet::Descriptors(descs.clone())).count(), 3);

        let mixed = ObjectSet::Mixed {
            descriptors: descs,
            consensus,
        };
        let pairs: Vec<_> = pairwise(&mixed).collect();
        assert_eq!(pairs.len(), 3);
        assert!(pairs.iter().all(|p| p.fingerprint2 != fpr('D')));
    }

    #[test]
    fn test_prefix_bounds() {
        let a = descriptor(fpr('A'), "a");
        let same = DescriptorSimilarity::between(&a, &a);
        assert_eq!(same.shared_fpr_prefix, 40);

        let b = descriptor(
            "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAB".parse().unwrap(),
            "b",
        );
        assert_eq!(DescriptorSimilarity::between(&a, &b).shared_fpr_prefix, 39);
    }

    #[test]
    fn test_values_align_with_columns() {
        let a = descriptor(fpr('A'), "a");
        let b = descriptor(fpr('B'), "b");
        let sim = DescriptorSimilarity::between(&a, &b);
        let values = sim.values();
        assert_eq!(values.len(), DescriptorSimilarity::COLUMNS.len());
        assert_eq!(values[2], "true");
        assert_eq!(values[10], "1");
    }
}
