use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;

use super::descriptor::{malformed, parse_field, parse_timestamp};
use super::{split_keyword, BlockSkipper, ObjectFilter};
use crate::model::{Consensus, Fingerprint, RouterStatus};
use crate::traits::ParseError;

/// Parses a network-status consensus into its router statuses.
///
/// Parsing stops at `directory-footer`; signatures that follow are ignored.
pub fn parse_consensus(text: &str, filter: &ObjectFilter) -> Result<Consensus, ParseError> {
    let mut consensus = Consensus::new(None);
    let mut current: Option<RouterStatus> = None;
    let mut blocks = BlockSkipper::default();

    let admit = |status: RouterStatus, consensus: &mut Consensus| {
        if filter.admits(&status.fingerprint, &status.address, &status.nickname) {
            consensus.insert(status);
        }
    };

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('@') || blocks.skip(line) {
            continue;
        }

        let (keyword, args) = split_keyword(line);
        match keyword {
            "valid-after" => {
                consensus.valid_after = Some(parse_timestamp(line_no, keyword, args)?);
            }
            "r" => {
                if let Some(done) = current.take() {
                    admit(done, &mut consensus);
                }
                current = Some(parse_router_line(line_no, args)?);
            }
            "s" => {
                if let Some(status) = current.as_mut() {
                    status.flags = args.split_whitespace().map(String::from).collect();
                }
            }
            "v" => {
                if let Some(status) = current.as_mut() {
                    let version = args.strip_prefix("Tor ").unwrap_or(args);
                    status.tor_version = Some(version.to_string());
                }
            }
            "w" => {
                if let Some(status) = current.as_mut() {
                    status.bandwidth = args
                        .split_whitespace()
                        .find_map(|kv| kv.strip_prefix("Bandwidth="))
                        .map(|value| parse_field(line_no, keyword, value))
                        .transpose()?;
                }
            }
            "directory-footer" => break,
            _ => {}
        }
    }

    if let Some(done) = current.take() {
        admit(done, &mut consensus);
    }

    Ok(consensus)
}

/// `r nickname identity digest date time address orport dirport`
fn parse_router_line(line_no: usize, args: &str) -> Result<RouterStatus, ParseError> {
    let fields: Vec<&str> = args.split_whitespace().collect();
    if fields.len() != 8 {
        return Err(malformed(line_no, "r", "expected 8 fields"));
    }

    let digest = STANDARD_NO_PAD
        .decode(fields[1].trim_end_matches('='))
        .map_err(|e| malformed(line_no, "r", &format!("identity: {}", e)))?;
    let fingerprint = Fingerprint::from_digest(&digest)
        .map_err(|e| malformed(line_no, "r", &e.to_string()))?;
    let published = parse_timestamp(line_no, "r", &format!("{} {}", fields[3], fields[4]))?;

    Ok(RouterStatus {
        fingerprint,
        nickname: fields[0].to_string(),
        address: parse_field(line_no, "r", fields[5])?,
        or_port: parse_field(line_no, "r", fields[6])?,
        dir_port: parse_field(line_no, "r", fields[7])?,
        published: Some(published),
        flags: Vec::new(),
        tor_version: None,
        bandwidth: None,
    })
}

#[cfg(test)]
mod tests {
    use super::super::samples::CONSENSUS;
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_parse_consensus() {
        let consensus = parse_consensus(CONSENSUS, &ObjectFilter::new()).unwrap();
        assert_eq!(
            consensus.valid_after,
            Some(Utc.with_ymd_and_hms(2015, 7, 31, 15, 0, 0).unwrap())
        );
        assert_eq!(consensus.len(), 2);

        let alpha = consensus
            .get(&"2C23B21BEADFB956247F6DA9736A61EDCE948413".parse().unwrap())
            .unwrap();
        assert_eq!(alpha.nickname, "alpha");
        assert_eq!(alpha.or_port, 9001);
        assert_eq!(alpha.dir_port, 9030);
        assert_eq!(alpha.flags, vec!["Fast", "Running", "Stable", "Valid"]);
        assert_eq!(alpha.tor_version.as_deref(), Some("0.2.7.6"));
        assert_eq!(alpha.bandwidth, Some(1200));

        let beta = consensus
            .get(&"2C23B410496F573A616BFF37BC12A2B39F2DBE5E".parse().unwrap())
            .unwrap();
        assert_eq!(beta.tor_version, None);
        assert_eq!(beta.bandwidth, Some(20));
    }

    #[test]
    fn test_consensus_filter_by_address() {
        let filter = ObjectFilter::new().with_address("198.51.100.8".parse().unwrap());
        let consensus = parse_consensus(CONSENSUS, &filter).unwrap();
        assert_eq!(consensus.len(), 1);
        assert_eq!(consensus.iter().next().unwrap().nickname, "beta");
    }

    #[test]
    fn test_bad_identity_is_malformed() {
        let text = "network-status-version 3\nr x !!!! AAAA 2015-07-31 14:00:00 198.51.100.7 9001 0\n";
        let err = parse_consensus(text, &ObjectFilter::new()).unwrap_err();
        assert!(matches!(err, ParseError::Malformed { line: 2, .. }));
    }
}
