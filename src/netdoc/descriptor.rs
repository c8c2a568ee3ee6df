use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::str::FromStr;

use super::{split_keyword, BlockSkipper, ObjectFilter};
use crate::model::{Fingerprint, RelayDescriptor, RelayDescriptors};
use crate::traits::ParseError;

pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Fields collected between one `router` line and the next.
#[derive(Debug)]
struct DescriptorBuilder {
    start_line: usize,
    nickname: String,
    address: IpAddr,
    or_port: u16,
    dir_port: u16,
    fingerprint: Option<Fingerprint>,
    bandwidth: (u64, u64, u64),
    uptime: u64,
    contact: String,
    tor_version: String,
    published: Option<DateTime<Utc>>,
    family: BTreeSet<Fingerprint>,
    reject: Vec<String>,
    accept: Vec<String>,
}

impl DescriptorBuilder {
    fn from_router_line(line_no: usize, args: &str) -> Result<Self, ParseError> {
        let fields: Vec<&str> = args.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(malformed(line_no, "router", "expected 5 fields"));
        }

        Ok(Self {
            start_line: line_no,
            nickname: fields[0].to_string(),
            address: parse_field(line_no, "router", fields[1])?,
            or_port: parse_field(line_no, "router", fields[2])?,
            dir_port: parse_field(line_no, "router", fields[4])?,
            fingerprint: None,
            bandwidth: (0, 0, 0),
            uptime: 0,
            contact: String::new(),
            tor_version: String::new(),
            published: None,
            family: BTreeSet::new(),
            reject: Vec::new(),
            accept: Vec::new(),
        })
    }

    fn apply(&mut self, line_no: usize, keyword: &str, args: &str) -> Result<(), ParseError> {
        match keyword {
            "platform" => self.tor_version = platform_version(args),
            "published" => self.published = Some(parse_timestamp(line_no, keyword, args)?),
            "fingerprint" => {
                let fpr = args
                    .parse()
                    .map_err(|e: crate::model::FingerprintError| {
                        malformed(line_no, keyword, &e.to_string())
                    })?;
                self.fingerprint = Some(fpr);
            }
            "uptime" => self.uptime = parse_field(line_no, keyword, args)?,
            "bandwidth" => {
                let values: Vec<&str> = args.split_whitespace().collect();
                if values.len() != 3 {
                    return Err(malformed(line_no, keyword, "expected 3 values"));
                }
                self.bandwidth = (
                    parse_field(line_no, keyword, values[0])?,
                    parse_field(line_no, keyword, values[1])?,
                    parse_field(line_no, keyword, values[2])?,
                );
            }
            "contact" => self.contact = args.to_string(),
            // Members may be listed by nickname; only fingerprints are kept.
            "family" => self.family.extend(
                args.split_whitespace()
                    .filter_map(|member| member.split(['=', '~']).next())
                    .filter_map(|member| member.parse::<Fingerprint>().ok()),
            ),
            "reject" => self.reject.push(args.to_string()),
            "accept" => self.accept.push(args.to_string()),
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> Result<RelayDescriptor, ParseError> {
        let fingerprint = self.fingerprint.ok_or(ParseError::MissingField {
            document: "server descriptor",
            field: "fingerprint",
            line: self.start_line,
        })?;

        Ok(RelayDescriptor {
            fingerprint,
            nickname: self.nickname,
            address: self.address,
            or_port: self.or_port,
            dir_port: self.dir_port,
            bandwidth_avg: self.bandwidth.0,
            bandwidth_burst: self.bandwidth.1,
            bandwidth_observed: self.bandwidth.2,
            uptime: self.uptime,
            contact: self.contact,
            tor_version: self.tor_version,
            published: self.published,
            family: self.family,
            raw_reject: self.reject.join(" "),
            raw_accept: self.accept.join(" "),
        })
    }
}

/// Parses a file holding one or more concatenated server descriptors.
///
/// Descriptors rejected by `filter` are dropped; a descriptor without a
/// `fingerprint` line fails the whole file.
pub fn parse_descriptors(text: &str, filter: &ObjectFilter) -> Result<RelayDescriptors, ParseError> {
    let mut descriptors = RelayDescriptors::new();
    let mut current: Option<DescriptorBuilder> = None;
    let mut blocks = BlockSkipper::default();

    let admit = |builder: DescriptorBuilder,
                 out: &mut RelayDescriptors|
     -> Result<(), ParseError> {
        let descriptor = builder.finish()?;
        if filter.admits(&descriptor.fingerprint, &descriptor.address, &descriptor.nickname) {
            out.insert(descriptor);
        }
        Ok(())
    };

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('@') || blocks.skip(line) {
            continue;
        }

        let (keyword, args) = split_keyword(line);
        if keyword == "router" {
            if let Some(done) = current.take() {
                admit(done, &mut descriptors)?;
            }
            current = Some(DescriptorBuilder::from_router_line(line_no, args)?);
        } else if let Some(builder) = current.as_mut() {
            builder.apply(line_no, keyword, args)?;
        }
    }

    if let Some(done) = current.take() {
        admit(done, &mut descriptors)?;
    }

    Ok(descriptors)
}

/// `Tor 0.2.7.6 on Linux` → `0.2.7.6`. Unrecognised platforms are kept
/// verbatim.
fn platform_version(args: &str) -> String {
    let mut words = args.split_whitespace();
    match (words.next(), words.next()) {
        (Some("Tor"), Some(version)) => version.to_string(),
        _ => args.to_string(),
    }
}

pub(crate) fn parse_timestamp(
    line_no: usize,
    keyword: &str,
    value: &str,
) -> Result<DateTime<Utc>, ParseError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| malformed(line_no, keyword, &e.to_string()))
}

pub(crate) fn parse_field<T>(line_no: usize, keyword: &str, value: &str) -> Result<T, ParseError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| malformed(line_no, keyword, &format!("{:?}: {}", value, e)))
}

pub(crate) fn malformed(line: usize, keyword: &str, reason: &str) -> ParseError {
    ParseError::Malformed {
        line,
        keyword: keyword.to_string(),
        reason: reason.to_string(),
    }
}
