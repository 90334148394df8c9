//! Parsers for administrative command output
//!
//! Both parsers are total over arbitrary text: lines that do not match are
//! skipped (listings are wrapped in header and footer lines), and no input
//! is an error.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    // Rows like: "1001/1001  PJSIP/1001  Avail  0 of inf"
    static ref ENDPOINT_ROW: Regex =
        Regex::new(r"^\s*(\w+)/\w+\s+\S+\s+(\w+)").unwrap();
}

/// One registered endpoint from a `pjsip show endpoints` listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub extension: String,
    pub status: String,
}

/// One active channel from a `core show channels concise` listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub channel: String,
    pub context: String,
    pub extension: String,
    pub state: String,
}

/// Extract endpoint rows from free-text tabular output.
///
/// A row is a slash-separated two-token identifier followed by a transport
/// column and a status word; the status is lowercased.
pub fn parse_endpoints(output: &str) -> Vec<EndpointRecord> {
    output
        .lines()
        .filter_map(|line| {
            let caps = ENDPOINT_ROW.captures(line)?;
            Some(EndpointRecord {
                extension: caps[1].to_string(),
                status: caps[2].to_lowercase(),
            })
        })
        .collect()
}

/// Extract channel rows from `!`-delimited concise output.
///
/// Fields 0, 1, 2 and 4 are channel, context, extension and state; lines
/// with fewer than five fields are skipped.
pub fn parse_channels(output: &str) -> Vec<ChannelRecord> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('!').collect();
            if fields.len() < 5 {
                return None;
            }
            Some(ChannelRecord {
                channel: fields[0].to_string(),
                context: fields[1].to_string(),
                extension: fields[2].to_string(),
                state: fields[4].to_string(),
            })
        })
        .collect()
}
