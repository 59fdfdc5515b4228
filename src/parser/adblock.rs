//! Parser for the Adblock filter-list format.
//!
//! ```text
//! [Adblock Plus 2.0]
//! ! Title: Example list
//! ! Expires: 4 days
//! ! Homepage: https://example.com/
//! ||ads.example^
//! ```
//!
//! The first line must contain `[Adblock`, optionally followed by `Plus` and
//! a dotted minimum version, closed by `]`. Lines of the form `! key: value`
//! are metadata; every other non-empty line is a filter.

use std::collections::HashMap;

use tracing::{debug, instrument};

use super::{ListParser, ParseError, ParsedList};

const HEADER_START: &str = "[Adblock";
const HEADER_PLUS: &str = "Plus";
const BYTE_ORDER_MARK: char = '\u{feff}';

const SECS_PER_HOUR: u64 = 60 * 60;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;

/// Parser for `[Adblock]` filter lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdblockParser;

impl ListParser for AdblockParser {
    #[instrument(level = "debug", skip(self, text), fields(len = text.len()))]
    fn parse(&self, text: &str) -> Result<ParsedList, ParseError> {
        let text = text.strip_prefix(BYTE_ORDER_MARK).unwrap_or(text);
        let mut lines = text.split(['\r', '\n']);

        let first_line = lines.next().unwrap_or_default();
        let required_version = parse_header(first_line)?;

        let mut params = HashMap::new();
        let mut filters = Vec::new();
        for line in lines.filter(|line| !line.is_empty()) {
            match parse_param(line) {
                Some((key, value)) => {
                    params.insert(key, value.to_string());
                }
                None => filters.push(line.to_string()),
            }
        }

        let expiration_secs = params.get("expires").map_or(0, |v| parse_expires(v));
        debug!(
            filters = filters.len(),
            params = params.len(),
            expiration_secs,
            "parsed list"
        );

        Ok(ParsedList::new(
            required_version,
            params,
            filters,
            expiration_secs,
        ))
    }
}

/// Validates the header line and extracts the minimum version, if any.
fn parse_header(line: &str) -> Result<Option<String>, ParseError> {
    let Some(start) = line.find(HEADER_START) else {
        return Err(ParseError::invalid_header(line));
    };

    let mut rest = line[start + HEADER_START.len()..].trim_start();
    if let Some(after_plus) = rest.strip_prefix(HEADER_PLUS) {
        rest = after_plus.trim_start();
    }

    let version_len = rest
        .find(|c: char| c != '.' && !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let (version, tail) = rest.split_at(version_len);
    if !tail.starts_with(']') {
        return Err(ParseError::invalid_header(line));
    }

    Ok((!version.is_empty()).then(|| version.to_string()))
}

/// Splits a `! key: value` line into a lower-cased key and its value.
fn parse_param(line: &str) -> Option<(String, &str)> {
    let (key, value) = line.strip_prefix('!')?.split_once(':')?;
    let key = key.trim();
    let value = value.trim();
    if key.is_empty() || value.is_empty() {
        return None;
    }
    Some((key.to_lowercase(), value))
}

/// Parses `N days` / `N hours` into seconds; anything unparsable or overflowing is `0`.
///
/// The unit is hours when the first non-space character after the number is
/// `h`, days otherwise.
fn parse_expires(value: &str) -> u64 {
    let value = value.trim_start();
    let digits_len = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(digits_len);

    let Ok(count) = digits.parse::<u64>() else {
        return 0;
    };
    let unit_secs = if unit.trim_start().starts_with('h') {
        SECS_PER_HOUR
    } else {
        SECS_PER_DAY
    };
    count.checked_mul(unit_secs).unwrap_or(0)
}
