//! HTTP content negotiation over `Accept` and `Accept-Encoding`.
//!
//! # Responsibilities
//! - Parse quality-valued preference lists once per request
//! - Pick the best candidate media type or content coding
//!
//! # Ranking
//! For every candidate the best matching preference entry is chosen by
//! specificity, then quality, then entry position. Candidates with a
//! non-zero quality are then ordered by quality, specificity, entry position
//! and finally their own position in the candidate list.

use std::cmp::Ordering;

use crate::error::{Result, TransportError};
use crate::http::mime;

/// Value assumed for a missing or empty `Accept` header.
pub const DEFAULT_ACCEPT: &str = "*/*";

/// Value assumed for a missing or empty `Accept-Encoding` header.
pub const DEFAULT_ACCEPT_ENCODING: &str = "identity";

/// One entry of an `Accept` header.
#[derive(Debug, Clone, PartialEq)]
struct MediaRange {
    kind: String,
    subtype: String,
    params: Vec<(String, String)>,
    q: f32,
    index: usize,
}

/// One entry of an `Accept-Encoding` header.
#[derive(Debug, Clone, PartialEq)]
struct EncodingRange {
    coding: String,
    q: f32,
    index: usize,
}

/// How well one candidate is matched by the preference list.
#[derive(Debug, Clone, Copy)]
struct Priority {
    /// Position of the candidate in the caller's list.
    candidate: usize,
    /// Position of the matching entry in the header, `-1` when nothing matched.
    order: isize,
    q: f32,
    specificity: u8,
}

impl Priority {
    fn unmatched(candidate: usize) -> Self {
        Self {
            candidate,
            order: -1,
            q: 0.0,
            specificity: 0,
        }
    }

    /// Whether `other` is a better match for the same candidate.
    fn improved_by(&self, other: &Priority) -> bool {
        other
            .specificity
            .cmp(&self.specificity)
            .then(other.q.partial_cmp(&self.q).unwrap_or(Ordering::Equal))
            .then(other.order.cmp(&self.order))
            == Ordering::Greater
    }

    fn rank(a: &Priority, b: &Priority) -> Ordering {
        b.q.partial_cmp(&a.q)
            .unwrap_or(Ordering::Equal)
            .then(b.specificity.cmp(&a.specificity))
            .then(a.order.cmp(&b.order))
            .then(a.candidate.cmp(&b.candidate))
    }
}

/// Parsed preference lists for a single request.
#[derive(Debug, Clone)]
pub struct Negotiator {
    media_ranges: Vec<MediaRange>,
    encodings: Vec<EncodingRange>,
}

impl Negotiator {
    /// Parse the raw header values. Empty values fall back to the defaults.
    pub fn new(accept: Option<&str>, accept_encoding: Option<&str>) -> Self {
        let accept = accept
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(DEFAULT_ACCEPT);
        let accept_encoding = accept_encoding
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(DEFAULT_ACCEPT_ENCODING);

        Self {
            media_ranges: parse_accept(accept),
            encodings: parse_accept_encoding(accept_encoding),
        }
    }

    /// Best candidate for the `Accept` header, if any is acceptable.
    ///
    /// Candidates without a `/` are expanded through the mime table first,
    /// and the expanded form is what gets returned.
    pub fn preferred_media_type<'a>(&self, candidates: &[&'a str]) -> Result<Option<&'a str>> {
        let normalized = candidates
            .iter()
            .map(|&c| validate_candidate("types", c).map(|_| mime::normalize(c)))
            .collect::<Result<Vec<_>>>()?;

        let best = normalized
            .iter()
            .enumerate()
            .map(|(i, candidate)| self.media_priority(candidate, i))
            .filter(|p| p.q > 0.0)
            .min_by(Priority::rank);

        Ok(best.map(|p| normalized[p.candidate]))
    }

    /// Every acceptable media range in preference order.
    pub fn preferred_media_types(&self) -> Vec<String> {
        let mut ranges: Vec<&MediaRange> = self.media_ranges.iter().filter(|r| r.q > 0.0).collect();
        ranges.sort_by(|a, b| {
            b.q.partial_cmp(&a.q)
                .unwrap_or(Ordering::Equal)
                .then(a.index.cmp(&b.index))
        });
        ranges
            .into_iter()
            .map(|r| format!("{}/{}", r.kind, r.subtype))
            .collect()
    }

    /// Best candidate for the `Accept-Encoding` header, if any is acceptable.
    pub fn preferred_encoding<'a>(&self, candidates: &[&'a str]) -> Result<Option<&'a str>> {
        for candidate in candidates {
            validate_candidate("types", candidate)?;
        }

        let best = candidates
            .iter()
            .enumerate()
            .map(|(i, candidate)| self.encoding_priority(candidate, i))
            .filter(|p| p.q > 0.0)
            .min_by(Priority::rank);

        Ok(best.map(|p| candidates[p.candidate]))
    }

    /// Every acceptable content coding in preference order.
    pub fn preferred_encodings(&self) -> Vec<String> {
        let mut codings: Vec<&EncodingRange> = self.encodings.iter().filter(|e| e.q > 0.0).collect();
        codings.sort_by(|a, b| {
            b.q.partial_cmp(&a.q)
                .unwrap_or(Ordering::Equal)
                .then(a.index.cmp(&b.index))
        });
        codings.into_iter().map(|e| e.coding.clone()).collect()
    }

    fn media_priority(&self, candidate: &str, position: usize) -> Priority {
        let mut priority = Priority::unmatched(position);
        let Some(parsed) = parse_media_range(candidate, 0) else {
            return priority;
        };

        for range in &self.media_ranges {
            if let Some(specificity) = specify_media(&parsed, range) {
                let matched = Priority {
                    candidate: position,
                    order: range.index as isize,
                    q: range.q,
                    specificity,
                };
                if priority.improved_by(&matched) {
                    priority = matched;
                }
            }
        }
        priority
    }

    fn encoding_priority(&self, candidate: &str, position: usize) -> Priority {
        let mut priority = Priority::unmatched(position);

        for range in &self.encodings {
            if let Some(specificity) = specify_encoding(candidate, range) {
                let matched = Priority {
                    candidate: position,
                    order: range.index as isize,
                    q: range.q,
                    specificity,
                };
                if priority.improved_by(&matched) {
                    priority = matched;
                }
            }
        }
        priority
    }
}

fn validate_candidate(argument: &'static str, candidate: &str) -> Result<()> {
    if candidate.trim().is_empty() {
        return Err(TransportError::invalid_argument(argument, "empty candidate"));
    }
    if candidate.contains(',')
        || candidate.chars().any(|c| c.is_control())
        || candidate.trim().chars().any(char::is_whitespace)
    {
        return Err(TransportError::invalid_argument(
            argument,
            format!("`{}` is not a single media type or coding", candidate.escape_debug()),
        ));
    }
    Ok(())
}

fn specify_media(candidate: &MediaRange, range: &MediaRange) -> Option<u8> {
    let mut specificity = 0;

    if range.kind.eq_ignore_ascii_case(&candidate.kind) {
        specificity |= 4;
    } else if range.kind != "*" {
        return None;
    }

    if range.subtype.eq_ignore_ascii_case(&candidate.subtype) {
        specificity |= 2;
    } else if range.subtype != "*" {
        return None;
    }

    if !range.params.is_empty() {
        let all_match = range.params.iter().all(|(key, value)| {
            value == "*"
                || candidate
                    .params
                    .iter()
                    .any(|(k, v)| k == key && v.eq_ignore_ascii_case(value))
        });
        if !all_match {
            return None;
        }
        specificity |= 1;
    }

    Some(specificity)
}

fn specify_encoding(candidate: &str, range: &EncodingRange) -> Option<u8> {
    if range.coding.eq_ignore_ascii_case(candidate) {
        Some(1)
    } else if range.coding == "*" {
        Some(0)
    } else {
        None
    }
}

fn parse_accept(value: &str) -> Vec<MediaRange> {
    split_unquoted(value, ',')
        .into_iter()
        .filter_map(|entry| parse_media_range(entry, 0))
        .enumerate()
        .map(|(index, range)| MediaRange { index, ..range })
        .collect()
}

/// Parse `type/subtype;key=value;q=0.5`. Parameters after `q` are extensions
/// and are dropped.
fn parse_media_range(entry: &str, index: usize) -> Option<MediaRange> {
    let mut parts = split_unquoted(entry, ';').into_iter();
    let essence = parts.next()?.trim();
    let (kind, subtype) = essence.split_once('/')?;
    if kind.is_empty()
        || subtype.is_empty()
        || subtype.contains('/')
        || essence.chars().any(char::is_whitespace)
    {
        return None;
    }

    let mut params = Vec::new();
    let mut q = 1.0;
    for param in parts {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = unquote(value.trim());
        if key == "q" {
            q = parse_quality(&value);
            break;
        }
        params.push((key, value));
    }

    Some(MediaRange {
        kind: kind.to_string(),
        subtype: subtype.to_string(),
        params,
        q,
        index,
    })
}

fn parse_accept_encoding(value: &str) -> Vec<EncodingRange> {
    let mut encodings: Vec<EncodingRange> = Vec::new();
    let mut has_identity = false;
    let mut min_quality: f32 = 1.0;

    for entry in value.split(',') {
        let mut parts = entry.split(';');
        let coding = parts.next().unwrap_or_default().trim();
        if coding.is_empty() {
            continue;
        }

        let q = parts
            .filter_map(|p| p.split_once('='))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("q"))
            .map(|(_, v)| parse_quality(v.trim()))
            .unwrap_or(1.0);

        let range = EncodingRange {
            coding: coding.to_string(),
            q,
            index: encodings.len(),
        };
        if specify_encoding("identity", &range).is_some() {
            has_identity = true;
        }
        min_quality = min_quality.min(if q > 0.0 { q } else { 1.0 });
        encodings.push(range);
    }

    // identity is acceptable unless explicitly refused
    if !has_identity {
        encodings.push(EncodingRange {
            coding: "identity".to_string(),
            q: min_quality,
            index: encodings.len(),
        });
    }

    encodings
}

/// An unparseable quality refuses the entry; only an absent `q` means 1.
fn parse_quality(value: &str) -> f32 {
    value
        .parse::<f32>()
        .ok()
        .filter(|q| q.is_finite())
        .map(|q| q.clamp(0.0, 1.0))
        .unwrap_or(0.0)
}

fn unquote(value: &str) -> String {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .map(|v| v.replace("\\\"", "\""))
        .unwrap_or_else(|| value.to_string())
}

/// Split on `separator`, ignoring separators inside double quotes.
fn split_unquoted(value: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (idx, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == separator && !in_quotes => {
                parts.push(&value[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);
    parts
}
