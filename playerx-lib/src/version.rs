use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

static SEGMENT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d+)").unwrap());

/// A dot-separated numeric version such as `1.2.10`.
///
/// Parsing never fails: segments that do not start with digits count as `0`,
/// and a trailing run of missing segments compares equal to zeros, so
/// `1.0` and `1.0.0` are the same version.
#[derive(Debug, Clone)]
pub struct DottedVersion {
    raw: String,
    segments: Vec<u64>,
}

impl DottedVersion {
    pub fn parse(version_str: &str) -> Self {
        let trimmed = version_str.trim();
        let body = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        let segments = body.split('.').map(parse_segment).collect();
        Self {
            raw: trimmed.to_string(),
            segments,
        }
    }

    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    pub fn is_newer_than(&self, other: &DottedVersion) -> bool {
        self > other
    }
}

fn parse_segment(segment: &str) -> u64 {
    SEGMENT_REGEX
        .captures(segment)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Compares two version strings segment by segment.
///
/// Returns `1` if `a` is newer, `-1` if `b` is newer and `0` otherwise.
pub fn compare(a: &str, b: &str) -> i32 {
    match DottedVersion::parse(a).cmp(&DottedVersion::parse(b)) {
        Ordering::Greater => 1,
        Ordering::Less => -1,
        Ordering::Equal => 0,
    }
}

impl Ord for DottedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        (0..len)
            .map(|i| {
                let x = self.segments.get(i).copied().unwrap_or(0);
                let y = other.segments.get(i).copied().unwrap_or(0);
                x.cmp(&y)
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for DottedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DottedVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for DottedVersion {}

impl FromStr for DottedVersion {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for DottedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}
