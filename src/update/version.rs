//! Semantic version parsing and precedence.
//!
//! Versions follow `MAJOR.MINOR.PATCH[-PRERELEASE][+BUILD]`. Parsing never
//! fails: a string that does not match degrades to `0.0.0` and logs a
//! warning, so a malformed tag in a release feed can never abort startup.

use std::cmp::Ordering;
use std::fmt;

/// A parsed semantic version.
///
/// `Ord` implements precedence: build metadata is carried for display but
/// never participates in comparison.
#[derive(Debug, Clone, Default)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    /// Dot-separated prerelease identifiers (empty for a release).
    pub prerelease: Vec<String>,
    /// Build metadata, if any.
    pub build: Option<String>,
}

impl Version {
    /// Parse a version string, degrading to `0.0.0` on malformed input.
    pub fn parse(input: &str) -> Self {
        match Self::try_parse(input) {
            Some(v) => v,
            None => {
                tracing::warn!(version = input, "failed to parse version, treating as 0.0.0");
                Self::default()
            }
        }
    }

    /// Strict parse; `None` if the string is not a valid version.
    pub fn try_parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        let s = trimmed.strip_prefix('v').unwrap_or(trimmed);
        if s.is_empty() {
            return None;
        }

        let (rest, build) = match s.split_once('+') {
            Some((rest, build)) => {
                if !is_valid_identifier_list(build) {
                    return None;
                }
                (rest, Some(build.to_owned()))
            }
            None => (s, None),
        };

        let (core, prerelease) = match rest.split_once('-') {
            Some((core, pre)) => {
                if !is_valid_identifier_list(pre) {
                    return None;
                }
                (core, pre.split('.').map(str::to_owned).collect())
            }
            None => (rest, Vec::new()),
        };

        let mut parts = core.split('.');
        let major = parse_numeric(parts.next()?)?;
        let minor = parse_numeric(parts.next()?)?;
        let patch = parse_numeric(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }

        Some(Self {
            major,
            minor,
            patch,
            prerelease,
            build,
        })
    }

    /// Returns `true` for a prerelease (`1.0.0-rc.1`).
    pub fn is_prerelease(&self) -> bool {
        !self.prerelease.is_empty()
    }
}

fn parse_numeric(part: &str) -> Option<u64> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

fn is_valid_identifier_list(s: &str) -> bool {
    !s.is_empty()
        && s.split('.').all(|id| {
            !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        })
}

/// Compare two prerelease identifiers.
///
/// Numeric identifiers compare as integers of any length and always sort
/// below alphanumeric ones.
fn compare_identifier(a: &str, b: &str) -> Ordering {
    let a_num = a.bytes().all(|c| c.is_ascii_digit());
    let b_num = b.bytes().all(|c| c.is_ascii_digit());
    match (a_num, b_num) {
        (true, true) => {
            let a = a.trim_start_matches('0');
            let b = b.trim_start_matches('0');
            a.len().cmp(&b.len()).then_with(|| a.cmp(b))
        }
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.cmp(b),
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let core = (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch));
        if core != Ordering::Equal {
            return core;
        }

        match (self.prerelease.is_empty(), other.prerelease.is_empty()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => {}
        }

        for (a, b) in self.prerelease.iter().zip(&other.prerelease) {
            let ord = compare_identifier(a, b);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        self.prerelease.len().cmp(&other.prerelease.len())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.prerelease.is_empty() {
            write!(f, "-{}", self.prerelease.join("."))?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{build}")?;
        }
        Ok(())
    }
}

/// Compare two version strings by precedence.
pub fn compare(a: &str, b: &str) -> Ordering {
    Version::parse(a).cmp(&Version::parse(b))
}

/// Compare two version strings, returning `-1`, `0`, or `1`.
pub fn compare_versions(a: &str, b: &str) -> i32 {
    match compare(a, b) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

/// Returns `true` if `candidate` has higher precedence than `current`.
pub fn is_newer(current: &str, candidate: &str) -> bool {
    compare(current, candidate) == Ordering::Less
}
