use crate::error::{PodupError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A pod version such as `3.0.1`, `4.0.0-beta.2` or `1.0.0.rc1`.
///
/// Numeric release segments compare with zero padding, so `3.0` and `3.0.0`
/// are equal. A prerelease sorts below the release it precedes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    original: String,
    release: Vec<u64>,
    /// Text following the release segments, separator included (`-beta.2`, `.rc1`).
    suffix: String,
}

impl Version {
    pub fn parse(version: &str) -> Result<Self> {
        let trimmed = version.trim();
        if trimmed.is_empty() {
            return Err(PodupError::InvalidVersion(version.to_string()));
        }

        let (release_part, suffix) = match trimmed.find(['-', '+']) {
            Some(idx) => trimmed.split_at(idx),
            None => Self::split_dotted_prerelease(trimmed),
        };

        let release = Self::parse_numeric(release_part)
            .ok_or_else(|| PodupError::InvalidVersion(version.to_string()))?;

        if suffix.len() == 1 {
            // a lone separator, e.g. "1.0-"
            return Err(PodupError::InvalidVersion(version.to_string()));
        }

        Ok(Version {
            original: trimmed.to_string(),
            release,
            suffix: suffix.to_string(),
        })
    }

    /// Gem-style prereleases continue the dotted list: `1.0.0.beta.1`.
    fn split_dotted_prerelease(version: &str) -> (&str, &str) {
        let mut offset = 0;
        for part in version.split('.') {
            if part.is_empty() {
                return (version, "");
            }
            if !part.chars().all(|c| c.is_ascii_digit()) {
                if offset == 0 {
                    return (version, "");
                }
                return version.split_at(offset - 1);
            }
            offset += part.len() + 1;
        }
        (version, "")
    }

    fn parse_numeric(version: &str) -> Option<Vec<u64>> {
        let mut numbers = Vec::new();

        for part in version.split('.') {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            numbers.push(part.parse::<u64>().ok()?);
        }

        if numbers.is_empty() {
            None
        } else {
            Some(numbers)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }

    pub fn release(&self) -> &[u64] {
        &self.release
    }

    pub fn is_prerelease(&self) -> bool {
        !self.suffix.is_empty() && !self.suffix.starts_with('+')
    }

    fn prerelease(&self) -> Option<&str> {
        if self.is_prerelease() {
            Some(&self.suffix[1..])
        } else {
            None
        }
    }

    /// Renders this version with exactly `precision` release segments,
    /// truncating or padding with zeros. The prerelease suffix is kept only
    /// when every release segment survives.
    pub fn to_precision(&self, precision: usize) -> String {
        let precision = precision.max(1);
        let segments: Vec<String> = (0..precision)
            .map(|idx| self.release.get(idx).copied().unwrap_or(0).to_string())
            .collect();

        let mut rendered = segments.join(".");
        if precision >= self.release.len() && self.is_prerelease() {
            rendered.push_str(&self.suffix);
        }
        rendered
    }

    /// Like [`Version::to_precision`] but with the last kept segment incremented,
    /// which gives the exclusive upper bound one step above this version.
    /// `None` when that segment is already `u64::MAX`.
    pub fn bump_at_precision(&self, precision: usize) -> Option<String> {
        let precision = precision.max(1);
        let mut segments: Vec<u64> = (0..precision)
            .map(|idx| self.release.get(idx).copied().unwrap_or(0))
            .collect();
        if let Some(last) = segments.last_mut() {
            *last = last.checked_add(1)?;
        }
        Some(
            segments
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join("."),
        )
    }

    fn trimmed_release(&self) -> &[u64] {
        let len = self
            .release
            .iter()
            .rposition(|segment| *segment != 0)
            .map_or(0, |idx| idx + 1);
        &self.release[..len]
    }

    fn compare_prerelease(a: &str, b: &str) -> Ordering {
        match (semver::Prerelease::new(a), semver::Prerelease::new(b)) {
            (Ok(a), Ok(b)) => a.cmp(&b),
            _ => a.cmp(b),
        }
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.trimmed_release().hash(state);
        self.prerelease().hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.release.len().max(other.release.len());
        for idx in 0..len {
            let a = self.release.get(idx).copied().unwrap_or(0);
            let b = other.release.get(idx).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }

        match (self.prerelease(), other.prerelease()) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => Self::compare_prerelease(a, b),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl FromStr for Version {
    type Err = PodupError;

    fn from_str(s: &str) -> Result<Self> {
        Version::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = PodupError;

    fn try_from(value: String) -> Result<Self> {
        Version::parse(&value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.original
    }
}

pub struct VersionComparator;

impl VersionComparator {
    /// Parses raw version strings, drops the unparseable ones and returns the
    /// rest newest first without duplicates.
    pub fn newest_first<I, S>(versions: I) -> Vec<Version>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed: Vec<Version> = versions
            .into_iter()
            .filter_map(|raw| match Version::parse(raw.as_ref()) {
                Ok(version) => Some(version),
                Err(_) => {
                    tracing::debug!("Skipping unparseable version '{}'", raw.as_ref());
                    None
                }
            })
            .collect();

        parsed.sort_by(|a, b| b.cmp(a));
        parsed.dedup();
        parsed
    }

    /// Check if version `a` is newer than version `b`
    pub fn is_newer(a: &Version, b: &Version) -> bool {
        a > b
    }
}
