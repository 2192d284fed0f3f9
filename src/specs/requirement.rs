use crate::error::{PodupError, Result};
use crate::specs::version::Version;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static CONSTRAINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(~>|>=|<=|!=|=|>|<)?\s*([0-9A-Za-z][0-9A-Za-z.+\-]*)\s*$")
        .expect("constraint pattern is valid")
});

/// Operator class of a single constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `~> 3.0`: at least the written version, below the next release at one
    /// segment less precision.
    Pessimistic,
    /// `= 3.0.0` or a bare `3.0.0`
    Exact,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

impl Operator {
    fn from_symbol(symbol: Option<&str>) -> Operator {
        match symbol {
            Some("~>") => Operator::Pessimistic,
            Some(">=") => Operator::GreaterOrEqual,
            Some("<=") => Operator::LessOrEqual,
            Some("!=") => Operator::NotEqual,
            Some(">") => Operator::Greater,
            Some("<") => Operator::Less,
            _ => Operator::Exact,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Pessimistic => "~>",
            Operator::Exact => "=",
            Operator::NotEqual => "!=",
            Operator::Greater => ">",
            Operator::GreaterOrEqual => ">=",
            Operator::Less => "<",
            Operator::LessOrEqual => "<=",
        }
    }

    /// Whether the operator can keep a pod from moving to a newer release.
    /// `!=`, `>` and `>=` only ever exclude or set a floor.
    pub fn limits_upgrades(&self) -> bool {
        matches!(
            self,
            Operator::Pessimistic | Operator::Exact | Operator::Less | Operator::LessOrEqual
        )
    }
}

/// One `operator version` pair, e.g. `~> 3.0.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub operator: Operator,
    pub version: Version,
    /// Whether the operator was written out; a bare `3.0.0` is an implicit `=`.
    pub explicit_operator: bool,
}

impl Constraint {
    pub fn parse(text: &str) -> Result<Self> {
        let caps = CONSTRAINT_RE
            .captures(text)
            .ok_or_else(|| PodupError::invalid_requirement(text, "expected '<operator> <version>'"))?;

        let symbol = caps.get(1).map(|m| m.as_str());
        let version = Version::parse(&caps[2])
            .map_err(|_| PodupError::invalid_requirement(text, "version is not numeric"))?;

        Ok(Constraint {
            operator: Operator::from_symbol(symbol),
            version,
            explicit_operator: symbol.is_some(),
        })
    }

    /// Number of release segments written in the constraint (`~> 3.0` has two).
    pub fn precision(&self) -> usize {
        self.version.release().len()
    }

    pub fn satisfied_by(&self, candidate: &Version) -> bool {
        match self.operator {
            Operator::Exact => candidate == &self.version,
            Operator::NotEqual => candidate != &self.version,
            Operator::Greater => candidate > &self.version,
            Operator::GreaterOrEqual => candidate >= &self.version,
            Operator::Less => candidate < &self.version,
            Operator::LessOrEqual => candidate <= &self.version,
            Operator::Pessimistic => {
                candidate >= &self.version
                    && self
                        .pessimistic_upper_bound()
                        .is_none_or(|bound| candidate < &bound)
            }
        }
    }

    /// `~> 1.2.3` allows up to (excluding) `1.3`, `~> 1.2` up to `2`,
    /// and `~> 1` up to `2`. `None` when the bound does not fit in a segment.
    fn pessimistic_upper_bound(&self) -> Option<Version> {
        let release = self.version.release();
        let keep = if release.len() > 1 {
            release.len() - 1
        } else {
            1
        };
        let bound = self.version.bump_at_precision(keep)?;
        Version::parse(&bound).ok()
    }

    /// Renders the constraint with a replacement version text, keeping the
    /// operator exactly as it was written.
    pub fn render_with(&self, version_text: &str) -> String {
        if self.explicit_operator {
            format!("{} {}", self.operator.symbol(), version_text)
        } else {
            version_text.to_string()
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_with(self.version.as_str()))
    }
}

/// A full requirement string: zero or more comma separated constraints that
/// must all hold. An empty requirement accepts every version.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionRequirement {
    constraints: Vec<Constraint>,
}

impl VersionRequirement {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Self::any());
        }

        let constraints = trimmed
            .split(',')
            .map(Constraint::parse)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { constraints })
    }

    /// Parses an optional requirement; `None` means unconstrained.
    pub fn parse_optional(text: Option<&str>) -> Result<Self> {
        match text {
            Some(text) => Self::parse(text),
            None => Ok(Self::any()),
        }
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn is_unconstrained(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn satisfied_by(&self, candidate: &Version) -> bool {
        self.constraints.iter().all(|c| c.satisfied_by(candidate))
    }
}

impl fmt::Display for VersionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.constraints.iter().map(|c| c.to_string()).collect();
        f.write_str(&rendered.join(", "))
    }
}
