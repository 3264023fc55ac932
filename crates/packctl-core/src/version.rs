//! Package version constraints
//!
//! Users pass either an exact version (`1.2.0`) or a semver range
//! (`>=1.2.0, <2.0.0`). A bare version is always an exact match, never the
//! caret range semver would otherwise infer.

use std::fmt;

use semver::{Version, VersionReq};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    Exact(Version),
    Range(VersionReq),
}

impl VersionConstraint {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if let Ok(version) = Version::parse(raw) {
            return Ok(VersionConstraint::Exact(version));
        }
        VersionReq::parse(raw)
            .map(VersionConstraint::Range)
            .map_err(|source| CoreError::InvalidConstraint {
                constraint: raw.to_string(),
                source,
            })
    }

    /// Check a candidate version string; unparseable candidates never match
    pub fn matches(&self, candidate: &str) -> bool {
        let Ok(version) = Version::parse(candidate.trim()) else {
            return false;
        };
        match self {
            VersionConstraint::Exact(expected) => *expected == version,
            VersionConstraint::Range(req) => req.matches(&version),
        }
    }

    /// Highest candidate satisfying the constraint
    pub fn best_match<'a>(&self, candidates: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
        candidates
            .into_iter()
            .filter_map(|c| Version::parse(c.trim()).ok().map(|v| (v, c)))
            .filter(|(v, _)| match self {
                VersionConstraint::Exact(expected) => expected == v,
                VersionConstraint::Range(req) => req.matches(v),
            })
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, c)| c)
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionConstraint::Exact(v) => write!(f, "{}", v),
            VersionConstraint::Range(r) => write!(f, "{}", r),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_version_is_exact() {
        let c = VersionConstraint::parse("1.0.0").unwrap();
        assert!(matches!(c, VersionConstraint::Exact(_)));
        assert!(c.matches("1.0.0"));
        assert!(!c.matches("1.0.1"));
    }

    #[test]
    fn test_range() {
        let c = VersionConstraint::parse(">=1.2.0, <2.0.0").unwrap();
        assert!(c.matches("1.5.3"));
        assert!(!c.matches("2.0.0"));
        assert!(!c.matches("not-a-version"));
    }

    #[test]
    fn test_best_match_picks_highest() {
        let c = VersionConstraint::parse(">1.0.0").unwrap();
        let best = c.best_match(["1.0.0", "1.4.0", "1.2.0", "garbage"]);
        assert_eq!(best, Some("1.4.0"));
    }

    #[test]
    fn test_invalid_constraint() {
        let err = VersionConstraint::parse("~~1").unwrap_err();
        assert!(matches!(err, CoreError::InvalidConstraint { .. }));
    }
}
