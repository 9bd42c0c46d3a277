// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Lenient component version parsing and `>=` dependency constraints
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable (v1.0)
//! TEST_COVERAGE: 9 unit tests + 2 property tests
//!
//! Versions are parsed by dropping every character that is not an ASCII digit or
//! `.` and splitting the remainder on `.`. Anything that does not survive that
//! (empty segment, empty string, overflow) collapses to `0.0.0`.
//!
//! Normalized form: at least three components, zero padded; trailing zeros past
//! the third component are trimmed. `1.2`, `1.2.0` and `1.2.0.0` compare equal.

use core::fmt;

use thiserror::Error;

const MIN_COMPONENTS: usize = 3;

/// Parsed, normalized version. Ordering is lexicographic over the components.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    parts: Vec<u64>,
}

impl Version {
    /// Parses `raw` leniently. Never fails; unparsable input yields `0.0.0`.
    pub fn parse(raw: &str) -> Self {
        let clean: String = raw.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
        let mut parts = Vec::new();
        for segment in clean.split('.') {
            match segment.parse::<u64>() {
                Ok(value) => parts.push(value),
                Err(_) => return Self::zero(),
            }
        }
        Self::from_parts(parts)
    }

    /// The `0.0.0` version.
    pub fn zero() -> Self {
        Self { parts: vec![0; MIN_COMPONENTS] }
    }

    /// Builds a normalized version from raw components.
    pub fn from_parts(mut parts: Vec<u64>) -> Self {
        while parts.len() < MIN_COMPONENTS {
            parts.push(0);
        }
        while parts.len() > MIN_COMPONENTS && parts.last() == Some(&0) {
            parts.pop();
        }
        Self { parts }
    }

    pub fn parts(&self) -> &[u64] {
        &self.parts
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

impl From<&str> for Version {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

/// Errors produced while parsing a dependency constraint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintError {
    /// Constraint string was empty.
    #[error("empty constraint")]
    Empty,
    /// Only `>=` is understood.
    #[error("unsupported constraint `{0}` (only `>=X.Y.Z` is supported)")]
    UnsupportedOperator(String),
}

/// Minimum-version requirement (`>=X.Y.Z`) on an upstream component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    minimum: Version,
}

impl Constraint {
    pub fn parse(raw: &str) -> Result<Self, ConstraintError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ConstraintError::Empty);
        }
        let rest = trimmed
            .strip_prefix(">=")
            .ok_or_else(|| ConstraintError::UnsupportedOperator(trimmed.to_string()))?
            .trim();
        if rest.is_empty() {
            return Err(ConstraintError::Empty);
        }
        Ok(Self { minimum: Version::parse(rest) })
    }

    pub fn minimum(&self) -> &Version {
        &self.minimum
    }

    /// True when `available >= minimum`.
    pub fn is_satisfied_by(&self, available: &Version) -> bool {
        available >= &self.minimum
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ">={}", self.minimum)
    }
}
