//! Semantic versions and `"name version"` table identifiers.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Returns true if `name` can be used as a table, column or parameter name.
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// A `major.minor.patch` version.
///
/// Ordering compares components numerically, major first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    /// Creates a version from its components.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for Version {
    type Err = SchemaError;

    /// Parses `1.2.3`. A single leading `v` is accepted (`v1.2.3`).
    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix('v').unwrap_or(s);
        let parts: Vec<&str> = digits.split('.').collect();
        if parts.len() != 3 {
            return Err(SchemaError::malformed(format!(
                "version '{s}' must have the form major.minor.patch"
            )));
        }

        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(SchemaError::malformed(format!(
                    "version '{s}' contains a non-numeric component '{part}'"
                )));
            }
            *slot = part.parse().map_err(|_| {
                SchemaError::malformed(format!("version component '{part}' is out of range"))
            })?;
        }

        Ok(Self::new(numbers[0], numbers[1], numbers[2]))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl TryFrom<String> for Version {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

/// Identity of a table version: `(name, version)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableId {
    pub name: String,
    pub version: Version,
}

impl TableId {
    /// Creates a table identifier, validating the name.
    pub fn new(name: impl Into<String>, version: Version) -> Result<Self> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(SchemaError::malformed(format!(
                "table name '{name}' is not a valid identifier"
            )));
        }
        Ok(Self { name, version })
    }

    /// Name of the physical table holding this version, e.g. `user_v0_1_0`.
    #[must_use]
    pub fn physical_name(&self) -> String {
        format!(
            "{}_v{}_{}_{}",
            self.name, self.version.major, self.version.minor, self.version.patch
        )
    }
}

impl FromStr for TableId {
    type Err = SchemaError;

    /// Parses `"<name> <version>"`. The name ends at the first space; the
    /// rest, trimmed, is the version.
    fn from_str(s: &str) -> Result<Self> {
        let (name, version) = s.split_once(' ').ok_or_else(|| {
            SchemaError::malformed(format!(
                "'{s}' is not of the form \"<name> <version>\""
            ))
        })?;
        Self::new(name, version.trim().parse()?)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}
