// ABOUTME: Release version strings with prerelease and floating-tag detection.
// ABOUTME: Versions are opaque but restricted to tag-safe characters.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

const MAX_LEN: usize = 128;

/// Tags that move between builds and so do not identify one release.
const FLOATING_TAGS: &[&str] = &["latest", "stable", "edge"];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("version cannot be empty")]
    Empty,

    #[error("version exceeds maximum length of 128 characters")]
    TooLong,

    #[error("version must start with a letter or digit")]
    InvalidStart,

    #[error("invalid character in version: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version(String);

impl Version {
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(VersionError::Empty);
        }
        if input.len() > MAX_LEN {
            return Err(VersionError::TooLong);
        }
        if !input.starts_with(|c: char| c.is_ascii_alphanumeric()) {
            return Err(VersionError::InvalidStart);
        }
        if let Some(c) = input
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '.' | '_' | '+' | '-'))
        {
            return Err(VersionError::InvalidChar(c));
        }
        Ok(Self(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a prerelease such as `1.4.0-rc.1` or `v2.0.0-beta`.
    ///
    /// Only versions with a numeric core qualify; `my-branch` is not a
    /// prerelease, it is just a name with a hyphen.
    pub fn is_prerelease(&self) -> bool {
        let core = self.0.strip_prefix('v').unwrap_or(&self.0);
        let core = core.split('+').next().unwrap_or(core);
        match core.split_once('-') {
            Some((numeric, suffix)) => {
                !suffix.is_empty()
                    && !numeric.is_empty()
                    && numeric
                        .split('.')
                        .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
            }
            None => false,
        }
    }

    /// Whether this names a mutable tag rather than a fixed release.
    pub fn is_floating(&self) -> bool {
        is_floating_tag(&self.0)
    }
}

pub(crate) fn is_floating_tag(tag: &str) -> bool {
    FLOATING_TAGS.iter().any(|t| t.eq_ignore_ascii_case(tag))
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
