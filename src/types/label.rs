// ABOUTME: DNS-compatible label names for applications and environments.
// ABOUTME: Both follow RFC 1123 label rules so they are safe in paths and env vars.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LabelError {
    #[error("{0} name cannot be empty")]
    Empty(&'static str),

    #[error("{0} name exceeds maximum length of 63 characters")]
    TooLong(&'static str),

    #[error("{0} name cannot start with a hyphen")]
    StartsWithHyphen(&'static str),

    #[error("{0} name cannot end with a hyphen")]
    EndsWithHyphen(&'static str),

    #[error("{0} name must be lowercase")]
    NotLowercase(&'static str),

    #[error("invalid character in {0} name: '{1}'")]
    InvalidChar(&'static str, char),
}

fn check_label(value: &str, what: &'static str) -> Result<(), LabelError> {
    if value.is_empty() {
        return Err(LabelError::Empty(what));
    }
    if value.len() > 63 {
        return Err(LabelError::TooLong(what));
    }
    if value.starts_with('-') {
        return Err(LabelError::StartsWithHyphen(what));
    }
    if value.ends_with('-') {
        return Err(LabelError::EndsWithHyphen(what));
    }
    for c in value.chars() {
        if c.is_ascii_uppercase() {
            return Err(LabelError::NotLowercase(what));
        }
        if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
            return Err(LabelError::InvalidChar(what, c));
        }
    }
    Ok(())
}

macro_rules! label_type {
    ($(#[$meta:meta])* $name:ident, $what:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: &str) -> Result<Self, LabelError> {
                check_label(value, $what)?;
                Ok(Self(value.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = LabelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                self.0.serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::new(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

label_type!(
    /// Name of the application being deployed.
    AppName,
    "application"
);

label_type!(
    /// Name of one environment in the promotion chain.
    EnvironmentName,
    "environment"
);
