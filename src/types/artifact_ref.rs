// ABOUTME: Artifact references: container images and archived build outputs.
// ABOUTME: Parses `[registry/]repo[:tag][@digest]` and `archive:<location>[#sha256=<hex>]`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use super::version::{Version, is_floating_tag};

const ARCHIVE_PREFIX: &str = "archive:";
const IMAGE_PREFIX: &str = "image:";
const SHA256_FRAGMENT: &str = "#sha256=";
const DIGEST_ALGORITHM: &str = "sha256:";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseArtifactError {
    #[error("artifact reference cannot be empty")]
    Empty,

    #[error("invalid character in artifact reference: {0}")]
    InvalidChar(char),

    #[error("invalid artifact reference format: {0}")]
    InvalidFormat(String),

    #[error("invalid sha256 checksum: {0}")]
    InvalidChecksum(String),
}

/// What kind of thing an artifact reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Image,
    Archive,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Image => write!(f, "image"),
            ArtifactKind::Archive => write!(f, "archive"),
        }
    }
}

/// A deployable artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactRef {
    /// A container image in a registry.
    Image {
        registry: Option<String>,
        repository: String,
        tag: Option<String>,
        digest: Option<String>,
    },
    /// A build output (jar, tarball) at a path or URL, optionally pinned by checksum.
    Archive {
        location: String,
        sha256: Option<String>,
    },
}

impl ArtifactRef {
    pub fn parse(input: &str) -> Result<Self, ParseArtifactError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseArtifactError::Empty);
        }

        if let Some(rest) = input.strip_prefix(ARCHIVE_PREFIX) {
            return Self::parse_archive(rest);
        }
        let image = input.strip_prefix(IMAGE_PREFIX).unwrap_or(input);
        Self::parse_image(image)
    }

    /// Render a `{version}` template into an artifact reference.
    pub fn render_template(template: &str, version: &Version) -> Result<Self, ParseArtifactError> {
        Self::parse(&template.replace("{version}", version.as_str()))
    }

    fn parse_archive(input: &str) -> Result<Self, ParseArtifactError> {
        let (location, sha256) = match input.split_once(SHA256_FRAGMENT) {
            Some((location, sum)) => (location, Some(parse_sha256(sum)?)),
            None => (input, None),
        };

        if location.is_empty() {
            return Err(ParseArtifactError::InvalidFormat(format!(
                "{ARCHIVE_PREFIX}{input}"
            )));
        }
        if let Some(c) = location.chars().find(|c| c.is_whitespace()) {
            return Err(ParseArtifactError::InvalidChar(c));
        }

        Ok(ArtifactRef::Archive {
            location: location.to_string(),
            sha256,
        })
    }

    fn parse_image(input: &str) -> Result<Self, ParseArtifactError> {
        if let Some(c) = input
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '/' | ':' | '.' | '-' | '_' | '@'))
        {
            return Err(ParseArtifactError::InvalidChar(c));
        }

        let (without_digest, digest) = match input.split_once('@') {
            Some((before, after)) => {
                let Some(sum) = after.strip_prefix(DIGEST_ALGORITHM) else {
                    return Err(ParseArtifactError::InvalidFormat(input.to_string()));
                };
                (before, Some(format!("{DIGEST_ALGORITHM}{}", parse_sha256(sum)?)))
            }
            None => (input, None),
        };

        // A colon followed by a slash belongs to a registry port, not a tag.
        let (without_tag, tag) = match without_digest.rsplit_once(':') {
            Some((before, after)) if !after.contains('/') => {
                if after.is_empty() {
                    return Err(ParseArtifactError::InvalidFormat(input.to_string()));
                }
                (before, Some(after.to_string()))
            }
            _ => (without_digest, None),
        };

        let (registry, repository) = match without_tag.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (Some(first.to_string()), rest.to_string())
            }
            _ => (None, without_tag.to_string()),
        };

        if repository.is_empty()
            || repository.starts_with('/')
            || repository.ends_with('/')
            || repository.contains("//")
        {
            return Err(ParseArtifactError::InvalidFormat(input.to_string()));
        }

        let tag = match (&tag, &digest) {
            (None, None) => Some("latest".to_string()),
            _ => tag,
        };

        Ok(ArtifactRef::Image {
            registry,
            repository,
            tag,
            digest,
        })
    }

    pub fn kind(&self) -> ArtifactKind {
        match self {
            ArtifactRef::Image { .. } => ArtifactKind::Image,
            ArtifactRef::Archive { .. } => ArtifactKind::Archive,
        }
    }

    /// Content digest pinning this artifact, if any.
    pub fn digest(&self) -> Option<&str> {
        match self {
            ArtifactRef::Image { digest, .. } => digest.as_deref(),
            ArtifactRef::Archive { sha256, .. } => sha256.as_deref(),
        }
    }

    /// Image tag; archives have none.
    pub fn tag(&self) -> Option<&str> {
        match self {
            ArtifactRef::Image { tag, .. } => tag.as_deref(),
            ArtifactRef::Archive { .. } => None,
        }
    }

    /// Whether the reference can resolve to different content over time.
    ///
    /// Digests pin content regardless of the tag.
    pub fn is_floating(&self) -> bool {
        self.digest().is_none() && self.tag().is_some_and(is_floating_tag)
    }
}

/// 64 hex digits, normalized to lowercase.
fn parse_sha256(sum: &str) -> Result<String, ParseArtifactError> {
    if sum.len() != 64 || !sum.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ParseArtifactError::InvalidChecksum(sum.to_string()));
    }
    Ok(sum.to_ascii_lowercase())
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactRef::Image {
                registry,
                repository,
                tag,
                digest,
            } => {
                if let Some(registry) = registry {
                    write!(f, "{registry}/")?;
                }
                write!(f, "{repository}")?;
                if let Some(tag) = tag {
                    write!(f, ":{tag}")?;
                }
                if let Some(digest) = digest {
                    write!(f, "@{digest}")?;
                }
                Ok(())
            }
            ArtifactRef::Archive { location, sha256 } => {
                write!(f, "{ARCHIVE_PREFIX}{location}")?;
                if let Some(sum) = sha256 {
                    write!(f, "{SHA256_FRAGMENT}{sum}")?;
                }
                Ok(())
            }
        }
    }
}

impl Serialize for ArtifactRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ArtifactRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ArtifactRef::parse(&s).map_err(serde::de::Error::custom)
    }
}
