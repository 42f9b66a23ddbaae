// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Names, versions, and artifact references are checked once at the edge.

mod artifact_ref;
mod id;
mod label;
mod version;

pub use artifact_ref::{ArtifactKind, ArtifactRef, ParseArtifactError};
pub use id::{DeploymentId, EventId, Id};
pub use label::{AppName, EnvironmentName, LabelError};
pub use version::{Version, VersionError};
