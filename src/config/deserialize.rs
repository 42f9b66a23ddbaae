// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: The environment chain must be non-empty with unique names.

use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::HashSet;

use super::EnvironmentConfig;

pub fn deserialize_environments<'de, D>(
    deserializer: D,
) -> Result<NonEmpty<EnvironmentConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let environments: Vec<EnvironmentConfig> = Vec::deserialize(deserializer)?;

    let mut seen = HashSet::new();
    for env in &environments {
        if !seen.insert(env.name.as_str()) {
            return Err(serde::de::Error::custom(format!(
                "duplicate environment: {}",
                env.name
            )));
        }
    }

    NonEmpty::from_vec(environments)
        .ok_or_else(|| serde::de::Error::custom("at least one environment is required"))
}
