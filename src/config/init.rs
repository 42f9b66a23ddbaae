// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates shipwright.yml with a dev, staging, production chain.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::AppName;

use super::{CONFIG_FILENAME, Config};

pub(crate) const DEFAULT_APPLICATION: &str = "my-app";
pub(crate) const DEFAULT_ARTIFACT: &str = "my-registry/my-app:{version}";

pub fn init_config(
    dir: &Path,
    application: Option<&str>,
    artifact: Option<&str>,
    force: bool,
) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let application = match application {
        Some(a) => AppName::new(a).map_err(|e| Error::InvalidConfig(e.to_string()))?,
        None => AppName::new(DEFAULT_APPLICATION).map_err(|e| Error::InvalidConfig(e.to_string()))?,
    };
    let artifact = artifact.unwrap_or(DEFAULT_ARTIFACT);

    let yaml = template_yaml(application.as_str(), artifact);
    // Refuse to write something we could not load back.
    Config::from_yaml(&yaml)?;
    std::fs::write(&config_path, yaml)?;

    Ok(())
}

pub fn template_yaml(application: &str, artifact: &str) -> String {
    format!(
        r#"application: {application}
artifact: "{artifact}"

environments:
  - name: dev
    apply: ./deploy.sh "$SHIPWRIGHT_ENVIRONMENT" "$SHIPWRIGHT_ARTIFACT"

  - name: staging
    apply: ./deploy.sh "$SHIPWRIGHT_ENVIRONMENT" "$SHIPWRIGHT_ARTIFACT"
    # healthcheck:
    #   cmd: curl -fsS https://staging.example.com/health
    #   interval: 5s
    #   retries: 5

  - name: production
    apply: ./deploy.sh "$SHIPWRIGHT_ENVIRONMENT" "$SHIPWRIGHT_ARTIFACT"
    allow_prerelease: false
    allow_floating: false
    approval:
      required: 1

# notifications:
#   slack:
#     webhook: {{ env: SLACK_WEBHOOK_URL }}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn template_loads() {
        let config = Config::template().unwrap();
        assert_eq!(config.application.as_str(), DEFAULT_APPLICATION);
        assert_eq!(config.environments.len(), 3);
        assert!(config.environment("production").unwrap().approval.is_some());
    }

    #[test]
    fn writes_custom_application_and_artifact() {
        let dir = TempDir::new().unwrap();
        init_config(dir.path(), Some("billing"), Some("archive:/srv/billing-{version}.jar"), false)
            .unwrap();

        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.application.as_str(), "billing");
        assert_eq!(
            config.artifact.as_deref(),
            Some("archive:/srv/billing-{version}.jar")
        );
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        init_config(dir.path(), None, None, false).unwrap();

        let err = init_config(dir.path(), None, None, false).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));

        init_config(dir.path(), Some("other"), None, true).unwrap();
        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.application.as_str(), "other");
    }

    #[test]
    fn rejects_invalid_application_name() {
        let dir = TempDir::new().unwrap();
        let err = init_config(dir.path(), Some("Bad_Name"), None, false).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(!dir.path().join(CONFIG_FILENAME).exists());
    }
}
