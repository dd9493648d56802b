use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result, anyhow};
use platform_db::DatabaseSettings;
use products_crm::StageRegistry;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub stages_file: Option<PathBuf>,
    pub commit_timeout: Option<Duration>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let database_url = DatabaseSettings::from_env().resolve_url(&lookup)?;
        let stages_file = non_empty("PIPELINE_STAGES_FILE").map(PathBuf::from);
        let commit_timeout = match non_empty("COMMIT_TIMEOUT_MS") {
            Some(raw) => {
                let millis: u64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid COMMIT_TIMEOUT_MS {raw:?}"))?;
                if millis == 0 {
                    return Err(anyhow!("COMMIT_TIMEOUT_MS must be greater than zero"));
                }
                Some(Duration::from_millis(millis))
            }
            None => None,
        };

        Ok(Self {
            database_url,
            stages_file,
            commit_timeout,
        })
    }

    /// The configured stage file, or the built-in pipeline.
    pub fn registry(&self) -> Result<StageRegistry> {
        match &self.stages_file {
            Some(path) => StageRegistry::from_path(path)
                .with_context(|| format!("failed to load stages from {}", path.display())),
            None => Ok(StageRegistry::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.database_url, platform_db::DEFAULT_DATABASE_URL);
        assert!(config.stages_file.is_none());
        assert!(config.commit_timeout.is_none());
        assert_eq!(config.registry().unwrap(), StageRegistry::default());
    }

    #[test]
    fn database_url_comes_from_the_lookup() {
        let config =
            AppConfig::from_lookup(lookup(&[("DATABASE_URL", "sqlite::memory:")])).unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
    }

    #[test]
    fn commit_timeout_is_parsed_in_millis() {
        let config = AppConfig::from_lookup(lookup(&[("COMMIT_TIMEOUT_MS", "1500")])).unwrap();
        assert_eq!(config.commit_timeout, Some(Duration::from_millis(1_500)));
        assert!(AppConfig::from_lookup(lookup(&[("COMMIT_TIMEOUT_MS", "soon")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("COMMIT_TIMEOUT_MS", "0")])).is_err());
    }

    #[test]
    fn missing_stage_file_is_reported() {
        let config = AppConfig::from_lookup(lookup(&[(
            "PIPELINE_STAGES_FILE",
            "/nonexistent/stages.json",
        )]))
        .unwrap();
        let err = config.registry().unwrap_err();
        assert!(err.to_string().contains("/nonexistent/stages.json"));
    }
}
