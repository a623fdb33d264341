use notifier::ReconcilerConfig;
use platforms::PlatformsConfig;
use serde::Deserialize;
use std::fs::File;
use tracker::{PolicyDefaults, StoreConfig};

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
    #[serde(default = "default_metrics_prefix")]
    pub prefix: String,
}

fn default_metrics_prefix() -> String {
    "modrunner".to_string()
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Used when `RUST_LOG` is not set.
    pub level: String,
    pub sentry_dsn: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            sentry_dsn: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub metrics: Option<MetricsConfig>,
    pub admin_listener: Option<Listener>,
    #[serde(default)]
    pub store: StoreConfig,
    pub platforms: PlatformsConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub policy_defaults: PolicyDefaults,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Config = serde_yaml::from_reader(file)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.platforms.curseforge.api_key.is_empty() {
            return Err(ConfigError::Invalid(
                "platforms.curseforge.api_key must not be empty".into(),
            ));
        }
        for (name, client) in [
            ("curseforge", &self.platforms.curseforge.client),
            ("modrinth", &self.platforms.modrinth.client),
        ] {
            if client.max_attempts == 0 {
                return Err(ConfigError::Invalid(format!(
                    "platforms.{name}.max_attempts must be at least 1"
                )));
            }
        }
        if self.reconciler.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "reconciler.interval_secs must be at least 1".into(),
            ));
        }
        if self.reconciler.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "reconciler.max_concurrent must be at least 1".into(),
            ));
        }
        let length = self.policy_defaults.changelog_max_length;
        if !(tracker::types::MIN_CHANGELOG_LENGTH..=tracker::types::MAX_CHANGELOG_LENGTH)
            .contains(&length)
        {
            return Err(ConfigError::Invalid(format!(
                "policy_defaults.changelog_max_length must be between {} and {}, got {length}",
                tracker::types::MIN_CHANGELOG_LENGTH,
                tracker::types::MAX_CHANGELOG_LENGTH
            )));
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tracker::NotificationStyle;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    #[test]
    fn full_config() {
        let yaml = r#"
            logging:
                level: debug
                sentry_dsn: https://key@sentry.example.com/1
            metrics:
                statsd_host: 127.0.0.1
                statsd_port: 8125
            admin_listener:
                host: 0.0.0.0
                port: 9000
            store:
                type: sqlite
                path: /var/lib/modrunner/modrunner.db
            platforms:
                curseforge:
                    api_key: secret
                    max_attempts: 5
                modrinth:
                    user_agent: example/modrunner-fork
            reconciler:
                interval_secs: 300
            policy_defaults:
                notification_style: compact
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.metrics.expect("metrics").prefix, "modrunner");
        assert_eq!(config.admin_listener.expect("listener").port, 9000);
        assert_eq!(
            config.store,
            StoreConfig::Sqlite {
                path: PathBuf::from("/var/lib/modrunner/modrunner.db")
            }
        );
        assert_eq!(config.platforms.curseforge.client.max_attempts, 5);
        assert_eq!(config.platforms.curseforge.client.timeout_secs, 10);
        assert_eq!(config.platforms.modrinth.user_agent, "example/modrunner-fork");
        assert_eq!(config.reconciler.interval_secs, 300);
        assert_eq!(config.reconciler.max_concurrent, 8);
        assert_eq!(
            config.policy_defaults.notification_style,
            NotificationStyle::Compact
        );
        assert_eq!(config.policy_defaults.max_tracked_projects, 100);
    }

    #[test]
    fn minimal_config() {
        let tmp = write_tmp_file("platforms:\n  curseforge:\n    api_key: secret\n");
        let config = Config::from_file(tmp.path()).expect("load config");
        assert_eq!(config.logging, LoggingConfig::default());
        assert_eq!(config.store, StoreConfig::Memory);
        assert!(config.metrics.is_none());
        assert!(config.admin_listener.is_none());
    }

    #[test]
    fn invalid_config() {
        let tmp = write_tmp_file("platforms:\n  curseforge:\n    api_key: ''\n");
        assert!(matches!(
            Config::from_file(tmp.path()),
            Err(ConfigError::Invalid(_))
        ));

        let tmp = write_tmp_file(
            "platforms:\n  curseforge:\n    api_key: secret\npolicy_defaults:\n  changelog_max_length: 2\n",
        );
        assert!(matches!(
            Config::from_file(tmp.path()),
            Err(ConfigError::Invalid(_))
        ));

        let tmp = write_tmp_file("platforms: [");
        assert!(matches!(
            Config::from_file(tmp.path()),
            Err(ConfigError::ParseError(_))
        ));

        assert!(matches!(
            Config::from_file(std::path::Path::new("/nonexistent/modrunner.yaml")),
            Err(ConfigError::LoadError(_))
        ));
    }
}
