//! Operator configuration.
//!
//! Built once at process start from an optional TOML file, overlaid with
//! the environment variables below, validated, and then passed by reference
//! into the connector and the reconcilers.
//!
//! | Variable | Field |
//! |---|---|
//! | `DATABASE_TYPE` | `database.engine` |
//! | `DATABASE_NAME` | `database.name` |
//! | `DATABASE_PORT` | `database.port` |
//! | `DATABASE_PORT_DEVELOPMENT` | `database.development_port` |
//! | `DATABASE_ADMIN_USER` / `DATABASE_ADMIN_PASSWORD` | `database.admin` |
//! | `APP_ENV` | `environment` |

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Credentials;

pub const ENV_DATABASE_TYPE: &str = "DATABASE_TYPE";
pub const ENV_DATABASE_NAME: &str = "DATABASE_NAME";
pub const ENV_DATABASE_PORT: &str = "DATABASE_PORT";
pub const ENV_DATABASE_PORT_DEVELOPMENT: &str = "DATABASE_PORT_DEVELOPMENT";
pub const ENV_DATABASE_ADMIN_USER: &str = "DATABASE_ADMIN_USER";
pub const ENV_DATABASE_ADMIN_PASSWORD: &str = "DATABASE_ADMIN_PASSWORD";
pub const ENV_APP_ENV: &str = "APP_ENV";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("{var} must be a number in range, got {value:?}")]
    InvalidNumber { var: String, value: String },

    #[error("{0} is set without its counterpart; admin credentials need both user and password")]
    IncompleteCredentials(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Deployment environment. Development targets a local database instead of
/// the in-cluster Service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppEnvironment {
    #[default]
    Production,
    Development,
}

impl AppEnvironment {
    /// `development` (any case) selects development; anything else is production.
    pub fn from_app_env(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("development") {
            AppEnvironment::Development
        } else {
            AppEnvironment::Production
        }
    }

    pub fn is_development(self) -> bool {
        self == AppEnvironment::Development
    }
}

/// When a Game is marked Ready relative to provisioning its infrastructure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessGate {
    /// Mark Ready before ensuring the Deployment and Service.
    #[default]
    Eager,
    /// Mark Ready only after both exist.
    AfterProvisioning,
}

/// Connection parameters for the per-Game Postgres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Engine selector; only `postgres` is supported by the connector.
    pub engine: String,
    /// Database (catalog) name, also passed to the container as `POSTGRES_DB`.
    pub name: String,
    /// Service port used in production.
    pub port: u16,
    /// Port used in development.
    pub development_port: u16,
    /// Host used in development.
    pub development_host: String,
    /// Upper bound on pooled connections per store.
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
    /// Admin credentials; when unset the Game's own credentials are used.
    pub admin: Option<Credentials>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            engine: "postgres".to_string(),
            name: "postgres".to_string(),
            port: 5432,
            development_port: 5432,
            development_host: "localhost".to_string(),
            max_connections: 2,
            connect_timeout_secs: 10,
            admin: None,
        }
    }
}

/// Shape of the Postgres workload materialized for each Game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub image: String,
    pub container_port: i32,
    pub data_path: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            image: "postgres:13".to_string(),
            container_port: 5432,
            data_path: "/var/lib/postgresql/data".to_string(),
        }
    }
}

/// Reconciliation bounds and retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Deadline for a single reconciliation.
    pub timeout_secs: u64,
    pub readiness: ReadinessGate,
    /// First retry delay after a failed reconciliation.
    pub retry_base_secs: u64,
    /// Retry delay cap.
    pub retry_max_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            readiness: ReadinessGate::Eager,
            retry_base_secs: 5,
            retry_max_secs: 300,
        }
    }
}

/// Top-level operator configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    pub environment: AppEnvironment,
    pub database: DatabaseConfig,
    pub postgres: PostgresConfig,
    pub reconcile: ReconcileConfig,
}

impl OperatorConfig {
    /// Load from an optional file, overlay the process environment, validate.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_with(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Overlay values from an environment lookup. Unset variables leave the
    /// current value untouched.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(engine) = lookup(ENV_DATABASE_TYPE) {
            self.database.engine = engine;
        }
        if let Some(name) = lookup(ENV_DATABASE_NAME) {
            self.database.name = name;
        }
        if let Some(port) = lookup(ENV_DATABASE_PORT) {
            self.database.port = parse_number(ENV_DATABASE_PORT, &port)?;
        }
        if let Some(port) = lookup(ENV_DATABASE_PORT_DEVELOPMENT) {
            self.database.development_port = parse_number(ENV_DATABASE_PORT_DEVELOPMENT, &port)?;
        }
        if let Some(env) = lookup(ENV_APP_ENV) {
            self.environment = AppEnvironment::from_app_env(&env);
        }

        match (
            lookup(ENV_DATABASE_ADMIN_USER),
            lookup(ENV_DATABASE_ADMIN_PASSWORD),
        ) {
            (Some(user), Some(password)) => {
                self.database.admin = Some(Credentials::new(user, password));
            }
            (Some(_), None) => {
                return Err(ConfigError::IncompleteCredentials(
                    ENV_DATABASE_ADMIN_USER.to_string(),
                ));
            }
            (None, Some(_)) => {
                return Err(ConfigError::IncompleteCredentials(
                    ENV_DATABASE_ADMIN_PASSWORD.to_string(),
                ));
            }
            (None, None) => {}
        }

        Ok(())
    }

    /// Reject values that would only fail later, at reconciliation time.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.port == 0 {
            return Err(ConfigError::Invalid("database.port must be non-zero".into()));
        }
        if self.database.development_port == 0 {
            return Err(ConfigError::Invalid(
                "database.development_port must be non-zero".into(),
            ));
        }
        if self.database.name.trim().is_empty() {
            return Err(ConfigError::Invalid("database.name must not be empty".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be at least 1".into(),
            ));
        }
        if !(1..=65535).contains(&self.postgres.container_port) {
            return Err(ConfigError::Invalid(format!(
                "postgres.container_port {} is out of range",
                self.postgres.container_port
            )));
        }
        if self.reconcile.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "reconcile.timeout_secs must be non-zero".into(),
            ));
        }
        if self.reconcile.retry_base_secs > self.reconcile.retry_max_secs {
            return Err(ConfigError::Invalid(
                "reconcile.retry_base_secs exceeds reconcile.retry_max_secs".into(),
            ));
        }
        Ok(())
    }

    /// Port the connector dials in the current environment.
    pub fn effective_port(&self) -> u16 {
        match self.environment {
            AppEnvironment::Production => self.database.port,
            AppEnvironment::Development => self.database.development_port,
        }
    }

    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.database.connect_timeout_secs)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_secs(self.reconcile.retry_base_secs)
    }

    pub fn retry_max(&self) -> Duration {
        Duration::from_secs(self.reconcile.retry_max_secs)
    }
}

fn parse_number<T: FromStr>(var: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber {
            var: var.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = OperatorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.database.engine, "postgres");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.postgres.image, "postgres:13");
        assert_eq!(config.environment, AppEnvironment::Production);
        assert_eq!(config.reconcile.readiness, ReadinessGate::Eager);
    }

    #[test]
    fn env_overrides_database_settings() {
        let mut config = OperatorConfig::default();
        config
            .apply_env_with(env(&[
                (ENV_DATABASE_TYPE, "postgres"),
                (ENV_DATABASE_NAME, "kubegame"),
                (ENV_DATABASE_PORT, "6543"),
                (ENV_DATABASE_PORT_DEVELOPMENT, "15432"),
                (ENV_DATABASE_ADMIN_USER, "admin"),
                (ENV_DATABASE_ADMIN_PASSWORD, "secret"),
            ]))
            .unwrap();

        assert_eq!(config.database.name, "kubegame");
        assert_eq!(config.database.port, 6543);
        assert_eq!(config.database.development_port, 15432);
        assert_eq!(
            config.database.admin,
            Some(Credentials::new("admin", "secret"))
        );
        assert_eq!(config.effective_port(), 6543);
    }

    #[test]
    fn development_mode_switches_port() {
        let mut config = OperatorConfig::default();
        config
            .apply_env_with(env(&[
                (ENV_APP_ENV, "Development"),
                (ENV_DATABASE_PORT_DEVELOPMENT, "15432"),
            ]))
            .unwrap();

        assert!(config.environment.is_development());
        assert_eq!(config.effective_port(), 15432);
    }

    #[test]
    fn unknown_app_env_is_production() {
        assert_eq!(AppEnvironment::from_app_env("staging"), AppEnvironment::Production);
        assert_eq!(AppEnvironment::from_app_env(""), AppEnvironment::Production);
    }

    #[test]
    fn malformed_port_is_a_load_error() {
        let mut config = OperatorConfig::default();
        let err = config
            .apply_env_with(env(&[(ENV_DATABASE_PORT, "five-four-three-two")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { ref var, .. } if var == ENV_DATABASE_PORT));

        let err = config
            .apply_env_with(env(&[(ENV_DATABASE_PORT, "70000")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { .. }));
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut config = OperatorConfig::default();
        config
            .apply_env_with(env(&[(ENV_DATABASE_PORT, ""), (ENV_DATABASE_NAME, "  ")]))
            .unwrap();
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.name, "postgres");
    }

    #[test]
    fn half_configured_admin_is_rejected() {
        let mut config = OperatorConfig::default();
        let err = config
            .apply_env_with(env(&[(ENV_DATABASE_ADMIN_USER, "admin")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::IncompleteCredentials(_)));
    }

    #[test]
    fn zero_port_fails_validation() {
        let mut config = OperatorConfig::default();
        config.database.port = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn parse_partial_toml() {
        let config = OperatorConfig::from_toml_str(
            r#"
environment = "development"

[database]
name = "worlds"
development_host = "127.0.0.1"

[reconcile]
readiness = "after_provisioning"
"#,
        )
        .unwrap();

        assert!(config.environment.is_development());
        assert_eq!(config.database.name, "worlds");
        assert_eq!(config.database.development_host, "127.0.0.1");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.reconcile.readiness, ReadinessGate::AfterProvisioning);
        assert_eq!(config.reconcile.timeout_secs, 30);
    }

    #[test]
    fn toml_round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kubegame.toml");

        let mut config = OperatorConfig::default();
        config.database.name = "games".to_string();
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        let loaded = OperatorConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = OperatorConfig::from_file(Path::new("/nonexistent/kubegame.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { ref path, .. } if path.contains("kubegame.toml")));
    }
}
