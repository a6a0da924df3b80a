use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::auth::ROLES;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_STORE_BACKEND: &str = "in-memory";
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;
const DEFAULT_BATCH_MAX_SELECTION: usize = 200;
const DEFAULT_COMPANY_NAME: &str = "Quality Control Department";

/// Which record store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    Sql,
}

/// A named operator allowed to call the API.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct OperatorConfig {
    #[validate(length(min = 1))]
    pub name: String,

    /// Hex SHA-256 of the operator's bearer token
    #[validate(custom = "validate_token_digest")]
    pub token_sha256: String,

    #[serde(default)]
    pub roles: Vec<String>,
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Record store: "in-memory" or "sql"
    #[serde(default = "default_store_backend")]
    #[validate(custom = "validate_store_backend")]
    pub store_backend: String,

    /// Database connection URL, required for the sql backend
    #[serde(default)]
    pub database_url: Option<String>,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: connections kept open while idle
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// Capacity of the domain event channel
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Largest selection accepted by batch confirm
    #[serde(default = "default_batch_max_selection")]
    pub batch_max_selection: usize,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Header line of printed NCR documents
    #[serde(default = "default_company_name")]
    pub company_name: String,

    /// Operators and their roles
    #[serde(default)]
    #[validate]
    pub operators: Vec<OperatorConfig>,
}

impl AppConfig {
    /// Minimal configuration for local runs and tests.
    pub fn new(host: String, port: u16, environment: String) -> Self {
        Self {
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            store_backend: default_store_backend(),
            database_url: None,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            event_channel_capacity: default_event_channel_capacity(),
            batch_max_selection: default_batch_max_selection(),
            cors_allowed_origins: None,
            company_name: default_company_name(),
            operators: Vec::new(),
        }
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn store_backend(&self) -> StoreBackend {
        if self.store_backend.eq_ignore_ascii_case("sql") {
            StoreBackend::Sql
        } else {
            StoreBackend::InMemory
        }
    }

    /// Explicitly configured CORS origins, trimmed and non-empty.
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.store_backend() == StoreBackend::Sql
            && self
                .database_url
                .as_deref()
                .map_or(true, |url| url.trim().is_empty())
        {
            let mut err = ValidationError::new("database_url_required");
            err.message = Some("Set APP__DATABASE_URL when store_backend is \"sql\"".into());
            errors.add("database_url", err);
        }

        for operator in &self.operators {
            if let Some(unknown) = operator
                .roles
                .iter()
                .find(|role| !ROLES.contains_key(role.as_str()))
            {
                let mut err = ValidationError::new("unknown_role");
                err.message = Some(
                    format!("Operator '{}' has unknown role '{}'", operator.name, unknown).into(),
                );
                errors.add("operators", err);
            }
        }

        if !self.is_development() && self.operators.is_empty() {
            let mut err = ValidationError::new("operators_required");
            err.message = Some("At least one operator must be configured outside development".into());
            errors.add("operators", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_store_backend() -> String {
    DEFAULT_STORE_BACKEND.to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

fn default_batch_max_selection() -> usize {
    DEFAULT_BATCH_MAX_SELECTION
}

fn default_company_name() -> String {
    DEFAULT_COMPANY_NAME.to_string()
}

fn validate_store_backend(value: &str) -> Result<(), ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        "in-memory" | "sql" => Ok(()),
        _ => {
            let mut err = ValidationError::new("store_backend");
            err.message = Some("Must be one of: in-memory, sql".into());
            Err(err)
        }
    }
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_token_digest(digest: &str) -> Result<(), ValidationError> {
    if digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("token_sha256");
        err.message = Some("token_sha256 must be a 64-character hex SHA-256 digest".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("stateset_rma={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

/// Same as [`load_config`] with an explicit config directory.
pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::from(config_dir.join("default")).required(false))
        .add_source(File::from(config_dir.join(&run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const DIGEST: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    fn config_dir(default_toml: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("default.toml"), default_toml).unwrap();
        dir
    }

    fn base_config() -> AppConfig {
        AppConfig::new("127.0.0.1".into(), 8080, "production".into())
    }

    #[test]
    fn loads_operators_from_file() {
        let dir = config_dir(&format!(
            r#"
            host = "127.0.0.1"
            port = 9000
            environment = "development"

            [[operators]]
            name = "Malee"
            token_sha256 = "{DIGEST}"
            roles = ["qc_manager"]
            "#
        ));

        let config = load_config_from(dir.path()).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.operators.len(), 1);
        assert_eq!(config.operators[0].roles, vec!["qc_manager"]);
        assert_eq!(config.store_backend(), StoreBackend::InMemory);
    }

    #[test]
    fn rejects_bad_digest() {
        let dir = config_dir(
            r#"
            host = "127.0.0.1"
            environment = "development"

            [[operators]]
            name = "Malee"
            token_sha256 = "plaintext-token"
            "#,
        );

        assert!(matches!(
            load_config_from(dir.path()),
            Err(AppConfigError::Validation(_))
        ));
    }

    #[test]
    fn sql_backend_requires_database_url() {
        let mut cfg = base_config();
        cfg.store_backend = "sql".into();
        cfg.operators.push(OperatorConfig {
            name: "ops".into(),
            token_sha256: DIGEST.into(),
            roles: vec!["admin".into()],
        });
        assert!(cfg.validate_additional_constraints().is_err());

        cfg.database_url = Some("sqlite::memory:".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn unknown_roles_are_rejected() {
        let mut cfg = base_config();
        cfg.operators.push(OperatorConfig {
            name: "ops".into(),
            token_sha256: DIGEST.into(),
            roles: vec!["superuser".into()],
        });
        let errors = cfg.validate_additional_constraints().unwrap_err();
        assert!(errors.errors().contains_key("operators"));
    }

    #[test]
    fn production_requires_an_operator() {
        assert!(base_config().validate_additional_constraints().is_err());

        let mut cfg = base_config();
        cfg.environment = "development".into();
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn cors_origins_are_split_and_trimmed() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some(" https://a.example , ,https://b.example".into());
        assert_eq!(
            cfg.cors_origins(),
            vec!["https://a.example", "https://b.example"]
        );
    }
}
