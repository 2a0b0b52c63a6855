//! Configuration loading and constants.
//!
//! Loads application configuration from TOML files, applies environment
//! overrides (`OPENAI_*`, `DATABASE_URL`, `LANGFUSE_*`) and defines constants
//! for HTTP cache headers, model defaults and default paths. `AppConfig` is the
//! root configuration struct containing all settings.

use const_format::formatcp;
use serde::Deserialize;
use std::path::{Path, PathBuf};

// =============================================================================
// HTTP Response Cache Control
// =============================================================================
// Evaluations are stored as immutable versions, so a specific version can be
// cached by the client. Everything else under /api is computed per request.

/// A stored version never changes once written
pub const HTTP_CACHE_VERSION_MAX_AGE: u32 = 3600;

pub const CACHE_CONTROL_VERSION: &str =
    formatcp!("private, max-age={}, immutable", HTTP_CACHE_VERSION_MAX_AGE);

pub const CACHE_CONTROL_NO_STORE: &str = "no-store";

// =============================================================================
// Language Model Defaults
// =============================================================================

/// Default OpenAI-compatible API base URL
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat model
pub const DEFAULT_LLM_MODEL: &str = "gpt-4.1-mini";

/// Default per-request timeout for model calls, in seconds
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;

/// Default number of re-asks when the model returns malformed structured output
pub const DEFAULT_LLM_MAX_RETRIES: u32 = 2;

// =============================================================================
// Observability
// =============================================================================

/// Default Langfuse host (self-hosted instance)
pub const DEFAULT_LANGFUSE_HOST: &str = "http://localhost:3000";

/// Timeout for shipping a batch of trace events, in seconds
pub const LANGFUSE_FLUSH_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// Health Probe
// =============================================================================

/// Timeout for the `healthcheck` subcommand, matching the container probe
pub const HEALTHCHECK_TIMEOUT_SECS: u64 = 10;

/// Seconds to wait for in-flight requests after a shutdown signal
pub const SHUTDOWN_GRACE_SECS: u64 = 30;

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Default bind host (all interfaces)
pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";

/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 8000;

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Default SQLite database location
pub const DEFAULT_DATABASE_PATH: &str = "data/second_guess.db";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "second_guess=info,tower_http=info";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub http: HttpServerConfig,
    /// SQLite storage
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Chat model used by the evaluation agents
    #[serde(default)]
    pub llm: LlmConfig,
    /// Optional Langfuse tracing
    #[serde(default)]
    pub langfuse: LangfuseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "HttpServerConfig::default_host")]
    pub host: String,
    #[serde(default = "HttpServerConfig::default_port")]
    pub port: u16,
    /// Origins allowed by CORS. `"*"` allows any origin.
    #[serde(default = "HttpServerConfig::default_cors_origins")]
    pub cors_allowed_origins: Vec<String>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            cors_allowed_origins: Self::default_cors_origins(),
        }
    }
}

impl HttpServerConfig {
    fn default_host() -> String {
        DEFAULT_HTTP_HOST.to_string()
    }

    fn default_port() -> u16 {
        DEFAULT_HTTP_PORT
    }

    fn default_cors_origins() -> Vec<String> {
        vec!["*".to_string()]
    }

    /// Whether CORS should accept any origin
    pub fn allows_any_origin(&self) -> bool {
        self.cors_allowed_origins.iter().any(|o| o == "*")
    }
}

/// Where the SQLite database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the database file (parent directory is created on startup)
    #[serde(default = "DatabaseConfig::default_path")]
    pub path: PathBuf,
    /// Use a throwaway in-memory database instead of `path`
    #[serde(default)]
    pub in_memory: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
            in_memory: false,
        }
    }
}

impl DatabaseConfig {
    fn default_path() -> PathBuf {
        PathBuf::from(DEFAULT_DATABASE_PATH)
    }

    pub fn location(&self) -> DatabaseLocation {
        if self.in_memory {
            DatabaseLocation::Memory
        } else {
            DatabaseLocation::File(self.path.clone())
        }
    }

    /// Parse a SQLAlchemy-style SQLite URL.
    ///
    /// `sqlite:///rel/path` is relative, `sqlite:////abs/path` is absolute,
    /// `sqlite://path` is taken as written and `sqlite::memory:` (or an empty
    /// path) is in-memory.
    pub fn location_from_url(url: &str) -> Result<DatabaseLocation, ConfigError> {
        let rest = url.strip_prefix("sqlite:").ok_or_else(|| {
            ConfigError::Validation(format!(
                "Unsupported DATABASE_URL '{}': only sqlite URLs are supported",
                url
            ))
        })?;

        if rest == ":memory:" || rest == "//:memory:" || rest == "///:memory:" {
            return Ok(DatabaseLocation::Memory);
        }

        let path = if let Some(abs) = rest.strip_prefix("////") {
            format!("/{}", abs)
        } else if let Some(rel) = rest.strip_prefix("///") {
            rel.to_string()
        } else if let Some(path) = rest.strip_prefix("//") {
            path.to_string()
        } else {
            rest.to_string()
        };

        if path.is_empty() {
            return Ok(DatabaseLocation::Memory);
        }

        Ok(DatabaseLocation::File(PathBuf::from(path)))
    }
}

/// Chat model settings
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "LlmConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "LlmConfig::default_model")]
    pub model: String,
    /// API key. Normally supplied through OPENAI_API_KEY rather than the file.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "LlmConfig::default_timeout")]
    pub timeout_seconds: u64,
    /// Re-asks allowed when structured output fails to parse or validate
    #[serde(default = "LlmConfig::default_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            model: Self::default_model(),
            api_key: None,
            timeout_seconds: Self::default_timeout(),
            max_retries: Self::default_max_retries(),
        }
    }
}

impl LlmConfig {
    fn default_base_url() -> String {
        DEFAULT_LLM_BASE_URL.to_string()
    }
    fn default_model() -> String {
        DEFAULT_LLM_MODEL.to_string()
    }
    fn default_timeout() -> u64 {
        DEFAULT_LLM_TIMEOUT_SECS
    }
    fn default_max_retries() -> u32 {
        DEFAULT_LLM_MAX_RETRIES
    }
}

/// Langfuse settings. Tracing is enabled only when both keys are present.
#[derive(Debug, Clone, Deserialize)]
pub struct LangfuseConfig {
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default = "LangfuseConfig::default_host")]
    pub host: String,
}

impl Default for LangfuseConfig {
    fn default() -> Self {
        Self {
            public_key: None,
            secret_key: None,
            host: Self::default_host(),
        }
    }
}

impl LangfuseConfig {
    fn default_host() -> String {
        DEFAULT_LANGFUSE_HOST.to_string()
    }

    /// Check if credentials are configured (both public and secret key)
    pub fn has_credentials(&self) -> bool {
        self.public_key.as_deref().is_some_and(|k| !k.is_empty())
            && self.secret_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of stored versions kept in memory (default: 1000)
    #[serde(default = "CacheConfig::default_max_versions")]
    pub max_versions: u64,
    /// TTL for cached versions in seconds (default: 1 hour)
    #[serde(default = "CacheConfig::default_version_ttl")]
    pub version_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_versions: Self::default_max_versions(),
            version_ttl_seconds: Self::default_version_ttl(),
        }
    }
}

impl CacheConfig {
    fn default_max_versions() -> u64 {
        1000
    }
    fn default_version_ttl() -> u64 {
        3600 // 1 hour
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    /// Load configuration from a TOML file and apply process environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::from_toml_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    ///
    /// Takes a lookup function so tests can supply variables without touching
    /// the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = non_empty("OPENAI_MODEL") {
            self.llm.model = model;
        }
        if let Some(base_url) = non_empty("OPENAI_BASE_URL") {
            self.llm.base_url = base_url;
        }
        if let Some(url) = non_empty("DATABASE_URL") {
            match DatabaseConfig::location_from_url(&url)? {
                DatabaseLocation::File(path) => {
                    self.database.path = path;
                    self.database.in_memory = false;
                }
                DatabaseLocation::Memory => self.database.in_memory = true,
            }
        }
        if let Some(key) = non_empty("LANGFUSE_PUBLIC_KEY") {
            self.langfuse.public_key = Some(key);
        }
        if let Some(key) = non_empty("LANGFUSE_SECRET_KEY") {
            self.langfuse.secret_key = Some(key);
        }
        if let Some(host) = non_empty("LANGFUSE_HOST") {
            self.langfuse.host = host;
        }

        self.validate()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
        }
        if !self.llm.base_url.starts_with("http://") && !self.llm.base_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "llm.base_url must be an http(s) URL, got '{}'",
                self.llm.base_url
            )));
        }
        if self.llm.timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "llm.timeout_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The API key, required before serving requests
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.llm
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                ConfigError::Validation("OPENAI_API_KEY environment variable not set".to_string())
            })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const MINIMAL: &str = r#"
[http]
host = "0.0.0.0"
port = 8000
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.http.port, 8000);
        assert_eq!(config.llm.model, DEFAULT_LLM_MODEL);
        assert_eq!(config.llm.max_retries, DEFAULT_LLM_MAX_RETRIES);
        assert_eq!(
            config.database.location(),
            DatabaseLocation::File(PathBuf::from(DEFAULT_DATABASE_PATH))
        );
        assert!(config.http.allows_any_origin());
        assert!(!config.langfuse.has_credentials());
        assert!(!config.logging.is_json());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::from_toml_str(MINIMAL).unwrap();
        config
            .apply_env(env(&[
                ("OPENAI_API_KEY", "sk-test"),
                ("OPENAI_MODEL", "gpt-4.1"),
                ("DATABASE_URL", "sqlite:///./data/other.db"),
                ("LANGFUSE_PUBLIC_KEY", "pk"),
                ("LANGFUSE_SECRET_KEY", "sk"),
            ]))
            .unwrap();

        assert_eq!(config.require_api_key().unwrap(), "sk-test");
        assert_eq!(config.llm.model, "gpt-4.1");
        assert_eq!(
            config.database.location(),
            DatabaseLocation::File(PathBuf::from("./data/other.db"))
        );
        assert!(config.langfuse.has_credentials());
        assert_eq!(config.langfuse.host, DEFAULT_LANGFUSE_HOST);
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = AppConfig::from_toml_str(MINIMAL).unwrap();
        config
            .apply_env(env(&[("OPENAI_MODEL", "  "), ("OPENAI_API_KEY", "")]))
            .unwrap();
        assert_eq!(config.llm.model, DEFAULT_LLM_MODEL);
        assert!(config.require_api_key().is_err());
    }

    #[test]
    fn test_database_url_forms() {
        assert_eq!(
            DatabaseConfig::location_from_url("sqlite:////app/data/x.db").unwrap(),
            DatabaseLocation::File(PathBuf::from("/app/data/x.db"))
        );
        assert_eq!(
            DatabaseConfig::location_from_url("sqlite:///data/x.db").unwrap(),
            DatabaseLocation::File(PathBuf::from("data/x.db"))
        );
        assert_eq!(
            DatabaseConfig::location_from_url("sqlite://data/x.db").unwrap(),
            DatabaseLocation::File(PathBuf::from("data/x.db"))
        );
        assert_eq!(
            DatabaseConfig::location_from_url("sqlite::memory:").unwrap(),
            DatabaseLocation::Memory
        );
        assert_eq!(
            DatabaseConfig::location_from_url("sqlite://").unwrap(),
            DatabaseLocation::Memory
        );
    }

    #[test]
    fn test_non_sqlite_database_url_rejected() {
        let err = DatabaseConfig::location_from_url("postgresql://db/app").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let toml = format!("{}\n[llm]\nbase_url = \"ftp://nope\"\n", MINIMAL);
        assert!(matches!(
            AppConfig::from_toml_str(&toml),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_explicit_cors_origins() {
        let toml = r#"
[http]
host = "127.0.0.1"
port = 9000
cors_allowed_origins = ["https://app.example.com"]

[logging]
format = "json"
"#;
        let config = AppConfig::from_toml_str(toml).unwrap();
        assert!(!config.http.allows_any_origin());
        assert!(config.logging.is_json());
    }

    #[test]
    fn test_http_defaults_when_omitted() {
        let config = AppConfig::from_toml_str("[http]\nhost = \"127.0.0.1\"\n").unwrap();
        assert_eq!(config.http.host, "127.0.0.1");
        assert_eq!(config.http.port, DEFAULT_HTTP_PORT);

        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.http.host, "0.0.0.0");
        assert_eq!(config.http.port, 8000);
        assert!(config.http.allows_any_origin());
    }

    #[test]
    fn test_shipped_default_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
        let config = AppConfig::from_toml_file(path).unwrap();
        assert_eq!(config.http.host, "0.0.0.0");
        assert_eq!(config.http.port, 8000);
        assert!(config.http.allows_any_origin());
        assert_eq!(
            config.database.location(),
            DatabaseLocation::File(PathBuf::from(DEFAULT_DATABASE_PATH))
        );
        assert_eq!(config.llm.model, DEFAULT_LLM_MODEL);
        assert!(!config.logging.is_json());
    }

    #[test]
    fn test_cache_control_version_header() {
        assert_eq!(CACHE_CONTROL_VERSION, "private, max-age=3600, immutable");
    }
}
