use crate::error::{AppError, Result};
use crate::search::{BackendConfig, SearchConfig};
use serde::{Deserialize, Serialize};

/// Environment variable naming an optional configuration file
pub const CONFIG_PATH_ENV: &str = "SEARCH_LENS_CONFIG";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Search backend connection
    #[serde(default)]
    pub backend: BackendConfig,

    /// Query execution and throttling
    #[serde(default)]
    pub search: SearchConfig,

    /// Result browsing
    #[serde(default)]
    pub view: ViewConfig,

    /// Logging
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the embedded defaults, an optional file and
    /// the environment.
    ///
    /// `path` wins over `SEARCH_LENS_CONFIG`. Environment overrides use the
    /// `SEARCH_LENS` prefix with `__` between sections, e.g.
    /// `SEARCH_LENS__BACKEND__ENDPOINT`.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = ::config::Config::builder().add_source(::config::File::from_str(
            include_str!("../config/default.toml"),
            ::config::FileFormat::Toml,
        ));

        let file = path
            .map(str::to_string)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok());
        if let Some(file) = file {
            // an explicitly named file must exist
            builder = builder.add_source(::config::File::with_name(&file).required(true));
        }

        let config: Config = builder
            .add_source(
                ::config::Environment::with_prefix("SEARCH_LENS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.backend.endpoint.trim().is_empty() {
            return Err(AppError::Configuration(
                "backend.endpoint must not be empty".to_string(),
            ));
        }
        if self.backend.index.trim().is_empty() {
            return Err(AppError::Configuration(
                "backend.index must not be empty".to_string(),
            ));
        }
        if self.backend.request_timeout_secs == 0 {
            return Err(AppError::Configuration(
                "backend.request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.view.page_size == 0 {
            return Err(AppError::Configuration(
                "view.page_size must be greater than 0".to_string(),
            ));
        }
        self.search
            .validate()
            .map_err(|e| AppError::Configuration(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Rows per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Fields shown before any have been toggled
    #[serde(default)]
    pub default_fields: Vec<String>,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            default_fields: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_page_size() -> usize {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults_parse() {
        let config: Config = ::config::Config::builder()
            .add_source(::config::File::from_str(
                include_str!("../config/default.toml"),
                ::config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.backend.index, "logs-*");
        assert_eq!(config.search.cursor_threshold, 10_000);
        assert_eq!(config.search.rate_limit.max_backoff_ms, 30_000);
        assert_eq!(config.view.default_fields.len(), 3);
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let mut config = Config::default();
        config.view.page_size = 0;
        assert!(matches!(config.validate(), Err(AppError::Configuration(_))));
    }
}
