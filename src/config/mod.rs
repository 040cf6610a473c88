use std::env;
use std::path::PathBuf;

use crate::error::FlowError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
}

/// Evaluation service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base URL of the evaluation service, e.g. `http://localhost:8000/api`
    pub base_url: String,
    /// Language passed through to the service as a query parameter
    pub lang: Option<String>,
}

/// Local persistence configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, FlowError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let service = ServiceConfig {
            base_url: env::var("FLOW_BASE_URL").map_err(|_| FlowError::Config {
                message: "FLOW_BASE_URL is required".to_string(),
            })?,
            lang: env::var("FLOW_LANG").ok().filter(|s| !s.is_empty()),
        };

        let storage = StorageConfig {
            path: PathBuf::from(
                env::var("FLOW_DB_PATH").unwrap_or_else(|_| "./data/flow.db".to_string()),
            ),
            max_connections: env::var("FLOW_DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30000),
        };

        Ok(Config {
            service,
            storage,
            logging,
            request,
        })
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self { timeout_ms: 30000 }
    }
}
