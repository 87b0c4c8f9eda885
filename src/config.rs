//! Configuration management for the Campus Share engine
//!
//! Strongly-typed configuration loaded from environment variables (and a
//! `.env` file when present), with validation and sensible defaults.
//!
//! # Example
//! ```no_run
//! use campus_share::Config;
//! let config = Config::from_env().expect("failed to load config");
//! println!("listening on {}:{}", config.api.host, config.api.port);
//! ```

use crate::error::{Error, Result};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Which store adapter backs the service
    pub store_backend: StoreBackend,
    /// Database configuration (used by the postgres backend)
    pub database: DatabaseConfig,
    /// API server configuration
    pub api: ApiConfig,
    /// Catalog paging limits
    pub catalog: CatalogConfig,
    /// Recommendation limits
    pub recommendation: RecommendationConfig,
    /// Object storage retrieval URLs
    pub storage: StorageConfig,
    /// Log output
    pub log: LogConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" | "in-memory" => Ok(StoreBackend::Memory),
            other => Err(Error::InvalidConfig {
                key: "STORE_BACKEND",
                message: format!("unknown backend '{}', expected postgres or memory", other).into(),
            }),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Minimum connections to keep open
    pub min_connections: u32,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Idle timeout for connections
    pub idle_timeout: Duration,
    /// Maximum lifetime for connections
    pub max_lifetime: Duration,
    /// Prepared statement cache capacity per connection
    pub statement_cache_size: usize,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Port to listen on
    pub port: u16,
    /// Host to bind to
    pub host: String,
    /// Request timeout
    pub request_timeout: Duration,
    /// Maximum in-flight requests
    pub concurrency_limit: usize,
    /// Allowed origins for CORS (`*` allows any)
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            request_timeout: Duration::from_secs(30),
            concurrency_limit: 512,
            cors_origins: vec!["*".to_string()],
        }
    }
}

/// Catalog paging limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogConfig {
    pub default_page_size: u64,
    pub max_page_size: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// Recommendation result limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecommendationConfig {
    pub similar_default_limit: u64,
    pub similar_max_limit: u64,
    pub recommended_default_limit: u64,
    pub recommended_max_limit: u64,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            similar_default_limit: 5,
            similar_max_limit: 20,
            recommended_default_limit: 10,
            recommended_max_limit: 50,
        }
    }
}

/// Object storage retrieval settings
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Base URL that storage keys are resolved against
    pub public_base_url: String,
    /// Lifetime of a URL handed out when a resource is opened
    pub view_url_ttl: Duration,
    /// Lifetime of a URL handed out for a download
    pub download_url_ttl: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:9000/campus-share".to_string(),
            view_url_ttl: Duration::from_secs(15 * 60),
            download_url_ttl: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Log output configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct LogConfig {
    pub format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Try to load .env file (ignore if not found)
        dotenvy::dotenv().ok();

        let config = Self {
            store_backend: get_env_or("STORE_BACKEND", "postgres").parse()?,
            database: DatabaseConfig::from_env()?,
            api: ApiConfig::from_env()?,
            catalog: CatalogConfig::from_env()?,
            recommendation: RecommendationConfig::from_env()?,
            storage: StorageConfig::from_env()?,
            log: LogConfig::from_env(),
        };

        config.validate()?;
        config.log_summary();

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.store_backend == StoreBackend::Postgres && self.database.url.is_empty() {
            return Err(Error::InvalidConfig {
                key: "DATABASE_URL",
                message: "database URL cannot be empty for the postgres backend".into(),
            });
        }

        if self.database.max_connections < self.database.min_connections {
            return Err(Error::InvalidConfig {
                key: "DB_MAX_CONNECTIONS",
                message: "max_connections must be >= min_connections".into(),
            });
        }

        if self.catalog.max_page_size == 0 {
            return Err(Error::InvalidConfig {
                key: "CATALOG_MAX_PAGE_SIZE",
                message: "max page size must be positive".into(),
            });
        }
        if self.catalog.default_page_size == 0
            || self.catalog.default_page_size > self.catalog.max_page_size
        {
            return Err(Error::InvalidConfig {
                key: "CATALOG_DEFAULT_PAGE_SIZE",
                message: "default page size must be within 1..=CATALOG_MAX_PAGE_SIZE".into(),
            });
        }

        let rec = &self.recommendation;
        if rec.similar_default_limit == 0 || rec.similar_default_limit > rec.similar_max_limit {
            return Err(Error::InvalidConfig {
                key: "REC_SIMILAR_DEFAULT_LIMIT",
                message: "default must be within 1..=REC_SIMILAR_MAX_LIMIT".into(),
            });
        }
        if rec.recommended_default_limit == 0
            || rec.recommended_default_limit > rec.recommended_max_limit
        {
            return Err(Error::InvalidConfig {
                key: "REC_RECOMMENDED_DEFAULT_LIMIT",
                message: "default must be within 1..=REC_RECOMMENDED_MAX_LIMIT".into(),
            });
        }

        if self.api.concurrency_limit == 0 {
            return Err(Error::InvalidConfig {
                key: "API_CONCURRENCY_LIMIT",
                message: "concurrency limit must be positive".into(),
            });
        }

        Ok(())
    }

    /// Log configuration summary (without sensitive data)
    fn log_summary(&self) {
        info!("Configuration loaded:");
        info!("  Store backend: {:?}", self.store_backend);
        if self.store_backend == StoreBackend::Postgres {
            info!("  Database:");
            info!("    URL: {}", mask_url(&self.database.url));
            info!(
                "    Pool Size: {}-{}",
                self.database.min_connections, self.database.max_connections
            );
        }
        info!("  API:");
        info!("    Listening on: {}:{}", self.api.host, self.api.port);
        info!("    Request timeout: {:?}", self.api.request_timeout);
        info!(
            "  Catalog page size: default {}, max {}",
            self.catalog.default_page_size, self.catalog.max_page_size
        );
        info!("  Storage base URL: {}", self.storage.public_base_url);
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Self> {
        let url = get_env("DATABASE_URL").unwrap_or_else(|_| {
            let user = std::env::var("USER").unwrap_or_else(|_| "postgres".to_string());
            format!("postgres://{}@localhost/campus_share_dev", user)
        });

        Ok(Self {
            url,
            max_connections: get_env_or("DB_MAX_CONNECTIONS", "20").parse().unwrap_or(20),
            min_connections: get_env_or("DB_MIN_CONNECTIONS", "5").parse().unwrap_or(5),
            connect_timeout: Duration::from_secs(
                get_env_or("DB_CONNECT_TIMEOUT_SECS", "30")
                    .parse()
                    .unwrap_or(30),
            ),
            idle_timeout: Duration::from_secs(
                get_env_or("DB_IDLE_TIMEOUT_SECS", "600")
                    .parse()
                    .unwrap_or(600),
            ),
            max_lifetime: Duration::from_secs(
                get_env_or("DB_MAX_LIFETIME_SECS", "3600")
                    .parse()
                    .unwrap_or(3600),
            ),
            statement_cache_size: get_env_or("DB_STATEMENT_CACHE_SIZE", "100")
                .parse()
                .unwrap_or(100),
        })
    }
}

impl ApiConfig {
    fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            port: get_env_or("API_PORT", "8080").parse().unwrap_or(defaults.port),
            host: get_env_or("API_HOST", &defaults.host),
            request_timeout: Duration::from_secs(
                get_env_or("API_REQUEST_TIMEOUT_SECS", "30")
                    .parse()
                    .unwrap_or(30),
            ),
            concurrency_limit: get_env_or("API_CONCURRENCY_LIMIT", "512")
                .parse()
                .unwrap_or(defaults.concurrency_limit),
            cors_origins: get_env_or("API_CORS_ORIGINS", "*")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }
}

impl CatalogConfig {
    fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            default_page_size: get_env_or("CATALOG_DEFAULT_PAGE_SIZE", "20")
                .parse()
                .unwrap_or(defaults.default_page_size),
            max_page_size: get_env_or("CATALOG_MAX_PAGE_SIZE", "100")
                .parse()
                .unwrap_or(defaults.max_page_size),
        })
    }
}

impl RecommendationConfig {
    fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            similar_default_limit: get_env_or("REC_SIMILAR_DEFAULT_LIMIT", "5")
                .parse()
                .unwrap_or(defaults.similar_default_limit),
            similar_max_limit: get_env_or("REC_SIMILAR_MAX_LIMIT", "20")
                .parse()
                .unwrap_or(defaults.similar_max_limit),
            recommended_default_limit: get_env_or("REC_RECOMMENDED_DEFAULT_LIMIT", "10")
                .parse()
                .unwrap_or(defaults.recommended_default_limit),
            recommended_max_limit: get_env_or("REC_RECOMMENDED_MAX_LIMIT", "50")
                .parse()
                .unwrap_or(defaults.recommended_max_limit),
        })
    }
}

impl StorageConfig {
    fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            public_base_url: get_env_or("STORAGE_PUBLIC_BASE_URL", &defaults.public_base_url),
            view_url_ttl: Duration::from_secs(
                get_env_or("STORAGE_VIEW_URL_TTL_SECS", "900")
                    .parse()
                    .unwrap_or(900),
            ),
            download_url_ttl: Duration::from_secs(
                get_env_or("STORAGE_DOWNLOAD_URL_TTL_SECS", "3600")
                    .parse()
                    .unwrap_or(3600),
            ),
        })
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        let format = match get_env_or("LOG_FORMAT", "pretty").to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };
        Self { format }
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Get required environment variable
fn get_env(key: &'static str) -> Result<String> {
    std::env::var(key).map_err(|_| Error::MissingEnvVar { var: key })
}

/// Get environment variable with default
fn get_env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Mask the password part of a connection URL
fn mask_url(url: &str) -> String {
    let authority_start = url.find("://").map(|i| i + 3).unwrap_or(0);
    if let Some(at_offset) = url[authority_start..].find('@') {
        let at_pos = authority_start + at_offset;
        if let Some(colon_offset) = url[authority_start..at_pos].find(':') {
            let colon_pos = authority_start + colon_offset;
            return format!("{}****{}", &url[..=colon_pos], &url[at_pos..]);
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            store_backend: StoreBackend::Memory,
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 10,
                min_connections: 2,
                connect_timeout: Duration::from_secs(5),
                idle_timeout: Duration::from_secs(60),
                max_lifetime: Duration::from_secs(600),
                statement_cache_size: 100,
            },
            api: ApiConfig::default(),
            catalog: CatalogConfig::default(),
            recommendation: RecommendationConfig::default(),
            storage: StorageConfig::default(),
            log: LogConfig::default(),
        }
    }

    #[test]
    fn test_mask_url_hides_password() {
        assert_eq!(
            mask_url("postgres://campus:s3cret@db:5432/share"),
            "postgres://campus:****@db:5432/share"
        );
        assert_eq!(
            mask_url("postgres://campus@db/share"),
            "postgres://campus@db/share"
        );
    }

    #[test]
    fn test_store_backend_parsing() {
        assert_eq!("memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert_eq!("Postgres".parse::<StoreBackend>().unwrap(), StoreBackend::Postgres);
        assert!("redis".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_validate_defaults() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_default_page_size_above_max() {
        let mut cfg = config();
        cfg.catalog.default_page_size = 200;
        assert!(matches!(
            cfg.validate(),
            Err(Error::InvalidConfig { key: "CATALOG_DEFAULT_PAGE_SIZE", .. })
        ));
    }

    #[test]
    fn test_validate_requires_url_for_postgres() {
        let mut cfg = config();
        cfg.store_backend = StoreBackend::Postgres;
        assert!(cfg.validate().is_err());
    }
}
