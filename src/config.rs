use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub rag_cache: RagCacheConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Path to the agent CLI executable
    #[serde(default = "default_cli_path")]
    pub cli_path: String,
    /// Timeout for one full agent run in seconds
    #[serde(default = "default_agent_timeout")]
    pub timeout_secs: u64,
    /// Model override; the CLI default is used when unset
    #[serde(default)]
    pub model: Option<String>,
}

fn default_cli_path() -> String {
    "claude".to_string()
}

fn default_agent_timeout() -> u64 {
    180
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            cli_path: default_cli_path(),
            timeout_secs: default_agent_timeout(),
            model: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TradingConfig {
    /// Master switch for live (non-simulated) trade execution.
    /// Off by default: every trade runs as paper until this is enabled.
    #[serde(default)]
    pub live_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RagCacheConfig {
    /// Enable remote cached-content handles for retrieved knowledge text
    #[serde(default)]
    pub enabled: bool,
    /// TTL requested for newly created handles, in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
    /// Minimum retrieved-text length eligible for caching
    #[serde(default = "default_cache_min_chars")]
    pub min_chars: usize,
    /// Model the handle is created for; defaults to the primary reasoning model
    #[serde(default = "default_cache_model")]
    pub model: String,
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_cache_min_chars() -> usize {
    280
}

fn default_cache_model() -> String {
    "gemini-3-pro-preview".to_string()
}

impl Default for RagCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: default_cache_ttl(),
            min_chars: default_cache_min_chars(),
            model: default_cache_model(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Consolidate the session into long-term memory once this many new
    /// events have accumulated since the last checkpoint. Zero or negative
    /// disables consolidation.
    #[serde(default = "default_memory_threshold")]
    pub consolidation_event_threshold: i64,
}

fn default_memory_threshold() -> i64 {
    6
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            consolidation_event_threshold: default_memory_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    /// Seconds between scan cycles in daemon mode
    #[serde(default = "default_daemon_period")]
    pub daemon_period_secs: u64,
}

fn default_daemon_period() -> u64 {
    300
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            daemon_period_secs: default_daemon_period(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("database.max_connections", 5)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("AUTOPILOT_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (AUTOPILOT_DATABASE__URL, etc.)
            .add_source(
                Environment::with_prefix("AUTOPILOT")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.database.url.is_empty() {
            errors.push("database.url must be set".to_string());
        }

        if self.agent.timeout_secs == 0 {
            errors.push("agent.timeout_secs must be positive".to_string());
        }

        if self.rag_cache.enabled {
            if self.rag_cache.ttl_secs == 0 {
                errors.push("rag_cache.ttl_secs must be positive when caching is enabled".to_string());
            }
            if self.rag_cache.min_chars == 0 {
                errors.push("rag_cache.min_chars must be positive when caching is enabled".to_string());
            }
        }

        if self.scan.daemon_period_secs == 0 {
            errors.push("scan.daemon_period_secs must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
