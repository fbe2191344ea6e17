// Configuration types module
// Defines all configuration-related data structures

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common, json, or custom pattern)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Access log file path (optional, stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}

/// Performance configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive_timeout: u64,
    pub read_timeout: u64,
    pub write_timeout: u64,
    pub max_connections: Option<u64>,
}

/// Response cache configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    /// Master switch; when off every request is forwarded untouched
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Response header carrying hit/miss/skip (empty disables it)
    #[serde(default = "default_status_header")]
    pub status_header: String,
    /// Seconds a freshly created entry is assumed valid before the policy runs
    #[serde(default = "default_expiration")]
    pub default_expiration: u64,
    /// Seconds a cacheable response stays fresh
    #[serde(default = "default_ttl")]
    pub ttl: u64,
    /// Status codes stored by the default policy
    #[serde(default = "default_cacheable_statuses")]
    pub cacheable_statuses: Vec<u16>,
    /// Body chunks buffered between the upstream and the cache writer
    #[serde(default = "default_body_buffer")]
    pub body_buffer: usize,
}

#[allow(clippy::missing_const_for_fn)]
fn default_cache_enabled() -> bool {
    true
}

#[allow(clippy::missing_const_for_fn)]
fn default_status_header() -> String {
    "X-Cache-Status".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_expiration() -> u64 {
    3600
}

#[allow(clippy::missing_const_for_fn)]
fn default_ttl() -> u64 {
    600
}

fn default_cacheable_statuses() -> Vec<u16> {
    vec![200, 203, 204, 300, 301, 308, 410]
}

#[allow(clippy::missing_const_for_fn)]
fn default_body_buffer() -> usize {
    16
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            status_header: default_status_header(),
            default_expiration: default_expiration(),
            ttl: default_ttl(),
            cacheable_statuses: default_cacheable_statuses(),
            body_buffer: default_body_buffer(),
        }
    }
}

// Longer windows are clamped so `Utc::now() + window` cannot overflow
const MAX_WINDOW_SECS: u64 = 100 * 365 * 24 * 3600;

fn window(seconds: u64) -> chrono::Duration {
    let seconds = i64::try_from(seconds.min(MAX_WINDOW_SECS)).unwrap_or(i64::MAX);
    chrono::Duration::seconds(seconds)
}

impl CacheConfig {
    /// Speculative lifetime of an entry whose policy is not known yet
    pub fn default_window(&self) -> chrono::Duration {
        window(self.default_expiration)
    }

    /// Lifetime of a cacheable response
    pub fn ttl_window(&self) -> chrono::Duration {
        window(self.ttl)
    }
}

/// Where uncached responses come from
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpstreamConfig {
    /// Forward to another HTTP server
    Proxy { url: String },
    /// Serve files from a local directory
    Static {
        root: String,
        #[serde(default = "default_index_files")]
        index_files: Vec<String>,
    },
}

fn default_index_files() -> Vec<String> {
    vec!["index.html".to_string(), "index.htm".to_string()]
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self::Static {
            root: "public".to_string(),
            index_files: default_index_files(),
        }
    }
}
