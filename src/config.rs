use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the HTTP server binds to (default: 0.0.0.0:3000)
    #[serde(default = "Config::default_bind_addr")]
    pub bind_addr: String,
    /// Allowed CORS origins. Required unless cors_permissive is true.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Explicitly allow all origins (development only). Defaults to false.
    #[serde(default)]
    pub cors_permissive: bool,
    /// Cache backend configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Location store configuration
    #[serde(default)]
    pub locations: LocationConfig,
    /// ETA prediction configuration
    #[serde(default)]
    pub eta: EtaConfig,
    /// Known vehicles and their route stops
    #[serde(default)]
    pub vehicles: Vec<VehicleEntry>,
}

impl Config {
    fn default_bind_addr() -> String {
        "0.0.0.0:3000".to_string()
    }
}

/// Configuration for the dual-backend cache
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Redis connection URL. When absent the process runs memory-only.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Number of connection attempts before giving up (default: 2)
    #[serde(default = "CacheConfig::default_connect_retries")]
    pub connect_retries: u32,
    /// Base backoff in milliseconds between attempts, multiplied by the
    /// attempt number (default: 100)
    #[serde(default = "CacheConfig::default_connect_backoff_ms")]
    pub connect_backoff_ms: u64,
    /// Upper bound on a single backoff sleep in milliseconds (default: 1000)
    #[serde(default = "CacheConfig::default_connect_backoff_cap_ms")]
    pub connect_backoff_cap_ms: u64,
    /// Per-operation timeout against the networked backend in milliseconds
    /// (default: 500). A timeout degrades the backend instead of failing
    /// the call.
    #[serde(default = "CacheConfig::default_op_timeout_ms")]
    pub op_timeout_ms: u64,
    /// Interval in seconds between expired-entry sweeps of the in-memory
    /// store (default: 60)
    #[serde(default = "CacheConfig::default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            connect_retries: Self::default_connect_retries(),
            connect_backoff_ms: Self::default_connect_backoff_ms(),
            connect_backoff_cap_ms: Self::default_connect_backoff_cap_ms(),
            op_timeout_ms: Self::default_op_timeout_ms(),
            sweep_interval_secs: Self::default_sweep_interval_secs(),
        }
    }
}

impl CacheConfig {
    fn default_connect_retries() -> u32 {
        2
    }
    fn default_connect_backoff_ms() -> u64 {
        100
    }
    fn default_connect_backoff_cap_ms() -> u64 {
        1000
    }
    fn default_op_timeout_ms() -> u64 {
        500
    }
    fn default_sweep_interval_secs() -> u64 {
        60
    }
}

/// Configuration for the location store
#[derive(Debug, Clone, Deserialize)]
pub struct LocationConfig {
    /// Time-to-live of a cached position record in seconds, refreshed on
    /// every write (default: 300)
    #[serde(default = "LocationConfig::default_ttl_secs")]
    pub ttl_secs: u64,
    /// Age in seconds beyond which a record is shown as offline
    /// (default: 120)
    #[serde(default = "LocationConfig::default_offline_threshold_secs")]
    pub offline_threshold_secs: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            ttl_secs: Self::default_ttl_secs(),
            offline_threshold_secs: Self::default_offline_threshold_secs(),
        }
    }
}

impl LocationConfig {
    fn default_ttl_secs() -> u64 {
        300
    }
    fn default_offline_threshold_secs() -> u64 {
        120
    }
}

/// Configuration for ETA prediction
#[derive(Debug, Clone, Deserialize)]
pub struct EtaConfig {
    /// Floor applied to reported speeds so a stationary vehicle still gets
    /// a finite ETA (default: 5.0 km/h)
    #[serde(default = "EtaConfig::default_minimum_speed_kmh")]
    pub minimum_speed_kmh: f64,
}

impl Default for EtaConfig {
    fn default() -> Self {
        Self {
            minimum_speed_kmh: Self::default_minimum_speed_kmh(),
        }
    }
}

impl EtaConfig {
    fn default_minimum_speed_kmh() -> f64 {
        5.0
    }
}

/// A vehicle known to the system with its ordered route stops
#[derive(Debug, Clone, Deserialize)]
pub struct VehicleEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub stops: Vec<StopEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopEntry {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
}
