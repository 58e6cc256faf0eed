//! Configuration management for Floodgate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;

use crate::ratelimit::PolicySpec;

/// Main configuration for the Floodgate service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Limiter housekeeping configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Named rate limit policies, keyed by policy name (e.g. "login")
    #[serde(default)]
    pub policies: HashMap<String, PolicySpec>,
}

impl Default for FloodgateConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            limiter: LimiterConfig::default(),
            policies: HashMap::new(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// gRPC server address
    #[serde(default = "default_grpc_addr")]
    pub grpc_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grpc_addr: default_grpc_addr(),
        }
    }
}

fn default_grpc_addr() -> SocketAddr {
    "127.0.0.1:8081".parse().unwrap()
}

/// Limiter housekeeping configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Minimum seconds between opportunistic eviction sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// A record is evicted once idle for this many of its policy's windows
    #[serde(default = "default_idle_multiple")]
    pub idle_window_multiple: u32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            idle_window_multiple: default_idle_multiple(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_idle_multiple() -> u32 {
    8
}

impl FloodgateConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: FloodgateConfig = serde_yaml::from_str(&contents)
            .map_err(|e| crate::error::FloodgateError::Config(e.to_string()))?;
        Ok(config)
    }
}
