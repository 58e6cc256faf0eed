//! Rate limit policy configuration.
//!
//! A policy names one protected operation and pairs it with a request budget
//! and a window length, e.g. `login: 5 per 60s`. Policies are validated when
//! the table is built so that a bad budget fails at startup rather than
//! surfacing on the request path.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

use crate::error::{FloodgateError, Result};

/// A validated rate limit policy.
///
/// The fields are private so every `Policy` in circulation went through
/// [`Policy::new`]; the record arithmetic relies on the budget being
/// strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Maximum requests allowed in one window
    max_requests: u32,
    /// Length of the counting window
    window: Duration,
}

impl Policy {
    /// Create a policy, requiring a strictly positive budget and window.
    pub fn new(max_requests: u32, window: Duration) -> Result<Self> {
        if max_requests == 0 {
            return Err(FloodgateError::Config(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(FloodgateError::Config(
                "window_ms must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            max_requests,
            window,
        })
    }

    /// Maximum requests allowed in one window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Length of the counting window.
    pub fn window(&self) -> Duration {
        self.window
    }
}

/// A policy as it appears in configuration, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySpec {
    /// Maximum requests allowed in one window
    pub max_requests: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
}

/// The set of named policies the limiter enforces.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    policies: HashMap<String, Policy>,
}

impl PolicyTable {
    /// Create an empty policy table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from configuration specs, validating each policy.
    ///
    /// Both `max_requests` and `window_ms` must be strictly positive;
    /// anything else is a configuration error and fails construction.
    pub fn from_specs(specs: &HashMap<String, PolicySpec>) -> Result<Self> {
        let mut policies = HashMap::with_capacity(specs.len());

        for (name, spec) in specs {
            let policy = Policy::new(spec.max_requests, Duration::from_millis(spec.window_ms))
                .map_err(|e| match e {
                    FloodgateError::Config(msg) => {
                        FloodgateError::Config(format!("policy '{}': {}", name, msg))
                    }
                    other => other,
                })?;

            info!(
                policy = %name,
                max_requests = spec.max_requests,
                window_ms = spec.window_ms,
                "Loaded rate limit policy"
            );

            policies.insert(name.clone(), policy);
        }

        Ok(Self { policies })
    }

    /// Build a table from a YAML mapping of name to spec.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let specs: HashMap<String, PolicySpec> = serde_yaml::from_str(yaml)
            .map_err(|e| FloodgateError::Config(format!("Failed to parse policies: {}", e)))?;
        Self::from_specs(&specs)
    }

    /// Look up a policy by name.
    pub fn get(&self, name: &str) -> Option<Policy> {
        self.policies.get(name).copied()
    }

    /// Number of configured policies.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether the table has no policies.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
