//! Config schema types (server, bridge, lifecycle, helper, assets).
use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherConfig {
    pub server: ServerConfig,
    pub bridge: BridgeConfig,
    pub lifecycle: LifecycleConfig,
    pub helper: HelperConfig,
    pub assets: AssetsConfig,
}

/// HTTP listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: tether_protocol::DEFAULT_PORT,
        }
    }
}

/// Forwarding to the owning component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// How long a forwarded call waits for its reply before failing.
    pub forward_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            forward_timeout_secs: 30,
        }
    }
}

impl BridgeConfig {
    pub fn forward_timeout(&self) -> Duration {
        Duration::from_secs(self.forward_timeout_secs.max(1))
    }
}

/// Proxy service restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Upper bound on waiting for the proxy service to report stopped.
    pub stop_timeout_ms: u64,
    /// Re-check interval while waiting, in case a readiness change is missed.
    pub recheck_interval_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            stop_timeout_ms: 10_000,
            recheck_interval_ms: 200,
        }
    }
}

impl LifecycleConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn recheck_interval(&self) -> Duration {
        Duration::from_millis(self.recheck_interval_ms.max(10))
    }
}

/// The privileged helper listening on loopback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelperConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            url: format!("http://127.0.0.1:{}", tether_protocol::HELPER_PORT),
            timeout_secs: 10,
        }
    }
}

/// Packaged files. Unset entries fall back to the copies built into the binary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Directory served for static paths.
    pub dir: Option<PathBuf>,
    /// Base proxy configuration template.
    pub config_template: Option<PathBuf>,
    /// OpenAPI document (YAML).
    pub openapi: Option<PathBuf>,
}
