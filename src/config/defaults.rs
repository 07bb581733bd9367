//! Coordinator settings and their built-in defaults (layer 1)

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::timeout::RpcTimeouts;

/// Timeouts applied to gateway RPCs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Cancel RPC timeout in milliseconds (default: 10000)
    pub cancel_timeout_ms: u64,

    /// Submit RPC timeout in milliseconds (default: 10000)
    pub submit_timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            cancel_timeout_ms: attempt_protocol::DEFAULT_CANCEL_TIMEOUT_MS,
            submit_timeout_ms: attempt_protocol::DEFAULT_SUBMIT_TIMEOUT_MS,
        }
    }
}

/// Typed coordinator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Attempts per vertex including the first (default: 3)
    pub max_attempts: u32,

    /// How long to wait for dispatched attempts to settle, in milliseconds
    /// (default: 30000)
    pub settle_wait_ms: u64,

    /// Fallback log level when RUST_LOG is unset (default: "info")
    pub log_level: String,

    pub rpc: RpcConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            settle_wait_ms: 30_000,
            log_level: "info".to_string(),
            rpc: RpcConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "max_attempts": self.max_attempts,
            "settle_wait_ms": self.settle_wait_ms,
            "log_level": self.log_level,
            "rpc": {
                "cancel_timeout_ms": self.rpc.cancel_timeout_ms,
                "submit_timeout_ms": self.rpc.submit_timeout_ms
            }
        })
    }

    pub fn rpc_timeouts(&self) -> RpcTimeouts {
        RpcTimeouts {
            cancel: Duration::from_millis(self.rpc.cancel_timeout_ms),
            submit: Duration::from_millis(self.rpc.submit_timeout_ms),
        }
    }

    pub fn settle_wait(&self) -> Duration {
        Duration::from_millis(self.settle_wait_ms)
    }
}
