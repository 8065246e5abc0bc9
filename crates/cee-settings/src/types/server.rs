//! Server, auth, and logging settings.

use serde::{Deserialize, Serialize};

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Maximum accepted request body in bytes.
    pub body_limit_bytes: usize,
    /// Whole-request timeout in milliseconds (applies on top of job timeouts).
    pub request_timeout_ms: u64,
    /// How long shutdown waits for live jobs before giving up.
    pub shutdown_grace_ms: u64,
}

impl ServerSettings {
    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            body_limit_bytes: 1024 * 1024,
            request_timeout_ms: 120_000,
            shutdown_grace_ms: 10_000,
        }
    }
}

/// Bearer token (HS256 JWT) verification settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Shared HMAC secret. When unset every request is anonymous.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
    /// Expected `iss` claim.
    pub issuer: String,
    /// Lifetime of tokens minted by `cee token`, in seconds.
    pub token_ttl_secs: u64,
    /// Clock skew tolerated when checking `exp`, in seconds.
    pub leeway_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            issuer: "cee".to_string(),
            token_ttl_secs: 3600,
            leeway_secs: 30,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
