//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `PINGATE_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `PINGATE_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `PINGATE_PINNING__RETRIES=5` sets the `pinning.retries` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use pingate::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port` - HTTP server binding configuration
//! - **IPFS**: `ipfs.url`, `ipfs.timeout` - Kubo RPC endpoint and per-call deadline
//! - **Upload**: `upload.max_file_size`, `upload.max_files`, `upload.allowed_extensions`,
//!   `upload.allowed_mime_types` - What the gateway accepts
//! - **Pinning**: `pinning.retries`, `pinning.retry_delay`, `pinning.backoff` - Pin retry policy
//! - **Auth**: `auth.enabled`, `auth.api_keys` - `x-api-key` authentication
//! - **CORS**: `cors.allowed_origins`, `cors.allowed_headers`
//! - **Limits**: `limits.max_concurrent_uploads` and friends - Upload admission control
//! - **Features**: `enable_metrics`, `enable_otel_export` - Optional feature toggles
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Override server port
//! PINGATE_PORT=8080
//!
//! # Point at a remote Kubo node
//! PINGATE_IPFS__URL="http://ipfs.internal:5001"
//!
//! # Switch to exponential backoff (factor defaults to 2, max_delay to 30s)
//! PINGATE_PINNING__BACKOFF__STRATEGY=exponential
//! PINGATE_PINNING__BACKOFF__FACTOR=3
//! PINGATE_PINNING__BACKOFF__MAX_DELAY=1m
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::Duration};
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "PINGATE_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment variables.
/// All fields have defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// IPFS node connection settings
    pub ipfs: IpfsConfig,
    /// What uploads are accepted
    pub upload: UploadConfig,
    /// Pin retry policy
    pub pinning: PinningConfig,
    /// API key authentication
    pub auth: AuthConfig,
    /// CORS configuration for browser clients
    pub cors: CorsConfig,
    /// Resource limits for protecting system capacity
    pub limits: LimitsConfig,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// Kubo RPC endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct IpfsConfig {
    /// Base URL of the Kubo RPC API (e.g., "http://localhost:5001")
    pub url: Url,
    /// Deadline applied to every individual RPC call
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

/// Upload acceptance rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    /// Maximum size of a single file in bytes
    pub max_file_size: u64,
    /// Maximum number of files in one `/upload-multiple` request
    pub max_files: usize,
    /// Accepted file extensions, without the leading dot
    pub allowed_extensions: Vec<String>,
    /// Accepted media types. Only entries set to `true` are accepted.
    pub allowed_mime_types: BTreeMap<String, bool>,
}

/// Pin retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PinningConfig {
    /// Maximum number of pin attempts after the existence probe. 0 disables pinning.
    pub retries: u32,
    /// Base delay between attempts
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
    /// How the delay grows with each attempt
    pub backoff: BackoffConfig,
}

/// Backoff curve between pin attempts.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum BackoffConfig {
    /// `retry_delay * attempt`
    #[default]
    Linear,
    /// `min(retry_delay * factor^(attempt - 1), max_delay)`
    Exponential {
        #[serde(default = "default_backoff_factor")]
        factor: u32,
        #[serde(default = "default_backoff_max_delay", with = "humantime_serde")]
        max_delay: Duration,
    },
}

fn default_backoff_factor() -> u32 {
    2
}

fn default_backoff_max_delay() -> Duration {
    Duration::from_secs(30)
}

/// API key authentication configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Require an `x-api-key` header on every route except `/healthz`
    pub enabled: bool,
    /// Accepted keys
    pub api_keys: Vec<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("enabled", &self.enabled)
            .field("api_keys", &format_args!("[{} redacted]", self.api_keys.len()))
            .finish()
    }
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Request headers browsers may send
    pub allowed_headers: Vec<String>,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard", serialize_with = "serialize_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn serialize_wildcard<S>(serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str("*")
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

/// Upload admission limits.
///
/// These limits help prevent resource exhaustion under high load by rejecting
/// requests that would exceed capacity rather than degrading performance for all users.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum number of upload requests processed at once.
    /// Set to 0 for unlimited.
    /// Default: 0 (unlimited)
    pub max_concurrent_uploads: usize,
    /// Maximum number of uploads that can wait in queue for a slot.
    /// When this limit is reached, new uploads receive HTTP 429 immediately.
    /// Set to 0 for unlimited waiting queue (not recommended).
    /// Default: 20
    pub max_waiting_uploads: usize,
    /// Maximum time to wait for an upload slot before returning HTTP 429.
    /// Set to 0 to reject immediately when no slot is available.
    /// Default: 60s
    #[serde(with = "humantime_serde")]
    pub max_upload_wait: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            ipfs: IpfsConfig::default(),
            upload: UploadConfig::default(),
            pinning: PinningConfig::default(),
            auth: AuthConfig::default(),
            cors: CorsConfig::default(),
            limits: LimitsConfig::default(),
            enable_metrics: false,
            enable_otel_export: false,
        }
    }
}

impl Default for IpfsConfig {
    fn default() -> Self {
        Self {
            url: Url::parse("http://localhost:5001").expect("static URL is valid"),
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        let allowed_extensions = ["png", "svg", "jpg", "pdf", "doc", "docx", "zip", "json"];
        let allowed_mime_types = [
            "image/png",
            "image/svg+xml",
            "image/jpeg",
            "application/pdf",
            "application/msword",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "application/zip",
            "application/json",
            "application/octet-stream",
        ];

        Self {
            max_file_size: 10 * 1024 * 1024, // 10MB
            max_files: 10,
            allowed_extensions: allowed_extensions.iter().map(|s| s.to_string()).collect(),
            allowed_mime_types: allowed_mime_types.iter().map(|s| (s.to_string(), true)).collect(),
        }
    }
}

impl Default for PinningConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_delay: Duration::from_secs(1),
            backoff: BackoffConfig::Linear,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_keys: Vec::new(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Wildcard],
            allowed_headers: ["Origin", "X-Requested-With", "Content-Type", "Accept", "x-api-key"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_age: Some(3600), // Cache preflight for 1 hour
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_uploads: 0,
            max_waiting_uploads: 20,
            max_upload_wait: Duration::from_secs(60),
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.auth.enabled && self.auth.api_keys.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: API key authentication is enabled but auth.api_keys is empty. \
                     Add at least one key or set auth.enabled=false."
                    .to_string(),
            });
        }

        if self.auth.api_keys.iter().any(|key| key.trim().is_empty()) {
            return Err(Error::Internal {
                operation: "Config validation: auth.api_keys cannot contain empty keys".to_string(),
            });
        }

        if !matches!(self.ipfs.url.scheme(), "http" | "https") {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: ipfs.url must use http or https, got '{}'",
                    self.ipfs.url.scheme()
                ),
            });
        }

        if self.ipfs.timeout.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: ipfs.timeout must be greater than zero".to_string(),
            });
        }

        if self.upload.max_file_size == 0 {
            return Err(Error::Internal {
                operation: "Config validation: upload.max_file_size must be positive (default: 10485760 = 10MB)".to_string(),
            });
        }

        if self.upload.max_files == 0 {
            return Err(Error::Internal {
                operation: "Config validation: upload.max_files must be at least 1".to_string(),
            });
        }

        if self.upload.allowed_extensions.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: upload.allowed_extensions cannot be empty".to_string(),
            });
        }

        if !self.upload.allowed_mime_types.values().any(|enabled| *enabled) {
            return Err(Error::Internal {
                operation: "Config validation: upload.allowed_mime_types must enable at least one media type".to_string(),
            });
        }

        if let BackoffConfig::Exponential { factor, .. } = self.pinning.backoff
            && factor < 1
        {
            return Err(Error::Internal {
                operation: "Config validation: pinning.backoff.factor must be at least 1".to_string(),
            });
        }

        if self.cors.allowed_origins.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: CORS allowed_origins cannot be empty. Add at least one allowed origin.".to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            // (PINGATE_CONFIG names the file itself, not a field)
            .merge(Env::prefixed("PINGATE_").ignore(&["config"]).split("__"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
