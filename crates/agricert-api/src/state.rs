//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! ## Architecture
//!
//! AppState holds:
//! - **Lifecycle**: the engine owning the ledger and the signing, QR and
//!   attachment-storage capabilities.
//! - **Config**: environment-driven settings, read once at startup.
//! - **Prometheus handle**: present when `METRICS_ENABLED=true`.
//!
//! The credential template is parsed once here and shared read-only
//! behind an `Arc` for the life of the process.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use thiserror::Error;

use agricert_crypto::Ed25519KeyPair;
use agricert_vc::{
    CredentialTemplate, Ed25519Signer, PlaceholderSigner, Signer, SvgQrEncoder, VcError,
};

use crate::attachments::UnsignedLinkStorage;
use crate::lifecycle::Lifecycle;
use crate::store::Ledger;

// ── Configuration ───────────────────────────────────────────────────────────

/// Which [`Signer`] implementation signs credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerKind {
    Ed25519,
    /// Hash-based stand-in. Development only.
    Placeholder,
}

impl FromStr for SignerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ed25519" => Ok(Self::Ed25519),
            "placeholder" => Ok(Self::Placeholder),
            other => Err(format!("expected ed25519 or placeholder, got {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected text or json, got {other:?}")),
        }
    }
}

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Shared bearer secret. If `None`, authentication is disabled.
    pub auth_token: Option<String>,
    /// Prefix of credential verification URLs.
    pub base_url: String,
    /// Postgres URL. If `None`, the ledger is memory-only.
    pub database_url: Option<String>,
    pub signer: SignerKind,
    /// Hex Ed25519 seed. If `None`, an ephemeral key is generated.
    pub signing_key_hex: Option<String>,
    /// YAML credential template. If `None`, the built-in template is used.
    pub credential_template: Option<PathBuf>,
    pub metrics_enabled: bool,
    pub log_format: LogFormat,
    /// Verification log entries kept by the memory-only ledger.
    pub verification_log_capacity: usize,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &redact(&self.auth_token))
            .field("base_url", &self.base_url)
            .field("database_url", &redact(&self.database_url))
            .field("signer", &self.signer)
            .field("signing_key_hex", &redact(&self.signing_key_hex))
            .field("credential_template", &self.credential_template)
            .field("metrics_enabled", &self.metrics_enabled)
            .field("log_format", &self.log_format)
            .field("verification_log_capacity", &self.verification_log_capacity)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            auth_token: None,
            base_url: "http://localhost:3000".to_string(),
            database_url: None,
            signer: SignerKind::Ed25519,
            signing_key_hex: None,
            credential_template: None,
            metrics_enabled: false,
            log_format: LogFormat::Text,
            verification_log_capacity: crate::store::DEFAULT_LOG_CAPACITY,
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let port = match get("PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                var: "PORT",
                reason: format!("not a port number: {raw:?}"),
            })?,
            None => defaults.port,
        };
        let signer = match get("SIGNER") {
            Some(raw) => raw
                .parse()
                .map_err(|reason| ConfigError::Invalid { var: "SIGNER", reason })?,
            None => defaults.signer,
        };
        let log_format = match get("LOG_FORMAT") {
            Some(raw) => raw
                .parse()
                .map_err(|reason| ConfigError::Invalid { var: "LOG_FORMAT", reason })?,
            None => defaults.log_format,
        };
        let metrics_enabled = match get("METRICS_ENABLED") {
            Some(raw) => parse_flag(&raw).ok_or_else(|| ConfigError::Invalid {
                var: "METRICS_ENABLED",
                reason: format!("expected true or false, got {raw:?}"),
            })?,
            None => defaults.metrics_enabled,
        };
        let verification_log_capacity = match get("VERIFICATION_LOG_CAPACITY") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                var: "VERIFICATION_LOG_CAPACITY",
                reason: format!("not an entry count: {raw:?}"),
            })?,
            None => defaults.verification_log_capacity,
        };

        Ok(Self {
            port,
            auth_token: get("AUTH_TOKEN"),
            base_url: get("BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            database_url: get("DATABASE_URL"),
            signer,
            signing_key_hex: get("SIGNING_KEY_HEX"),
            credential_template: get("CREDENTIAL_TEMPLATE").map(PathBuf::from),
            metrics_enabled,
            log_format,
            verification_log_capacity,
        })
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Startup configuration failures. The server refuses to start rather
/// than run with a half-applied setting.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },

    /// `SIGNING_KEY_HEX` is set but is not a 32-byte hex seed.
    #[error("SIGNING_KEY_HEX is invalid: {0}")]
    SigningKey(#[from] agricert_crypto::CryptoError),

    #[error(transparent)]
    Template(#[from] VcError),
}

/// Build the configured signer.
///
/// With `SIGNER=ed25519` and no `SIGNING_KEY_HEX`, a fresh key is
/// generated and a warning is logged.
fn build_signer(
    config: &AppConfig,
    template: &CredentialTemplate,
) -> Result<Arc<dyn Signer>, ConfigError> {
    let verification_method = template.verification_method();
    match config.signer {
        SignerKind::Placeholder => {
            tracing::warn!("SIGNER=placeholder: credentials carry hash proofs, not signatures");
            Ok(Arc::new(PlaceholderSigner::new(verification_method)))
        }
        SignerKind::Ed25519 => {
            let key = match &config.signing_key_hex {
                Some(hex) => Ed25519KeyPair::from_seed_hex(hex.trim())?,
                None => {
                    tracing::warn!(
                        "SIGNING_KEY_HEX not set, generating ephemeral key. \
                         Credentials signed with this key will not verify after restart."
                    );
                    Ed25519KeyPair::generate()
                }
            };
            Ok(Arc::new(Ed25519Signer::new(key, verification_method)))
        }
    }
}

// ── AppState ────────────────────────────────────────────────────────────────

/// Shared application state. Clone-friendly via `Arc` internals.
#[derive(Debug, Clone)]
pub struct AppState {
    pub lifecycle: Arc<Lifecycle>,
    pub config: AppConfig,
    /// Present when the Prometheus recorder was installed.
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire the engine from `config` over `ledger`: load the template,
    /// build the signer and the QR encoder.
    pub fn build(config: AppConfig, ledger: Ledger) -> Result<Self, ConfigError> {
        let template = Arc::new(CredentialTemplate::load(config.credential_template.as_deref())?);
        let signer = build_signer(&config, &template)?;
        let qr = Arc::new(SvgQrEncoder::new(template.qr.clone()));
        let attachments = Arc::new(UnsignedLinkStorage::new(&config.base_url));
        let lifecycle = Lifecycle::new(
            Arc::new(ledger),
            signer,
            qr,
            template,
            attachments,
            &config.base_url,
        );
        Ok(Self {
            lifecycle: Arc::new(lifecycle),
            config,
            prometheus: None,
        })
    }

    /// Memory-only state with default configuration.
    pub fn in_memory() -> Result<Self, ConfigError> {
        Self::build(AppConfig::default(), Ledger::in_memory())
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    pub fn ledger(&self) -> &Ledger {
        self.lifecycle.ledger()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.base_url, "http://localhost:3000");
        assert_eq!(config.signer, SignerKind::Ed25519);
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.auth_token.is_none());
        assert!(!config.metrics_enabled);
        assert_eq!(config.verification_log_capacity, 10_000);
    }

    #[test]
    fn reads_every_variable() {
        let config = AppConfig::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("AUTH_TOKEN", "s3cret"),
            ("BASE_URL", "https://certs.example.org/"),
            ("SIGNER", "placeholder"),
            ("METRICS_ENABLED", "true"),
            ("LOG_FORMAT", "json"),
            ("CREDENTIAL_TEMPLATE", "/etc/agricert/template.yaml"),
            ("VERIFICATION_LOG_CAPACITY", "500"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.auth_token.as_deref(), Some("s3cret"));
        assert_eq!(config.base_url, "https://certs.example.org");
        assert_eq!(config.signer, SignerKind::Placeholder);
        assert!(config.metrics_enabled);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.credential_template,
            Some(PathBuf::from("/etc/agricert/template.yaml"))
        );
        assert_eq!(config.verification_log_capacity, 500);
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(AppConfig::from_lookup(lookup(&[("PORT", "eighty")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("SIGNER", "rsa")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("METRICS_ENABLED", "maybe")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("VERIFICATION_LOG_CAPACITY", "-1")])).is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = AppConfig {
            auth_token: Some("super-secret".into()),
            database_url: Some("postgres://u:pw@db/agricert".into()),
            signing_key_hex: Some("ab".repeat(32)),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("pw@db"));
        assert!(!debug.contains("abab"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn bad_signing_key_refuses_to_start() {
        let config = AppConfig {
            signing_key_hex: Some("not-hex".into()),
            ..AppConfig::default()
        };
        assert!(matches!(
            AppState::build(config, Ledger::in_memory()),
            Err(ConfigError::SigningKey(_))
        ));
    }

    #[test]
    fn in_memory_state_uses_memory_backend() {
        let state = AppState::in_memory().unwrap();
        assert_eq!(state.ledger().backend(), "memory");
    }
}
