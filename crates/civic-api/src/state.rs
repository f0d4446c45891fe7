//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers via
//! the `State` extractor, plus the environment-driven configuration it is
//! built from.
//!
//! The workflow engine owns all request state; the API layer holds only a
//! handle to it. Whether the engine sits on PostgreSQL or on the in-memory
//! store is decided once at startup.

use std::sync::Arc;

use civic_workflow::{Action, MemoryStore, WorkflowEngine, WorkflowPolicy, WorkflowStore};
use metrics_exporter_prometheus::PrometheusHandle;
use thiserror::Error;

// -- Configuration ------------------------------------------------------------

/// Log output format for the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Invalid configuration. Fatal at startup; never silently defaulted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("PORT must be a port number, got '{0}'")]
    InvalidPort(String),

    #[error("LOG_FORMAT must be 'json' or 'text', got '{0}'")]
    InvalidLogFormat(String),

    #[error("CIVIC_REASON_REQUIRED names unknown action '{0}'")]
    UnknownAction(String),

    #[error("CIVIC_MAX_REASON_LEN must be a positive integer, got '{0}'")]
    InvalidReasonLength(String),
}

/// Application configuration.
///
/// Custom `Debug` redacts the auth token.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Shared bearer secret. If `None`, authentication runs in development mode.
    pub auth_token: Option<String>,
    /// Log output format.
    pub log_format: LogFormat,
    /// Business rules handed to the workflow engine.
    pub policy: WorkflowPolicy,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("log_format", &self.log_format)
            .field("policy", &self.policy)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            log_format: LogFormat::Text,
            policy: WorkflowPolicy::default(),
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which returns a variable's value
    /// if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(raw))?,
            None => defaults.port,
        };

        let auth_token = lookup("AUTH_TOKEN").filter(|t| !t.is_empty());

        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("") | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => return Err(ConfigError::InvalidLogFormat(other.to_string())),
        };

        let mut reason_required = match lookup("CIVIC_REASON_REQUIRED") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(|name| {
                    Action::from_name(name).ok_or_else(|| ConfigError::UnknownAction(name.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => defaults.policy.reason_required,
        };
        if !reason_required.contains(&Action::Reject) {
            reason_required.insert(0, Action::Reject);
        }

        let max_reason_len = match lookup("CIVIC_MAX_REASON_LEN") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError::InvalidReasonLength(raw)),
            },
            None => defaults.policy.max_reason_len,
        };

        Ok(Self {
            port,
            auth_token,
            log_format,
            policy: WorkflowPolicy {
                reason_required,
                max_reason_len,
            },
        })
    }
}

// -- Application State --------------------------------------------------------

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The lifecycle engine all handlers delegate to.
    pub engine: Arc<WorkflowEngine>,
    /// Startup configuration.
    pub config: AppConfig,
    /// Prometheus handle for `/metrics`, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// In-memory state with default configuration.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    /// In-memory state with the given configuration.
    pub fn with_config(config: AppConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    /// State over an explicit store.
    pub fn with_store(config: AppConfig, store: Arc<dyn WorkflowStore>) -> Self {
        let engine = WorkflowEngine::new(store, config.policy.clone());
        Self {
            engine: Arc::new(engine),
            config,
            metrics: None,
        }
    }

    /// Attach a Prometheus handle, enabling `/metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
