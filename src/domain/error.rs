//! Error handling types
//!
//! The error kinds form a closed set. Callers match on the kind to decide
//! whether to retry, abort the run, or surface the failure to the user;
//! front-ends map kinds to process exit codes via [`Error::exit_code`].

use std::collections::BTreeMap;

use thiserror::Error;

/// Result type alias for operations that can fail
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the codescout core
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or incomplete settings; fatal at startup
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem
        message: String,
    },

    /// Caller-visible bad input (filter, span, query DSL); non-fatal
    #[error("Validation error: {message}")]
    Validation {
        /// Description of the invalid input
        message: String,
    },

    /// Transient provider failure; circuit-breaker governed and retriable
    #[error("Provider '{provider}' unavailable: {message}")]
    ProviderUnavailable {
        /// Name of the failing provider
        provider: String,
        /// Description of the failure
        message: String,
        /// Whether the call was rejected by an open circuit
        circuit_open: bool,
    },

    /// Auth failure or quota exhaustion; fatal for that provider for the run
    #[error("Provider '{provider}' failed permanently: {message}")]
    ProviderFatal {
        /// Name of the failing provider
        provider: String,
        /// Description of the failure
        message: String,
    },

    /// Embedding dimensionality does not match the collection
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensionality declared by the collection
        expected: usize,
        /// Dimensionality observed
        actual: usize,
    },

    /// Collection metadata records a different provider than configured
    #[error("Provider switch detected: collection was built by '{recorded}', configured provider is '{configured}'")]
    ProviderSwitch {
        /// Provider recorded in collection metadata
        recorded: String,
        /// Currently configured provider
        configured: String,
    },

    /// Queried collection does not exist
    #[error("Collection not found: {collection}")]
    CollectionNotFound {
        /// Name of the missing collection
        collection: String,
    },

    /// Manifest or checkpoint IO failure
    #[error("Persistence error: {message}")]
    Persistence {
        /// Description of the IO failure
        message: String,
    },

    /// Cooperative cancellation; not an error for the caller
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a transient provider error
    pub fn provider_unavailable<P: Into<String>, S: Into<String>>(provider: P, message: S) -> Self {
        Self::ProviderUnavailable {
            provider: provider.into(),
            message: message.into(),
            circuit_open: false,
        }
    }

    /// Create a fail-fast error for an open circuit
    pub fn circuit_open<P: Into<String>>(provider: P) -> Self {
        Self::ProviderUnavailable {
            provider: provider.into(),
            message: "circuit breaker open".to_string(),
            circuit_open: true,
        }
    }

    /// Create a fatal provider error
    pub fn provider_fatal<P: Into<String>, S: Into<String>>(provider: P, message: S) -> Self {
        Self::ProviderFatal {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a persistence error
    pub fn persistence<S: Into<String>>(message: S) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Whether a retry of the failed operation can succeed
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::ProviderUnavailable { circuit_open, .. } => !circuit_open,
            Self::Persistence { .. } => true,
            _ => false,
        }
    }

    /// Exit code for front-ends: 0 success, 1 generic, 2 configuration,
    /// 3 provider unavailable, 4 data inconsistency.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Cancelled => 0,
            Self::Configuration { .. } => 2,
            Self::ProviderUnavailable { .. } | Self::ProviderFatal { .. } => 3,
            Self::DimensionMismatch { .. }
            | Self::ProviderSwitch { .. }
            | Self::CollectionNotFound { .. } => 4,
            Self::Validation { .. } | Self::Persistence { .. } => 1,
        }
    }

    /// Machine-readable kind name, used in error summaries and responses
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Validation { .. } => "validation",
            Self::ProviderUnavailable { .. } => "provider_unavailable",
            Self::ProviderFatal { .. } => "provider_fatal",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::ProviderSwitch { .. } => "provider_switch",
            Self::CollectionNotFound { .. } => "collection_not_found",
            Self::Persistence { .. } => "persistence",
            Self::Cancelled => "cancelled",
        }
    }

    /// Structured details for error responses
    pub fn details(&self) -> BTreeMap<String, String> {
        let mut details = BTreeMap::new();
        details.insert("kind".to_string(), self.kind().to_string());
        match self {
            Self::ProviderUnavailable {
                provider,
                circuit_open,
                ..
            } => {
                details.insert("provider".to_string(), provider.clone());
                details.insert("circuit_open".to_string(), circuit_open.to_string());
            }
            Self::ProviderFatal { provider, .. } => {
                details.insert("provider".to_string(), provider.clone());
            }
            Self::DimensionMismatch { expected, actual } => {
                details.insert("expected".to_string(), expected.to_string());
                details.insert("actual".to_string(), actual.to_string());
            }
            Self::ProviderSwitch {
                recorded,
                configured,
            } => {
                details.insert("recorded".to_string(), recorded.clone());
                details.insert("configured".to_string(), configured.clone());
            }
            Self::CollectionNotFound { collection } => {
                details.insert("collection".to_string(), collection.clone());
            }
            _ => {}
        }
        details
    }

    /// Actionable suggestions surfaced with error responses
    pub fn suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Configuration { .. } => vec![
                "check the configuration file against the documented sections",
                "remove unrecognized options",
            ],
            Self::Validation { .. } => vec!["correct the input and retry the request"],
            Self::ProviderUnavailable { .. } => vec![
                "verify the provider endpoint is reachable",
                "retry after the cooldown window",
            ],
            Self::ProviderFatal { .. } => {
                vec!["check provider credentials and quota before restarting the run"]
            }
            Self::DimensionMismatch { .. } => vec![
                "reindex the project with the configured model",
                "or restore the previously configured embedding model",
            ],
            Self::ProviderSwitch { .. } => vec![
                "reindex into a fresh collection",
                "or restore the recorded provider in configuration",
            ],
            Self::CollectionNotFound { .. } => vec!["run a full index to create the collection"],
            Self::Persistence { .. } => vec!["check permissions on the state directory"],
            Self::Cancelled => vec![],
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence {
            message: format!("JSON serialization failed: {err}"),
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration {
            message: err.to_string(),
        }
    }
}
