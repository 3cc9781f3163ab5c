//! Error types for replica
//!
//! Every operation in the engine returns [`ReplicaError`]. The variants follow
//! the behavioral error kinds the transfer engine reacts to: `Stopped` unwinds a
//! job cleanly, `NotFound` is absorbed by delete paths, transient failures are
//! retried, and the rest are surfaced to the caller.

use thiserror::Error;


/// Main error type for replica operations
#[derive(Error, Debug)]
pub enum ReplicaError {
    /// The host asked the job to stop.
    #[error("stopped")]
    Stopped,

    /// Network-related errors (connection, timeout, DNS, broken streams)
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Authentication errors (401, 403, token issues)
    #[error("Authentication error (status: {status_code:?}): {message}")]
    Authentication {
        message: String,
        status_code: Option<u16>,
    },

    /// Resource not found errors (404)
    #[error("{resource_type} not found: {name}")]
    NotFound { resource_type: String, name: String },

    /// Rate limiting errors (429)
    #[error("Rate limit: {message}")]
    RateLimit {
        message: String,
        retry_after: Option<u64>,
    },

    /// Server errors (500, 503)
    #[error("Server error (status: {status_code}): {message}")]
    Server { message: String, status_code: u16 },

    /// The caller asked for something that does not exist in a closed set
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// Validation errors (invalid manifest, digest mismatch, etc.)
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The adapter does not implement an optional capability
    #[error("{operation} is not supported by the {adapter} adapter")]
    Unsupported { adapter: String, operation: String },

    /// A registry adapter could not be constructed
    #[error("Adapter error: {message}")]
    Adapter {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Misuse of a name-keyed registry (empty or duplicate name, unknown name)
    #[error("Registration error: {message}")]
    Registration { message: String },

    /// Configuration errors (invalid tunables, missing settings)
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// At least one artifact of a job failed permanently
    #[error("got error during the whole transfer period, mark the job failure ({failed} failed)")]
    TransferFailed { failed: usize },
}

/// Result type alias for replica operations
pub type Result<T> = std::result::Result<T, ReplicaError>;

impl ReplicaError {
    /// Creates a new network error.
    ///
    /// # Examples
    ///
    /// ```
    /// use libreplica::error::ReplicaError;
    ///
    /// let err = ReplicaError::network("connection refused");
    /// assert!(matches!(err, ReplicaError::Network { .. }));
    /// ```
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new network error with a source error.
    ///
    /// # Examples
    ///
    /// ```
    /// use libreplica::error::ReplicaError;
    /// use std::io;
    ///
    /// let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
    /// let err = ReplicaError::network_with_source("failed to connect", io_err);
    /// assert!(matches!(err, ReplicaError::Network { .. }));
    /// ```
    pub fn network_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new authentication error.
    pub fn authentication<S: Into<String>>(message: S, status_code: Option<u16>) -> Self {
        Self::Authentication {
            message: message.into(),
            status_code,
        }
    }

    /// Creates a new not found error.
    ///
    /// # Examples
    ///
    /// ```
    /// use libreplica::error::ReplicaError;
    ///
    /// let err = ReplicaError::not_found("tag", "library/alpine:3.19");
    /// assert!(err.is_not_found());
    /// ```
    pub fn not_found<S: Into<String>, N: Into<String>>(resource_type: S, name: N) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }

    /// Creates a new rate limit error.
    pub fn rate_limit<S: Into<String>>(message: S, retry_after: Option<u64>) -> Self {
        Self::RateLimit {
            message: message.into(),
            retry_after,
        }
    }

    /// Creates a new server error.
    pub fn server<S: Into<String>>(message: S, status_code: u16) -> Self {
        Self::Server {
            message: message.into(),
            status_code,
        }
    }

    /// Creates a new bad request error.
    ///
    /// # Examples
    ///
    /// ```
    /// use libreplica::error::ReplicaError;
    ///
    /// let err = ReplicaError::bad_request("unknown addition CHANGELOG");
    /// assert!(matches!(err, ReplicaError::BadRequest { .. }));
    /// ```
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Creates a new validation error.
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new validation error with a source error.
    pub fn validation_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Validation {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new unsupported-operation error.
    pub fn unsupported<A: Into<String>, O: Into<String>>(adapter: A, operation: O) -> Self {
        Self::Unsupported {
            adapter: adapter.into(),
            operation: operation.into(),
        }
    }

    /// Creates a new adapter construction error.
    pub fn adapter<S: Into<String>>(message: S) -> Self {
        Self::Adapter {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new adapter construction error with a source error.
    pub fn adapter_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Adapter {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new registration error.
    pub fn registration<S: Into<String>>(message: S) -> Self {
        Self::Registration {
            message: message.into(),
        }
    }

    /// Creates a new configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new configuration error with a source error.
    pub fn config_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true if this is the stop sentinel.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Returns true if the remote reported the content as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<std::io::Error> for ReplicaError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::Interrupted {
            return Self::Stopped;
        }
        Self::network_with_source("I/O failure while streaming content", err)
    }
}

impl From<config::ConfigError> for ReplicaError {
    fn from(err: config::ConfigError) -> Self {
        Self::config_with_source("Failed to build configuration", err)
    }
}
