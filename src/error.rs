//! Error types for the heat-pump portal client
//!
//! This module provides structured error handling with machine-readable error
//! codes, severities and production-safe messages. The variants map onto the
//! failure classes a caller has to tell apart: the network is down, the
//! credentials were rejected, the portal refused a data request even after a
//! fresh login, or the portal answered with something we could not parse.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for portal operations
pub type Result<T> = std::result::Result<T, PortalError>;

/// Error types for portal operations
#[derive(Error, Debug)]
pub enum PortalError {
    /// Connection failures (DNS, refused, reset)
    #[error("Network error: {0}")]
    Network(String),

    /// The per-request timeout elapsed
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// A login handshake step failed, or the credentials were rejected
    #[error("Authentication failed: {message}")]
    Authentication {
        message: String,
        /// `true` when the portal rejected the credentials themselves,
        /// `false` for structural/protocol failures during the handshake
        auth_failure: bool,
    },

    /// A data endpoint answered with a non-success status
    #[error("API error{}: {message}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Api {
        status: Option<u16>,
        message: String,
        /// `true` when the failure was an auth rejection that survived the retry
        auth_failure: bool,
    },

    /// Response body could not be interpreted
    #[error("Parsing error: {0}")]
    Parsing(String),

    /// HTTP client errors not covered by the classes above
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Structured error code for machine-readable error handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Connection errors (1000-1099)
    ConnectionTimeout,
    ConnectionLost,

    // Authentication errors (1100-1199)
    InvalidCredentials,
    AuthenticationExpired,
    HandshakeFailed,

    // Configuration errors (1200-1299)
    ConfigurationInvalid,

    // Data errors (1400-1499)
    ParsingFailed,
    InvalidInput,

    // Service errors (1600-1699)
    ServiceRejected,

    // Internal errors (1900-1999)
    InternalError,
}

impl ErrorCode {
    /// Get numeric error code
    pub fn as_number(&self) -> u32 {
        match self {
            ErrorCode::ConnectionTimeout => 1001,
            ErrorCode::ConnectionLost => 1003,

            ErrorCode::InvalidCredentials => 1101,
            ErrorCode::AuthenticationExpired => 1102,
            ErrorCode::HandshakeFailed => 1103,

            ErrorCode::ConfigurationInvalid => 1202,

            ErrorCode::ParsingFailed => 1401,
            ErrorCode::InvalidInput => 1402,

            ErrorCode::ServiceRejected => 1603,

            ErrorCode::InternalError => 1901,
        }
    }

    /// Get error category
    pub fn category(&self) -> &'static str {
        match self.as_number() {
            1000..=1099 => "connection",
            1100..=1199 => "authentication",
            1200..=1299 => "configuration",
            1400..=1499 => "data",
            1600..=1699 => "service",
            1900..=1999 => "internal",
            _ => "unknown",
        }
    }
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Low severity - information only
    Info,
    /// Medium severity - warning condition
    Warning,
    /// High severity - error condition
    Error,
    /// Critical severity - immediate attention required
    Critical,
}

impl PortalError {
    /// Create a network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        PortalError::Network(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        PortalError::Timeout(msg.into())
    }

    /// Create a structural authentication error (handshake step failed)
    pub fn authentication<S: Into<String>>(msg: S) -> Self {
        PortalError::Authentication {
            message: msg.into(),
            auth_failure: false,
        }
    }

    /// Create an authentication error for rejected credentials
    pub fn invalid_credentials<S: Into<String>>(msg: S) -> Self {
        PortalError::Authentication {
            message: msg.into(),
            auth_failure: true,
        }
    }

    /// Create an API error for a non-success status
    pub fn api<S: Into<String>>(status: Option<u16>, msg: S) -> Self {
        PortalError::Api {
            status,
            message: msg.into(),
            auth_failure: false,
        }
    }

    /// Create an API error for an auth rejection that outlived the retry
    pub fn api_auth_failure<S: Into<String>>(status: Option<u16>, msg: S) -> Self {
        PortalError::Api {
            status,
            message: msg.into(),
            auth_failure: true,
        }
    }

    /// Create a parsing error
    pub fn parsing<S: Into<String>>(msg: S) -> Self {
        PortalError::Parsing(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        PortalError::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        PortalError::InvalidInput(msg.into())
    }

    /// Convert a transport error into the matching error class.
    ///
    /// Timeouts and connection failures become [`PortalError::Timeout`] and
    /// [`PortalError::Network`] so callers never confuse "network down" with
    /// "credentials wrong".
    pub fn from_transport(context: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PortalError::timeout(format!("{context}: {err}"))
        } else if err.is_connect() || err.is_request() {
            PortalError::network(format!("{context}: {err}"))
        } else {
            PortalError::Http(err)
        }
    }

    /// Map error to structured error code
    pub fn to_error_code(&self) -> ErrorCode {
        match self {
            PortalError::Network(_) => ErrorCode::ConnectionLost,
            PortalError::Timeout(_) => ErrorCode::ConnectionTimeout,
            PortalError::Authentication {
                auth_failure: true, ..
            } => ErrorCode::InvalidCredentials,
            PortalError::Authentication { .. } => ErrorCode::HandshakeFailed,
            PortalError::Api {
                auth_failure: true, ..
            } => ErrorCode::AuthenticationExpired,
            PortalError::Api { .. } => ErrorCode::ServiceRejected,
            PortalError::Parsing(_) | PortalError::Json(_) => ErrorCode::ParsingFailed,
            PortalError::Http(_) => ErrorCode::ConnectionLost,
            PortalError::Config(_) => ErrorCode::ConfigurationInvalid,
            PortalError::InvalidInput(_) => ErrorCode::InvalidInput,
            PortalError::Io(_) => ErrorCode::InternalError,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PortalError::Authentication {
                auth_failure: true, ..
            } => ErrorSeverity::Critical,
            PortalError::Config(_) => ErrorSeverity::Critical,
            PortalError::Network(_) | PortalError::Timeout(_) | PortalError::Http(_) => {
                ErrorSeverity::Warning
            }
            PortalError::InvalidInput(_) => ErrorSeverity::Info,
            _ => ErrorSeverity::Error,
        }
    }

    /// Check if the caller may reasonably retry the operation later.
    ///
    /// The client itself never retries network failures.
    pub fn is_retryable(&self) -> bool {
        match self {
            PortalError::Network(_) | PortalError::Timeout(_) | PortalError::Http(_) => true,
            PortalError::Authentication { auth_failure, .. } => !auth_failure,
            PortalError::Api { status, .. } => matches!(status, Some(500..=599)),
            _ => false,
        }
    }

    /// Check if this is an authentication-related error
    pub fn is_auth_error(&self) -> bool {
        match self {
            PortalError::Authentication { .. } => true,
            PortalError::Api { auth_failure, .. } => *auth_failure,
            _ => false,
        }
    }

    /// Check if this error came from the network rather than the portal
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            PortalError::Network(_) | PortalError::Timeout(_) | PortalError::Http(_)
        )
    }

    /// Get a message that is safe to surface outside the process
    pub fn sanitized_message(&self) -> String {
        match self {
            PortalError::Network(_) | PortalError::Http(_) => {
                "Unable to reach the heat-pump portal".to_string()
            }
            PortalError::Timeout(_) => "The heat-pump portal did not answer in time".to_string(),
            PortalError::Authentication {
                auth_failure: true, ..
            } => "The portal rejected the configured credentials".to_string(),
            PortalError::Authentication { .. } => "Login to the portal failed".to_string(),
            PortalError::Api {
                auth_failure: true, ..
            } => "The portal session could not be re-established".to_string(),
            PortalError::Api { status, .. } => match status {
                Some(code) => format!("The portal rejected the request ({code})"),
                None => "The portal rejected the request".to_string(),
            },
            PortalError::Parsing(_) | PortalError::Json(_) => {
                "Unexpected response from the portal".to_string()
            }
            PortalError::Config(msg) => format!("Configuration error: {msg}"),
            PortalError::InvalidInput(msg) => format!("Invalid input: {msg}"),
            PortalError::Io(_) => "Internal I/O error".to_string(),
        }
    }
}

impl From<regex::Error> for PortalError {
    fn from(err: regex::Error) -> Self {
        PortalError::InvalidInput(format!("Regex pattern error: {err}"))
    }
}

impl From<config::ConfigError> for PortalError {
    fn from(err: config::ConfigError) -> Self {
        PortalError::Config(err.to_string())
    }
}

impl From<url::ParseError> for PortalError {
    fn from(err: url::ParseError) -> Self {
        PortalError::Config(format!("Invalid URL: {err}"))
    }
}
