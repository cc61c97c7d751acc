//! Error types for the grouptag planning engine.
//!
//! This module provides a comprehensive error hierarchy for all operations
//! in the planning lifecycle: rules parsing, NSX API access, plan
//! construction, and plan application.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the grouptag planning engine.
#[derive(Debug, Error)]
pub enum GroupTagError {
    /// Rules table errors.
    #[error("Rules error: {0}")]
    Rules(#[from] RulesError),

    /// NSX API errors.
    #[error("NSX API error: {0}")]
    Nsx(#[from] NsxError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Rules table errors.
#[derive(Debug, Error)]
pub enum RulesError {
    /// The rules file was not found.
    #[error("Rules file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The rules file could not be parsed.
    #[error("Failed to parse rules: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Line number in the rules file, if known.
        line: Option<usize>,
    },

    /// No header record was found.
    #[error("No header record found: expected a row containing an ObjectType cell")]
    NoHeader,

    /// A sentinel column is missing from the header.
    #[error("Missing required column in rules header: {column}")]
    MissingColumn {
        /// Name of the missing column.
        column: String,
    },
}

/// NSX API errors.
#[derive(Debug, Error)]
pub enum NsxError {
    /// No manager was configured.
    #[error("No NSX manager specified: pass --manager or set GROUPTAG_NSX_MANAGER")]
    ManagerNotConfigured,

    /// Authentication failed.
    #[error("NSX authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// API request failed.
    #[error("NSX API request failed: {status} - {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Rate limited.
    #[error("NSX API rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Object not found.
    #[error("NSX object not found: {path}")]
    NotFound {
        /// Policy path or URL of the missing object.
        path: String,
    },

    /// Network error.
    #[error("Network error communicating with NSX: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from the API.
    #[error("Invalid response from NSX API: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// An IP specifier could not be parsed.
    #[error("Invalid IP specifier '{spec}': {reason}")]
    InvalidIpSpec {
        /// The offending specifier token.
        spec: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An expression would exceed the policy API term limit.
    #[error("Too many conditions in expression: {count} exceeds the maximum of 5")]
    TooManyConditions {
        /// Number of non-conjunction terms requested.
        count: usize,
    },

    /// Two expressions of a kind the dedup pass cannot compare.
    #[error("Cannot compare expressions of type {kind}")]
    UnsupportedComparison {
        /// The expression kind.
        kind: String,
    },

    /// The plan document was not found.
    #[error("Plan document not found: {path}")]
    DocumentNotFound {
        /// Path to the missing document.
        path: PathBuf,
    },

    /// The plan document could not be parsed.
    #[error("Failed to parse plan document: {message}")]
    DocumentParse {
        /// Description of the parse error.
        message: String,
    },
}

/// Result type alias for grouptag operations.
pub type Result<T> = std::result::Result<T, GroupTagError>;

impl GroupTagError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Nsx(NsxError::RateLimited { .. } | NsxError::NetworkError { .. })
        )
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Nsx(NsxError::RateLimited { retry_after_secs }) => Some(*retry_after_secs),
            Self::Nsx(NsxError::NetworkError { .. }) => Some(5),
            _ => None,
        }
    }
}

impl RulesError {
    /// Creates a parse error tied to a line in the rules file.
    #[must_use]
    pub fn parse_at(message: impl Into<String>, line: usize) -> Self {
        Self::ParseError {
            message: message.into(),
            line: Some(line),
        }
    }

    /// Creates a parse error without a line number.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
            line: None,
        }
    }
}

impl NsxError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates an invalid-response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}

impl PlanError {
    /// Creates an invalid-IP-specifier error.
    #[must_use]
    pub fn invalid_ip(spec: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIpSpec {
            spec: spec.into(),
            reason: reason.into(),
        }
    }
}
