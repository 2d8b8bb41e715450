//! Agent error types.
//!
//! Every stage of the provider engine surfaces failures through
//! [`AgentError`].  The variants double as the retry taxonomy: the transport
//! loop asks [`AgentError::is_retryable`] before scheduling another attempt,
//! and [`AgentError::is_cancellation`] short-circuits it entirely.

use std::fmt;

/// Why a call stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller cancelled the scope explicitly.
    Cancelled,
    /// The scope's deadline passed.
    DeadlineExceeded,
    /// The event consumer went away, so nobody is listening anymore.
    ConsumerGone,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
            Self::ConsumerGone => write!(f, "event consumer dropped"),
        }
    }
}

/// Unified error type for the provider engine.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    // -- Transport -----------------------------------------------------------
    /// The request never produced a response (connect, TLS, DNS, ...).
    #[error("transport error: {source}")]
    Transport {
        #[source]
        source: reqwest::Error,
    },

    /// The provider answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    // -- Stream --------------------------------------------------------------
    /// A single chunk could not be parsed.  The decoder logs and skips these.
    #[error("malformed stream chunk: {reason}")]
    Decode { reason: String },

    /// Reading the response body failed part-way through.
    #[error("stream read error: {reason}")]
    StreamRead { reason: String },

    // -- Control -------------------------------------------------------------
    /// The call was cancelled or ran past its deadline.
    #[error("request {reason}")]
    Cancelled { reason: CancelReason },

    /// Every allowed attempt failed; wraps the last cause.
    #[error("maximum retry attempts reached after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: Box<AgentError>,
    },

    /// The request payload or URL could not be built.  No attempt was made.
    #[error("failed to build request: {reason}")]
    RequestBuild { reason: String },

    /// The stream closed without producing a terminal event.
    #[error("no response received from provider stream")]
    NoResponse,

    // -- Configuration -------------------------------------------------------
    /// Configuration loading or validation failed.
    #[error("config error: {reason}")]
    Config { reason: String },

    // -- Serialization -------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the agent crate.
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Shorthand for a cancellation error.
    pub fn cancelled(reason: CancelReason) -> Self {
        Self::Cancelled { reason }
    }

    /// Returns `true` for cancellation and deadline failures, which are
    /// always fatal.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Whether the retry loop may schedule another attempt after this error.
    ///
    /// Transport failures and body read failures are transient; of the HTTP
    /// statuses only 429 and 5xx are.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::StreamRead { .. } => true,
            Self::HttpStatus { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

/// Rate limiting and server errors are worth another attempt.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport { source: err }
    }
}
