use thiserror::Error;
use std::io;

/// Custom result type alias for the application
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors that can occur while analyzing ingredients
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// I/O errors
    #[error("IO error: {0}")]
    IO(#[from] io::Error),

    /// HTTP request/response errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing/serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Network connectivity errors
    #[error("Network error: {0}")]
    Network(String),

    /// Per-call deadline elapsed before the upstream answered
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Upstream answered with a non-success HTTP status
    #[error("{source} returned HTTP {status}")]
    UpstreamStatus {
        /// Name of the upstream source
        // `r#` keeps thiserror from treating this field as the error's source()
        r#source: String,
        /// HTTP status code of the response
        status: u16,
    },

    /// Local token bucket had no permit available
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Bulkhead permit pool saturated within the acquire window
    #[error("Bulkhead saturated: {0}")]
    BulkheadSaturated(String),

    /// Circuit breaker denied the call
    #[error("Circuit open: {0}")]
    CircuitOpen(String),

    /// Response body could not be turned into a typed payload
    #[error("Parse error: {0}")]
    Parse(String),

    /// Language model errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Input validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// General message errors
    #[error("{0}")]
    Message(String),
}

impl AnalysisError {
    /// Creates a new error with the specified message
    pub fn new(message: &str) -> Self {
        Self::Message(message.to_string())
    }

    /// Checks if this error is transient and retryable
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::IO(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::UpstreamStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Checks if this error indicates a deployment mistake rather than a
    /// runtime condition to degrade from
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Validation(_))
    }
}
