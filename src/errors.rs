/*!
 * Error types for the subrelay application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

use thiserror::Error;

/// Errors that can occur when talking to a translation backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
}

impl ProviderError {
    /// Whether another attempt could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed(_) | Self::ConnectionError(_) | Self::RateLimitExceeded(_) => true,
            Self::ParseError(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500 || *status_code == 429,
            Self::AuthenticationError(_) => false,
        }
    }
}

/// Errors that can occur during subtitle processing
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubtitleError {
    /// The document did not yield a single subtitle entry
    #[error("Malformed subtitle document: {0}")]
    MalformedDocument(String),

    /// Two documents that must stay aligned have different entry counts
    #[error("Entry count mismatch: expected {expected} entries, found {actual}")]
    EntryCountMismatch {
        /// Entries in the source document
        expected: usize,
        /// Entries in the compared document
        actual: usize,
    },

    /// The bytes could not be decoded with the requested encoding
    #[error("Failed to decode subtitle text as {encoding}: {message}")]
    Decoding {
        /// Encoding label
        encoding: String,
        /// Decoder message
        message: String,
    },
}

/// Errors that can occur during translation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranslationError {
    /// Error from the provider API
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error with subtitle processing
    #[error("Subtitle error: {0}")]
    Subtitle(#[from] SubtitleError),

    /// The retry bound was hit without a successful call
    #[error("Translation failed after {attempts} attempts: {last_error}")]
    TranslationExhausted {
        /// Number of calls made
        attempts: u32,
        /// The error returned by the final call
        last_error: ProviderError,
    },

    /// A batch translation did not split back into one piece per entry
    #[error("Batch {batch_index} came back with {actual} pieces for {expected} entries")]
    ReassemblyMismatch {
        /// Position of the batch in dispatch order
        batch_index: usize,
        /// Entries packed into the batch
        expected: usize,
        /// Pieces recovered from the translation
        actual: usize,
    },

    /// Cancellation was observed before the work finished
    #[error("Translation cancelled")]
    Cancelled,
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from subtitle processing
    #[error("Subtitle error: {0}")]
    Subtitle(#[from] SubtitleError),

    /// Error from translation
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
