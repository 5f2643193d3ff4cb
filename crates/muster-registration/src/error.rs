//! Error types for the registration engine.

/// Registration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    /// The server rejected the account name / registration password pair.
    #[error("invalid account name or registration password")]
    InvalidCredentials,

    /// A newer `register()` call replaced the completion signal.
    #[error("registration request superseded by a newer request")]
    Superseded,

    /// Configuration could not be loaded or written.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Identity persistence failed.
    #[error("identity error: {message}")]
    Identity { message: String },

    /// The outbound message store refused a message.
    #[error("message store error: {message}")]
    Store { message: String },

    /// Cloud metadata could not be obtained.
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

impl RegistrationError {
    /// Whether the next exchange cycle may succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Superseded | Self::Store { .. } | Self::Metadata(_))
    }
}

/// Result type for registration operations.
pub type RegistrationResult<T> = Result<T, RegistrationError>;

/// Failure fetching a single metadata URL.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The metadata service answered 404.
    #[error("not found: {url}")]
    NotFound { url: String },

    /// Any other non-success HTTP status.
    #[error("server returned HTTP code {status} for {url}")]
    Http { url: String, status: u16 },

    /// The request never produced a response.
    #[error("failed to fetch {url}: {message}")]
    Connection { url: String, message: String },

    /// A text document was not valid UTF-8.
    #[error("{url} is not valid UTF-8: {message}")]
    InvalidText { url: String, message: String },
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn url(&self) -> &str {
        match self {
            Self::NotFound { url }
            | Self::Http { url, .. }
            | Self::Connection { url, .. }
            | Self::InvalidText { url, .. } => url,
        }
    }
}

/// Cloud metadata could not be turned into registration data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// User data is not a decodable dictionary of the expected shape.
    #[error("malformed user data: {reason}")]
    Malformed { reason: String },

    /// The launch index is not a non-negative integer.
    #[error("invalid launch index: {value:?}")]
    InvalidLaunchIndex { value: String },

    /// The launch index does not select an entry in the OTP list.
    #[error("launch index {index} out of range for {len} one-time passwords")]
    LaunchIndexOutOfRange { index: usize, len: usize },
}

impl From<crate::bpickle::BpickleError> for MetadataError {
    fn from(err: crate::bpickle::BpickleError) -> Self {
        Self::Malformed {
            reason: err.to_string(),
        }
    }
}
