use thiserror::Error;

/// Main error type for blobtour operations
#[derive(Debug, Error)]
pub enum BlobTourError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("Shared access signature error: {0}")]
    SasError(String),

    #[error("Storage service unreachable: {0}")]
    ServiceUnreachable(String),

    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    #[error("Azure API error: {0}")]
    AzureApiError(String),

    #[error("Container not found: {name}")]
    ContainerNotFound { name: String },

    #[error("Blob not found: {name}")]
    BlobNotFound { name: String },

    #[error("Invalid page range: {0}")]
    InvalidPageRange(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),
}

impl BlobTourError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn connection_string<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConnectionString(msg.into())
    }

    pub fn sas<S: Into<String>>(msg: S) -> Self {
        Self::SasError(msg.into())
    }

    pub fn unreachable<S: Into<String>>(msg: S) -> Self {
        Self::ServiceUnreachable(msg.into())
    }

    pub fn authorization<S: Into<String>>(msg: S) -> Self {
        Self::AuthorizationFailed(msg.into())
    }

    pub fn azure_api<S: Into<String>>(msg: S) -> Self {
        Self::AzureApiError(msg.into())
    }

    pub fn container_not_found<S: Into<String>>(name: S) -> Self {
        Self::ContainerNotFound { name: name.into() }
    }

    pub fn blob_not_found<S: Into<String>>(name: S) -> Self {
        Self::BlobNotFound { name: name.into() }
    }

    pub fn page_range<S: Into<String>>(msg: S) -> Self {
        Self::InvalidPageRange(msg.into())
    }

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Wrap an SDK error with context, keeping its classification
    pub fn from_azure<S: AsRef<str>>(context: S, error: azure_core::Error) -> Self {
        classify_azure_message(&format!("{}: {error}", context.as_ref()))
    }

    /// True for errors caused by what the user configured rather than by the service
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ConfigError(_) | Self::InvalidConnectionString(_) | Self::SasError(_)
        )
    }
}

/// Result type alias for blobtour operations
pub type Result<T> = std::result::Result<T, BlobTourError>;

/// Convert Azure Core errors to BlobTourError
impl From<azure_core::Error> for BlobTourError {
    fn from(error: azure_core::Error) -> Self {
        classify_azure_message(&error.to_string())
    }
}

/// Sort an SDK error message into unreachable, authorization or generic API failures
fn classify_azure_message(message: &str) -> BlobTourError {
    let lower = message.to_lowercase();

    const UNREACHABLE_MARKERS: &[&str] = &[
        "connection refused",
        "error sending request",
        "tcp connect",
        "dns error",
        "failed to lookup address",
        "timed out",
        "connection reset",
    ];
    const AUTHORIZATION_MARKERS: &[&str] = &[
        "403",
        "authenticationfailed",
        "authorizationfailure",
        "authorizationpermissionmismatch",
        "authorizationresourcetypemismatch",
    ];

    if UNREACHABLE_MARKERS.iter().any(|m| lower.contains(m)) {
        BlobTourError::unreachable(message)
    } else if AUTHORIZATION_MARKERS.iter().any(|m| lower.contains(m)) {
        BlobTourError::authorization(message)
    } else {
        BlobTourError::azure_api(message)
    }
}
