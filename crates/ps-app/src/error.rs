use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// The request never produced an HTTP response (connect, DNS, reset...).
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response. `message` is the server's own text when it sent one.
    #[error("{message}")]
    Backend { status: u16, message: String },

    #[error("{0}")]
    JobFailed(String),

    #[error("Invalid response from backend: {0}")]
    Decode(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("No checkout URL received")]
    MissingCheckoutUrl,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Catalog(#[from] ps_core::CoreError),
}

impl AppError {
    /// Only transport failures are worth retrying; an HTTP error or a failed
    /// job will answer the same way again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
