//! Error types for TarangIO

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// TarangIO error types
///
/// Client socket failures never show up here: the connection multiplexer
/// absorbs them by tearing the affected client down. Everything that does
/// reach this type is fatal to the server loop.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error (listener setup, readiness polling, output sink)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file or flag error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown device driver requested
    #[error("Unknown device driver: {0}")]
    UnknownDevice(String),

    /// Tuner reported a failure
    #[error("Device error: {0}")]
    Device(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
