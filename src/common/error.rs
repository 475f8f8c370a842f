use tch::TchError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NmtError {
    #[error("IO error: {0}")]
    IOError(String),

    #[error("Tch tensor error: {0}")]
    TchError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid configuration error: {0}")]
    InvalidConfigurationError(String),

    #[error("Invalid mode error: {0} (expected `train` or `eval`)")]
    InvalidModeError(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Value error: {0}")]
    ValueError(String),
}

impl From<std::io::Error> for NmtError {
    fn from(error: std::io::Error) -> Self {
        NmtError::IOError(error.to_string())
    }
}

impl From<TchError> for NmtError {
    fn from(error: TchError) -> Self {
        NmtError::TchError(error.to_string())
    }
}

impl From<serde_json::Error> for NmtError {
    fn from(error: serde_json::Error) -> Self {
        NmtError::SerializationError(error.to_string())
    }
}

impl From<csv::Error> for NmtError {
    fn from(error: csv::Error) -> Self {
        NmtError::SerializationError(error.to_string())
    }
}
