use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("connection error: {0}")]
    Connect(String),
    #[error("could not connect to database after {attempts} attempts: {last_error}")]
    ConnectExhausted { attempts: u32, last_error: String },
    #[error("schema error: {0}")]
    Schema(String),
    #[error("read error: {0}")]
    Read(String),
    #[error("write error for key `{key}`: {message}")]
    Write { key: String, message: String },
    #[error("close error: {0}")]
    Close(String),
    #[error("database pool is not connected")]
    NotConnected,
    #[error("store is not initialized")]
    NotInitialized,
    #[error("store has been shut down")]
    Closed,
}

impl ServiceError {
    pub fn write(key: &str, err: impl std::fmt::Display) -> Self {
        Self::Write { key: key.to_string(), message: err.to_string() }
    }
}
