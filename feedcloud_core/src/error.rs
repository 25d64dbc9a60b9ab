use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    AuthorizationFailed(String),
    #[error("{0}")]
    Validation(String),
    #[error("Object `{0}` not found")]
    ObjectNotFound(String),
    #[error("Object `{0}` already exists")]
    ObjectAlreadyExists(String),

    #[error("Invalid setting: {0}")]
    Settings(String),
    #[error("Queue error: {0}")]
    Queue(String),
    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] diesel::ConnectionError),
    #[error("Connection pool error: {0}")]
    PoolError(#[from] diesel::r2d2::PoolError),
    #[error("Password hash error: {0}")]
    PasswordError(#[from] bcrypt::BcryptError),
    #[error("Token error: {0}")]
    TokenError(#[from] jsonwebtoken::errors::Error),
    #[error("Cannot encode/decode JSON: {0}")]
    JSONError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
