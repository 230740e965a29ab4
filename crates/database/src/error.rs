use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid database configuration: {0}")]
    Config(#[from] configuration::ConfigError),

    #[error(transparent)]
    Query(#[from] sqlx::Error),

    #[error("The connection pool is saturated: {admitted} callers are already active or waiting.")]
    Saturated { admitted: usize },
}
