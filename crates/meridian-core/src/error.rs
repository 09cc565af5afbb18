use std::fmt::Display;

use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),

    #[error("balance of {balance} cannot absorb a change of {delta}")]
    InsufficientBalance { balance: i64, delta: i64 },

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("user {0} has already been referred")]
    AlreadyReferred(Uuid),

    #[error("forbidden")]
    Forbidden,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl Error {
    pub fn not_found(entity: &str, id: impl Display) -> Self {
        Error::NotFound(format!("{entity} {id}"))
    }
}
