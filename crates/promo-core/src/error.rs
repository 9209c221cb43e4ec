//! Error taxonomy shared by every Promobot crate.

use thiserror::Error;

/// Errors surfaced by the promotion engine and its collaborators.
#[derive(Debug, Error)]
pub enum PromoError {
    /// Malformed command arguments or invalid entity fields.
    #[error("validation error: {0}")]
    Validation(String),

    /// Referenced group/template does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Requested transition is forbidden in the current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The messaging collaborator failed to deliver.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// The storage collaborator failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Caller is not allowed to run this command.
    #[error("permission denied: {0}")]
    Permission(String),

    #[error("config error: {0}")]
    Config(String),

    /// Transport/integration failure outside of a delivery attempt.
    #[error("channel error: {0}")]
    Channel(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PromoError {
    pub fn persistence(e: impl std::fmt::Display) -> Self {
        Self::Persistence(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PromoError>;
