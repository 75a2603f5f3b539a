use thiserror::Error;

use crate::update::types::InstallationId;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Installation not found: {0}")]
    UnknownInstallation(InstallationId),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Failure to refresh one installation
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Failed to read update data: {0}")]
    Read(#[from] ReadError),

    #[error("Failed to persist update flags: {0}")]
    Write(#[from] WriteError),
}
