use thiserror::Error;

/// Outcomes of registry operations that callers branch on.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl RegistryError {
    pub fn invalid_input(message: &str) -> Self {
        Self::InvalidInput(message.to_string())
    }

    pub fn not_found(message: &str) -> Self {
        Self::NotFound(message.to_string())
    }
}

impl From<state_store::Error> for RegistryError {
    fn from(e: state_store::Error) -> Self {
        match e {
            state_store::Error::BuildAlreadyExists { .. } => {
                Self::Conflict("Build already exists".to_string())
            }
            state_store::Error::PendingBuildNotFound { .. } => {
                Self::NotFound("Build not found".to_string())
            }
            e => Self::Internal(e.into()),
        }
    }
}
