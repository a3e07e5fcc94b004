use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::broadcaster::BroadcastError;
use crate::identity::IdentityError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("{0}")]
    Identity(#[from] IdentityError),
    #[error("broadcast error: {0}")]
    Broadcast(#[from] BroadcastError),
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl ApplicationError {
    /// 创建基础设施错误
    pub fn infrastructure(message: impl Into<String>) -> Self {
        ApplicationError::Infrastructure(message.into())
    }

    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, ApplicationError::Domain(DomainError::Unauthenticated))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ApplicationError::Domain(DomainError::Conflict { .. })
                | ApplicationError::Repository(RepositoryError::Conflict)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ApplicationError::Domain(DomainError::NotFound { .. })
                | ApplicationError::Repository(RepositoryError::NotFound)
        )
    }
}
