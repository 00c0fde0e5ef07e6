//! Cloud error types

use thiserror::Error;

/// Cloud resource and host client errors
#[derive(Error, Debug)]
pub enum CloudError {
    /// No resource matched the lookup
    #[error("{0}")]
    NotFound(String),

    /// More than one resource matched a lookup that expects exactly one
    #[error("{0}")]
    Ambiguous(String),

    #[error("resource group for environment '{0}' not found, ensure the environment has been provisioned")]
    ResourceGroupNotFound(String),

    #[error("resource type mismatch: {0}")]
    ResourceTypeMismatch(String),

    #[error("command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Expand(#[from] azflow_core::CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Whether the error reports a resource that does not exist (yet)
    pub fn is_not_found(&self) -> bool {
        match self {
            CloudError::NotFound(_) | CloudError::ResourceGroupNotFound(_) => true,
            CloudError::CommandFailed { message, .. } => {
                message.contains("ResourceNotFound")
                    || message.contains("ResourceGroupNotFound")
                    || message.contains("(NotFound)")
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_not_found() {
        assert!(CloudError::NotFound("x".into()).is_not_found());
        assert!(
            CloudError::CommandFailed {
                command: "az acr login".into(),
                message: "ERROR: (ResourceNotFound) The Resource was not found".into(),
            }
            .is_not_found()
        );
        assert!(!CloudError::Ambiguous("x".into()).is_not_found());
        assert!(!CloudError::Cancelled.is_not_found());
    }
}
